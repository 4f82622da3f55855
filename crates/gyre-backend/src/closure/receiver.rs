//! Receiver desugaring
//!
//! Makes every use of the enclosing object explicit: `this`, fields read
//! through the implicit receiver and methods called through it all become
//! uses of the receiver parameter of the nearest enclosing class member.
//! Capture analysis then sees a nested use of a member as a capture of the
//! receiver like any other variable.

use crate::error::{CompileError, CompileResult};
use crate::model::{
    walk_expr_mut, Callee, ChainCall, DefnId, DefnKind, Expr, ExprKind, FunctionId, Program,
    VisitorMut,
};

pub(super) fn desugar_receivers(program: &mut Program) -> CompileResult<()> {
    for index in 0..program.functions.len() {
        let id = FunctionId::new(index as u32);
        let receiver = receiver_in_scope(program, id);

        let mut body = program.function_mut(id).body.take();
        let mut chain = program.function_mut(id).chain.take();

        let mut desugar = ReceiverDesugar {
            program,
            function: id,
            receiver,
            error: None,
        };
        if let Some(body) = body.as_mut() {
            desugar.visit_expr_mut(body);
        }
        if let Some(chain) = chain.as_mut() {
            if let ChainCall::Super { args, .. } | ChainCall::This { args, .. } = &mut chain.call {
                for arg in args {
                    desugar.visit_expr_mut(arg);
                }
            }
        }
        let error = desugar.error.take();

        let function = program.function_mut(id);
        function.body = body;
        function.chain = chain;
        if let Some(error) = error {
            return Err(error);
        }
    }
    Ok(())
}

/// The receiver of the innermost enclosing class member.
fn receiver_in_scope(program: &Program, function: FunctionId) -> Option<DefnId> {
    let mut current = Some(function);
    while let Some(id) = current {
        if let Some(receiver) = program.function(id).receiver() {
            return Some(receiver);
        }
        current = program.enclosing_function(id);
    }
    None
}

struct ReceiverDesugar<'a> {
    program: &'a Program,
    function: FunctionId,
    receiver: Option<DefnId>,
    error: Option<CompileError>,
}

impl ReceiverDesugar<'_> {
    fn receiver(&mut self, what: &str) -> Option<Expr> {
        match self.receiver {
            Some(receiver) => Some(self.program.load(receiver)),
            None => {
                if self.error.is_none() {
                    self.error = Some(CompileError::UnresolvedDefinition {
                        function: self.program.function(self.function).name.clone(),
                        name: what.to_string(),
                    });
                }
                None
            }
        }
    }
}

impl VisitorMut for ReceiverDesugar<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::This => {
                if let Some(receiver) = self.receiver("this") {
                    expr.kind = receiver.kind;
                }
            }
            ExprKind::Variable(defn) => {
                let defn = *defn;
                if let DefnKind::Field(_) = self.program.defn(defn).kind {
                    let name = self.program.defn(defn).name.clone();
                    if let Some(receiver) = self.receiver(&name) {
                        expr.kind = ExprKind::Field {
                            receiver: Box::new(receiver),
                            field: defn,
                        };
                    }
                }
            }
            ExprKind::Call { callee, .. } => {
                if let Callee::ImplicitMethod(method) = *callee {
                    let name = self.program.function(method).name.clone();
                    if let Some(receiver) = self.receiver(&name) {
                        *callee = Callee::Method {
                            receiver: Box::new(receiver),
                            method,
                        };
                    }
                }
            }
            _ => {}
        }
        walk_expr_mut(self, expr);
    }
}
