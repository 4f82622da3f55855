//! Body rewriting for closure conversion
//!
//! Redirects every use of a captured definition through the context object
//! that now holds it, allocates block contexts on block entry, replaces
//! nested function declarations with closure allocations, and turns calls of
//! closures into method calls.

use super::{scope_label, unreachable_context, ContextClass, Conversion};
use crate::error::{CompileError, CompileResult};
use crate::model::{
    walk_expr_mut, Callee, CatchClause, ChainCall, DefnId, DefnKind, Expr, ExprKind, FunctionId,
    Program, ScopeId, ScopeKind, Stmt, Type, VisitorMut,
};

pub(super) fn rewrite_functions(
    program: &mut Program,
    conversion: &Conversion,
) -> CompileResult<()> {
    for index in 0..program.functions.len() {
        let id = FunctionId::new(index as u32);
        let mut body = program.function_mut(id).body.take();
        let mut chain = program.function_mut(id).chain.take();

        let mut rewriter = Rewriter {
            program,
            conversion,
            function: id,
            in_chain: false,
            open: Vec::new(),
            error: None,
        };
        if let Some(body) = body.as_mut() {
            rewriter.visit_expr_mut(body);
        }
        if let Some(chain) = chain.as_mut() {
            if let ChainCall::Super { args, .. } | ChainCall::This { args, .. } = &mut chain.call {
                rewriter.in_chain = true;
                for arg in args {
                    rewriter.visit_expr_mut(arg);
                }
            }
        }
        let error = rewriter.error.take();

        if let Some(body) = body.as_mut() {
            prepend_prologue(program, conversion, id, body);
        }
        let function = program.function_mut(id);
        function.body = body;
        function.chain = chain;
        if let Some(error) = error {
            return Err(error);
        }
    }
    Ok(())
}

fn allocate(context: &ContextClass) -> Stmt {
    Stmt::var(
        context.local,
        Expr::new_object(context.ty.clone(), context.constructor, Vec::new()),
    )
}

/// Allocate the body's context on entry and copy captured parameters into it.
fn prepend_prologue(
    program: &Program,
    conversion: &Conversion,
    function: FunctionId,
    body: &mut Expr,
) {
    let Some(context) = conversion.contexts.get(&program.function(function).scope) else {
        return;
    };

    let mut stmts = vec![allocate(context)];
    for param in &program.function(function).params {
        if let Some(field) = conversion.param_fields.get(param) {
            stmts.push(Stmt::Expr(Expr::init_field(
                program.load(context.local),
                *field,
                program.load(*param),
            )));
        }
    }

    let Expr { kind, ty } = std::mem::replace(body, Expr::unit());
    match kind {
        ExprKind::Block(rest) => stmts.extend(rest),
        other => stmts.push(Stmt::Expr(Expr::new(other, ty.clone()))),
    }
    *body = Expr::new(ExprKind::Block(stmts), ty);
}

struct Rewriter<'a> {
    program: &'a Program,
    conversion: &'a Conversion,
    function: FunctionId,
    /// Constructor chain arguments run before the context exists.
    in_chain: bool,
    /// Block scopes whose context is allocated on the current path.
    open: Vec<ScopeId>,
    error: Option<CompileError>,
}

impl Rewriter<'_> {
    fn fail(&mut self, error: CompileError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn owns(&self, scope: ScopeId) -> bool {
        self.program.scope_function(scope) == Some(self.function)
    }

    /// The expression evaluating to the context of `scope` from inside the
    /// current function.
    fn context_access(&mut self, scope: ScopeId, name: &str) -> Option<Expr> {
        if self.owns(scope) {
            if let Some(context) = self.conversion.contexts.get(&scope) {
                return Some(self.program.load(context.local));
            }
        } else if let (Some(closure), Some(field)) = (
            self.conversion.closures.get(&self.function),
            self.conversion.context_fields.get(&(self.function, scope)),
        ) {
            let ty = self.program.defn(*field).ty.clone();
            return Some(Expr::field(self.program.load(closure.receiver), *field, ty));
        }

        let function = &self.program.function(self.function).name;
        let error = unreachable_context(self.program, function, scope, name);
        self.fail(error);
        None
    }

    /// The replacement for a use of `defn`, or `None` to keep it.
    fn rewrite_variable(&mut self, defn: DefnId, ty: &Type) -> Option<Expr> {
        let definition = self.program.defn(defn);
        let name = definition.name.clone();

        if let Some(field) = self.conversion.param_fields.get(&defn) {
            let scope = self.conversion.context_scope(self.program, defn)?;
            if self.owns(scope) && self.in_chain {
                return None;
            }
            let receiver = self.context_access(scope, &name)?;
            return Some(Expr::field(receiver, *field, ty.clone()));
        }

        if let Some(scope) = self.conversion.context_scope(self.program, defn) {
            let receiver = self.context_access(scope, &name)?;
            return Some(Expr::field(receiver, defn, ty.clone()));
        }

        if matches!(definition.kind, DefnKind::Parameter | DefnKind::Local)
            && !self.owns(definition.scope)
        {
            let error = CompileError::UnreachableContext {
                function: self.program.function(self.function).name.clone(),
                scope: scope_label(self.program, definition.scope),
                name,
            };
            self.fail(error);
        }
        None
    }

    /// Load of the variable holding `function`'s closure.
    fn closure_value(&mut self, function: FunctionId) -> Option<Expr> {
        let closure = self.conversion.closures.get(&function)?;
        let var = closure.var;
        let ty = closure.ty.clone();
        match self.rewrite_variable(var, &ty) {
            Some(access) => Some(access),
            None if self.error.is_none() => Some(Expr::variable(var, ty)),
            None => None,
        }
    }

    /// Whether entering a block declaring into `scope` allocates its context.
    fn opens(&self, scope: ScopeId) -> bool {
        self.program.scope(scope).kind == ScopeKind::Block
            && self.conversion.contexts.contains_key(&scope)
            && !self.open.contains(&scope)
    }

    /// Block scopes whose context a block starting with `stmts` allocates.
    fn opened_by(&self, stmts: &[Stmt]) -> Vec<ScopeId> {
        let mut scopes = Vec::new();
        for stmt in stmts {
            let declared = match stmt {
                Stmt::Var { defn, .. } => self.conversion.context_scope(self.program, *defn),
                Stmt::Function(nested) => self
                    .conversion
                    .closures
                    .get(nested)
                    .and_then(|c| self.conversion.context_scope(self.program, c.var)),
                Stmt::Expr(_) => None,
            };
            if let Some(scope) = declared {
                if self.opens(scope) && !scopes.contains(&scope) {
                    scopes.push(scope);
                }
            }
        }
        scopes
    }

    fn allocate_context(&self, scope: ScopeId) -> Option<Stmt> {
        self.conversion.contexts.get(&scope).map(allocate)
    }

    fn rewrite_block(&mut self, stmts: &mut Vec<Stmt>) {
        let opened = self.opened_by(stmts);
        let original = std::mem::take(stmts);
        for scope in &opened {
            stmts.extend(self.allocate_context(*scope));
        }
        self.open.extend(opened.iter().copied());

        for stmt in original {
            match stmt {
                Stmt::Expr(mut expr) => {
                    self.visit_expr_mut(&mut expr);
                    stmts.push(Stmt::Expr(expr));
                }
                Stmt::Var { defn, mut init } => {
                    if let Some(init) = init.as_mut() {
                        self.visit_expr_mut(init);
                    }
                    match self.conversion.context_scope(self.program, defn) {
                        Some(scope) => {
                            let Some(init) = init else {
                                continue;
                            };
                            let name = self.program.defn(defn).name.clone();
                            if let Some(context) = self.context_access(scope, &name) {
                                stmts.push(Stmt::Expr(Expr::init_field(context, defn, init)));
                            }
                        }
                        None => stmts.push(Stmt::Var { defn, init }),
                    }
                }
                Stmt::Function(nested) => {
                    // Nested functions without a closure class are lowered on their own.
                    if let Some(stmt) = self.allocate_closure(nested) {
                        stmts.push(stmt);
                    }
                }
            }
        }

        self.open.truncate(self.open.len() - opened.len());
    }

    fn allocate_closure(&mut self, function: FunctionId) -> Option<Stmt> {
        let closure = self.conversion.closures.get(&function)?;
        let needed = self
            .conversion
            .info
            .needed
            .get(&function)
            .cloned()
            .unwrap_or_default();
        let name = self.program.function(function).name.clone();

        let mut args = Vec::with_capacity(needed.len());
        for scope in needed {
            args.push(self.context_access(scope, &name)?);
        }
        let value = Expr::new_object(closure.ty.clone(), closure.constructor, args);

        match self.conversion.context_scope(self.program, closure.var) {
            Some(scope) => {
                let context = self.context_access(scope, &name)?;
                Some(Stmt::Expr(Expr::init_field(context, closure.var, value)))
            }
            None => Some(Stmt::var(closure.var, value)),
        }
    }

    /// Store a captured exception into its context field before the clause
    /// body, allocating the clause's context first when it owns one.
    fn rewrite_clause(&mut self, clause: &mut CatchClause) {
        let captured = clause.binding.and_then(|binding| {
            let temp = self.conversion.caught.get(&binding).copied()?;
            let scope = self.conversion.context_scope(self.program, binding)?;
            Some((binding, temp, scope))
        });
        let Some((binding, temp, scope)) = captured else {
            self.visit_expr_mut(&mut clause.body);
            return;
        };

        let opens = self.opens(scope);
        if opens {
            self.open.push(scope);
        }
        self.visit_expr_mut(&mut clause.body);

        let mut stmts = Vec::new();
        if opens {
            stmts.extend(self.allocate_context(scope));
            self.open.pop();
        }
        let name = self.program.defn(binding).name.clone();
        if let Some(context) = self.context_access(scope, &name) {
            let store = Expr::init_field(context, binding, self.program.load(temp));
            stmts.push(Stmt::Expr(store));
        }

        clause.binding = Some(temp);
        let body = std::mem::replace(&mut clause.body, Expr::unit());
        let ty = body.ty.clone();
        stmts.push(Stmt::Expr(body));
        clause.body = Expr::new(ExprKind::Block(stmts), ty);
    }
}

impl VisitorMut for Rewriter<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Variable(defn) => {
                let defn = *defn;
                if let Some(replacement) = self.rewrite_variable(defn, &expr.ty) {
                    *expr = replacement;
                }
            }
            ExprKind::FunctionValue(function) => {
                let function = *function;
                if let Some(value) = self.conversion.values.get(&function) {
                    *expr = Expr::new_object(value.ty.clone(), value.constructor, Vec::new());
                } else if let Some(value) = self.closure_value(function) {
                    *expr = Expr::new(value.kind, expr.ty.clone());
                }
            }
            ExprKind::Block(stmts) => self.rewrite_block(stmts),
            ExprKind::Try {
                body,
                catches,
                finally,
            } => {
                self.visit_expr_mut(body);
                for clause in catches.iter_mut() {
                    self.rewrite_clause(clause);
                }
                if let Some(finally) = finally {
                    self.visit_expr_mut(finally);
                }
            }
            ExprKind::Call { .. } => {
                walk_expr_mut(self, expr);
                let ExprKind::Call {
                    callee, type_args, ..
                } = &mut expr.kind
                else {
                    return;
                };
                let Callee::Function(function) = *callee else {
                    return;
                };
                let Some(inherited) = self
                    .conversion
                    .closures
                    .get(&function)
                    .map(|c| c.inherited_type_params)
                else {
                    return;
                };
                if let Some(receiver) = self.closure_value(function) {
                    *callee = Callee::Method {
                        receiver: Box::new(receiver),
                        method: function,
                    };
                    type_args.drain(..inherited.min(type_args.len()));
                }
            }
            _ => walk_expr_mut(self, expr),
        }
    }
}
