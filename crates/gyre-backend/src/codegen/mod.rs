//! Code generation
//!
//! Lowers every closure-free function body to basic blocks of stack-machine
//! instructions. Runs after class flattening, which fixes the field indices
//! and method slots the instructions refer to.
//!
//! Slots: parameters are numbered from 0 (the receiver first), locals from
//! -1 downwards in the order their declarations appear in the body. Dead code
//! still gets its locals, but never its blocks.

mod builder;
mod control;
mod expr;

use crate::bytecode::{Inst, LocalSlot, LoweredBody};
use crate::error::{CompileError, CompileResult};
use crate::model::{
    walk_expr, walk_stmt, ChainCall, ClassId, DefnId, Expr, ExprKind, Function, FunctionId,
    FunctionKind, Program, Stmt, Type, Visitor,
};
use crate::options::CompileOptions;
use builder::BlockBuilder;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

pub fn generate(program: &mut Program, options: &CompileOptions) -> CompileResult<()> {
    if let Some(class) = program.classes.iter().find(|c| c.layout.is_none()) {
        return Err(CompileError::LayoutNotFinalized {
            class: class.name.clone(),
        });
    }

    let mut strings = StringPool::new(std::mem::take(&mut program.strings));
    let mut lowered = Vec::new();
    for function in &program.functions {
        if function.is_builtin || (function.body.is_none() && function.chain.is_none()) {
            continue;
        }
        let body = lower_function(program, function, &mut strings, options)?;
        trace!(
            function = %function.name,
            blocks = body.blocks.len(),
            locals = body.locals.len(),
            "lowered function"
        );
        lowered.push((function.id, body));
    }

    debug!(functions = lowered.len(), strings = strings.len(), "code generation finished");
    for (id, body) in lowered {
        program.function_mut(id).lowered = Some(body);
    }
    program.strings = strings.into_vec();
    Ok(())
}

/// Interned string literals
#[derive(Debug, Default)]
pub(crate) struct StringPool {
    strings: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl StringPool {
    pub fn new(strings: Vec<String>) -> Self {
        let index = strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();
        Self { strings, index }
    }

    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(index) = self.index.get(value) {
            return *index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.index.insert(value.to_string(), index);
        index
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.strings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Leave the result on the stack.
    Value,
    /// Leave the stack as it was.
    Effect,
}

/// A protected region or finally clause enclosing the code being lowered
#[derive(Debug, Clone, Copy)]
struct Unwind<'a> {
    finally: Option<&'a Expr>,
    /// Whether a handler installed by `pushtry` must be popped on the way out.
    handler_active: bool,
}

struct Lowering<'a, 'p> {
    program: &'a Program,
    function: &'a Function,
    strings: &'p mut StringPool,
    blocks: BlockBuilder,
    slots: FxHashMap<DefnId, i32>,
    unwind: Vec<Unwind<'a>>,
}

fn lower_function(
    program: &Program,
    function: &Function,
    strings: &mut StringPool,
    options: &CompileOptions,
) -> CompileResult<LoweredBody> {
    let params: Vec<LocalSlot> = function
        .params
        .iter()
        .enumerate()
        .map(|(i, defn)| local_slot(program, *defn, i as i32))
        .collect();

    let mut collector = LocalCollector::default();
    if let Some(chain) = &function.chain {
        if let ChainCall::Super { args, .. } | ChainCall::This { args, .. } = &chain.call {
            for arg in args {
                collector.visit_expr(arg);
            }
        }
    }
    if let Some(body) = &function.body {
        collector.visit_expr(body);
    }
    if collector.locals.len() > options.max_locals {
        return Err(CompileError::TooManyLocals {
            function: function.name.clone(),
            max: options.max_locals,
        });
    }
    let locals: Vec<LocalSlot> = collector
        .locals
        .iter()
        .enumerate()
        .map(|(i, defn)| local_slot(program, *defn, -(i as i32) - 1))
        .collect();

    let slots = params
        .iter()
        .chain(locals.iter())
        .map(|s| (s.defn, s.slot))
        .collect();

    let mut lowering = Lowering {
        program,
        function,
        strings,
        blocks: BlockBuilder::new(),
        slots,
        unwind: Vec::new(),
    };
    lowering.lower_entry()?;
    let blocks = lowering.blocks.finish(&function.name)?;

    Ok(LoweredBody {
        params,
        locals,
        blocks,
    })
}

fn local_slot(program: &Program, defn: DefnId, slot: i32) -> LocalSlot {
    let definition = program.defn(defn);
    LocalSlot {
        defn,
        name: definition.name.clone(),
        ty: definition.ty.clone(),
        slot,
    }
}

/// Declared locals in source order, including those in dead code.
#[derive(Default)]
struct LocalCollector {
    locals: Vec<DefnId>,
}

impl LocalCollector {
    fn declare(&mut self, defn: DefnId) {
        if !self.locals.contains(&defn) {
            self.locals.push(defn);
        }
    }
}

impl Visitor for LocalCollector {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let Stmt::Var { defn, .. } = stmt {
            self.declare(*defn);
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if let ExprKind::Try {
            body,
            catches,
            finally,
        } = &expr.kind
        {
            self.visit_expr(body);
            for clause in catches {
                if let Some(binding) = clause.binding {
                    self.declare(binding);
                }
                self.visit_expr(&clause.body);
            }
            if let Some(finally) = finally {
                self.visit_expr(finally);
            }
            return;
        }
        walk_expr(self, expr);
    }
}

impl<'a> Lowering<'a, '_> {
    fn fail(&self, message: impl Into<String>) -> CompileError {
        CompileError::lowering(&self.function.name, message)
    }

    fn emit(&mut self, inst: Inst) {
        self.blocks.emit(inst);
    }

    fn lower_entry(&mut self) -> CompileResult<()> {
        let function = self.function;
        match function.kind {
            FunctionKind::Constructor(class) => {
                self.lower_chain(class)?;
                if let Some(body) = &function.body {
                    self.lower(body, Mode::Effect)?;
                }
                self.emit(Inst::Unit);
                self.blocks.terminate(Inst::Ret);
            }
            _ => {
                let Some(body) = &function.body else {
                    return Err(self.fail("function has no body"));
                };
                self.lower(body, Mode::Value)?;
                self.coerce(&body.ty, &function.return_type)?;
                self.blocks.terminate(Inst::Ret);
            }
        }
        Ok(())
    }

    /// Superclass or sibling constructor call, field parameters, then the
    /// instance initializer.
    fn lower_chain(&mut self, class: ClassId) -> CompileResult<()> {
        let program = self.program;
        let function = self.function;
        let chain = function.chain.as_ref();
        let field_params = chain.map(|c| c.field_params.as_slice()).unwrap_or(&[]);
        let supertype = program.class(class).supertype.as_ref();

        match chain.map(|c| &c.call) {
            None | Some(ChainCall::Default) => {
                if let Some(supertype) = supertype {
                    let constructor = default_constructor(program, supertype.class)?;
                    self.emit(Inst::LdLocal(0));
                    self.emit_types(&supertype.args)?;
                    self.emit(Inst::CallG(constructor));
                    self.emit(Inst::Drop);
                }
            }
            Some(ChainCall::Super { constructor, args }) => {
                self.emit(Inst::LdLocal(0));
                for arg in args {
                    self.lower(arg, Mode::Value)?;
                }
                if let Some(supertype) = supertype {
                    self.emit_types(&supertype.args)?;
                }
                self.emit(Inst::CallG(*constructor));
                self.emit(Inst::Drop);
            }
            Some(ChainCall::This { constructor, args }) => {
                self.emit(Inst::LdLocal(0));
                for arg in args {
                    self.lower(arg, Mode::Value)?;
                }
                self.emit_class_type_params(class);
                self.emit(Inst::CallG(*constructor));
                self.emit(Inst::Drop);
                // The sibling has already run the initializer.
                return Ok(());
            }
        }

        for (param, field) in field_params {
            let slot = self.slot(*param)?;
            self.emit(Inst::LdLocal(slot));
            self.emit(Inst::LdLocal(0));
            let (index, repr) = self.field_slot(*field)?;
            self.emit(expr::store_inst(repr, index));
        }

        if let Some(initializer) = program.class(class).initializer {
            self.emit(Inst::LdLocal(0));
            self.emit_class_type_params(class);
            self.emit(Inst::CallG(initializer));
            self.emit(Inst::Drop);
        }
        Ok(())
    }

    fn emit_class_type_params(&mut self, class: ClassId) {
        for param in &self.program.class(class).type_params {
            self.emit(Inst::Tyv(*param));
        }
    }

    fn slot(&self, defn: DefnId) -> CompileResult<i32> {
        self.slots.get(&defn).copied().ok_or_else(|| {
            CompileError::UnresolvedDefinition {
                function: self.function.name.clone(),
                name: self.program.defn(defn).name.clone(),
            }
        })
    }

    fn return_type(&self) -> &'a Type {
        &self.function.return_type
    }
}

fn default_constructor(program: &Program, class: ClassId) -> CompileResult<FunctionId> {
    program
        .class(class)
        .constructors
        .iter()
        .copied()
        .find(|c| program.function(*c).params.len() == 1)
        .ok_or_else(|| CompileError::MissingDefaultConstructor {
            class: program.class(class).name.clone(),
        })
}
