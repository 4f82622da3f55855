//! Control flow lowering
//!
//! A try expression with a finally clause funnels both of its exits into a
//! single finally block. The normal exit pushes `null` above the body's
//! value and the exceptional exit pushes `uninitialized` below the
//! exception, so after the finally body runs the top of the stack tells the
//! two apart: `null` resumes, anything else is re-thrown.
//!
//! A `return` cannot take that path. It pops each enclosing handler and
//! runs a copy of each enclosing finally body itself before `ret`.

use super::{Lowering, Mode, Unwind};
use crate::bytecode::{BlockId, Inst};
use crate::error::CompileResult;
use crate::model::{
    CatchClause, ClassId, Expr, FunctionId, Stmt, EXCEPTION_CLASS, IS_SUBTYPE_OF_METHOD,
    OBJECT_CLASS, TYPEOF_METHOD, TYPE_CLASS, TYPE_CONSTRUCTOR,
};

impl<'a> Lowering<'a, '_> {
    pub(super) fn lower_block(&mut self, stmts: &'a [Stmt], mode: Mode) -> CompileResult<()> {
        if stmts.is_empty() {
            if mode == Mode::Value {
                self.emit(Inst::Unit);
            }
            return Ok(());
        }

        let program = self.program;
        for (i, stmt) in stmts.iter().enumerate() {
            let last = i + 1 == stmts.len();
            match stmt {
                Stmt::Expr(expr) => {
                    self.lower(expr, if last { mode } else { Mode::Effect })?;
                }
                Stmt::Var { defn, init } => {
                    if let Some(init) = init {
                        self.lower(init, Mode::Value)?;
                        self.coerce(&init.ty, &program.defn(*defn).ty)?;
                        let slot = self.slot(*defn)?;
                        self.emit(Inst::StLocal(slot));
                    }
                    if last && mode == Mode::Value {
                        self.emit(Inst::Unit);
                    }
                }
                // Closure classes were allocated in place; plain nested
                // functions are lowered on their own.
                Stmt::Function(_) => {
                    if last && mode == Mode::Value {
                        self.emit(Inst::Unit);
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) fn lower_if(
        &mut self,
        cond: &'a Expr,
        then_branch: &'a Expr,
        else_branch: Option<&'a Expr>,
        mode: Mode,
    ) -> CompileResult<()> {
        self.lower(cond, Mode::Value)?;
        let then_label = self.blocks.label();

        let Some(else_branch) = else_branch else {
            let join = self.blocks.label();
            self.blocks.branch_if(then_label, join);
            if self.blocks.start(then_label) {
                self.lower(then_branch, Mode::Effect)?;
                self.blocks.branch(join);
            }
            if self.blocks.start(join) && mode == Mode::Value {
                self.emit(Inst::Unit);
            }
            return Ok(());
        };

        let else_label = self.blocks.label();
        let join = self.blocks.label();
        self.blocks.branch_if(then_label, else_label);
        if self.blocks.start(then_label) {
            self.lower(then_branch, mode)?;
            self.blocks.branch(join);
        }
        if self.blocks.start(else_label) {
            self.lower(else_branch, mode)?;
            self.blocks.branch(join);
        }
        self.blocks.start(join);
        Ok(())
    }

    pub(super) fn lower_while(
        &mut self,
        cond: &'a Expr,
        body: &'a Expr,
        mode: Mode,
    ) -> CompileResult<()> {
        let header = self.blocks.label();
        let body_label = self.blocks.label();
        let exit = self.blocks.label();

        self.blocks.branch(header);
        if !self.blocks.start(header) {
            return Ok(());
        }
        self.lower(cond, Mode::Value)?;
        self.blocks.branch_if(body_label, exit);
        if self.blocks.start(body_label) {
            self.lower(body, Mode::Effect)?;
            self.blocks.branch(header);
        }
        if self.blocks.start(exit) && mode == Mode::Value {
            self.emit(Inst::Unit);
        }
        Ok(())
    }

    pub(super) fn lower_and(&mut self, left: &'a Expr, right: &'a Expr) -> CompileResult<()> {
        self.lower(left, Mode::Value)?;
        self.emit(Inst::Dup);
        let right_label = self.blocks.label();
        let join = self.blocks.label();
        self.blocks.branch_if(right_label, join);
        self.lower_short_circuit(right, right_label, join)
    }

    pub(super) fn lower_or(&mut self, left: &'a Expr, right: &'a Expr) -> CompileResult<()> {
        self.lower(left, Mode::Value)?;
        self.emit(Inst::Dup);
        let right_label = self.blocks.label();
        let join = self.blocks.label();
        self.blocks.branch_if(join, right_label);
        self.lower_short_circuit(right, right_label, join)
    }

    fn lower_short_circuit(
        &mut self,
        right: &'a Expr,
        right_label: BlockId,
        join: BlockId,
    ) -> CompileResult<()> {
        if self.blocks.start(right_label) {
            self.emit(Inst::Drop);
            self.lower(right, Mode::Value)?;
            self.blocks.branch(join);
        }
        self.blocks.start(join);
        Ok(())
    }

    pub(super) fn lower_throw(&mut self, value: &'a Expr) -> CompileResult<()> {
        self.lower(value, Mode::Value)?;
        self.blocks.terminate(Inst::Throw);
        Ok(())
    }

    pub(super) fn lower_return(&mut self, value: Option<&'a Expr>) -> CompileResult<()> {
        match value {
            Some(value) => {
                self.lower(value, Mode::Value)?;
                self.coerce(&value.ty, self.return_type())?;
            }
            None => self.emit(Inst::Unit),
        }

        for depth in (0..self.unwind.len()).rev() {
            let entry = self.unwind[depth];
            if entry.handler_active {
                let next = self.blocks.label();
                self.blocks.terminate(Inst::PopTry(next));
                self.blocks.start(next);
            }
            if let Some(finally) = entry.finally {
                // The copy runs outside the regions it belongs to.
                let inner = self.unwind.split_off(depth);
                let result = self.lower(finally, Mode::Effect);
                self.unwind.extend(inner);
                result?;
            }
        }
        self.blocks.terminate(Inst::Ret);
        Ok(())
    }

    pub(super) fn lower_try(
        &mut self,
        body: &'a Expr,
        catches: &'a [CatchClause],
        finally: Option<&'a Expr>,
        mode: Mode,
    ) -> CompileResult<()> {
        if catches.is_empty() && finally.is_none() {
            return self.lower(body, mode);
        }
        if !self.blocks.is_reachable() {
            return Ok(());
        }

        let body_label = self.blocks.label();
        let handler = self.blocks.label();
        self.blocks.terminate(Inst::PushTry(body_label, handler));

        let Some(finally) = finally else {
            let join = self.blocks.label();
            self.lower_protected(body, body_label, join, None, mode)?;
            let no_match = self.lower_catches(handler, catches, join, mode)?;
            let joined = self.blocks.start(join);
            if self.blocks.start(no_match) {
                self.blocks.terminate(Inst::Throw);
            }
            if joined {
                self.blocks.resume(join);
            }
            return Ok(());
        };

        let normal = self.blocks.label();
        self.lower_protected(body, body_label, normal, Some(finally), mode)?;
        let unwinding = if catches.is_empty() {
            handler
        } else {
            self.unwind.push(Unwind {
                finally: Some(finally),
                handler_active: false,
            });
            let no_match = self.lower_catches(handler, catches, normal, mode);
            self.unwind.pop();
            no_match?
        };

        let finally_label = self.blocks.label();
        if self.blocks.start(normal) {
            self.emit(Inst::Null);
            self.blocks.branch(finally_label);
        }
        if self.blocks.start(unwinding) {
            self.emit(Inst::Uninitialized);
            self.emit(Inst::Swap);
            self.blocks.branch(finally_label);
        }
        if !self.blocks.start(finally_label) {
            return Ok(());
        }
        self.lower(finally, Mode::Effect)?;
        if !self.blocks.is_referenced(normal) {
            self.blocks.terminate(Inst::Throw);
            return Ok(());
        }

        let resume = self.blocks.label();
        let rethrow = self.blocks.label();
        self.emit(Inst::Dup);
        self.emit(Inst::Null);
        self.emit(Inst::Eqp);
        self.blocks.branch_if(resume, rethrow);
        self.blocks.start(resume);
        self.emit(Inst::Drop);
        self.blocks.start(rethrow);
        self.blocks.terminate(Inst::Throw);
        self.blocks.resume(resume);
        Ok(())
    }

    /// The body of a protected region, leaving it through `poptry`.
    fn lower_protected(
        &mut self,
        body: &'a Expr,
        label: BlockId,
        exit: BlockId,
        finally: Option<&'a Expr>,
        mode: Mode,
    ) -> CompileResult<()> {
        self.blocks.start(label);
        self.unwind.push(Unwind {
            finally,
            handler_active: true,
        });
        let result = self.lower(body, mode);
        self.unwind.pop();
        result?;
        self.blocks.terminate(Inst::PopTry(exit));
        Ok(())
    }

    /// Test the exception on the stack against each clause in turn. Returns
    /// the label reached when no clause matches, with the exception still
    /// on the stack.
    fn lower_catches(
        &mut self,
        handler: BlockId,
        catches: &'a [CatchClause],
        done: BlockId,
        mode: Mode,
    ) -> CompileResult<BlockId> {
        let typeof_slot = self.method_slot(OBJECT_CLASS, TYPEOF_METHOD)?;
        let subtype_slot = self.method_slot(TYPE_CLASS, IS_SUBTYPE_OF_METHOD)?;

        let mut next = handler;
        for clause in catches {
            self.blocks.start(next);
            let matched = self.blocks.label();
            next = self.blocks.label();

            self.emit(Inst::Dup);
            self.emit(Inst::CallV {
                argc: 1,
                slot: typeof_slot,
            });
            self.emit(Inst::AllocArrI(TYPE_CLASS, 1));
            self.emit(Inst::Dup);
            self.emit(Inst::Cls(clause.guard.unwrap_or(EXCEPTION_CLASS)));
            self.emit(Inst::CallG(TYPE_CONSTRUCTOR));
            self.emit(Inst::Drop);
            self.emit(Inst::CallV {
                argc: 2,
                slot: subtype_slot,
            });
            self.blocks.branch_if(matched, next);

            self.blocks.start(matched);
            match clause.binding {
                Some(binding) => {
                    let slot = self.slot(binding)?;
                    self.emit(Inst::StLocal(slot));
                }
                None => self.emit(Inst::Drop),
            }
            self.lower(&clause.body, mode)?;
            self.blocks.branch(done);
        }
        Ok(next)
    }

    fn method_slot(&self, class: ClassId, method: FunctionId) -> CompileResult<u32> {
        self.program
            .class(class)
            .layout
            .as_ref()
            .and_then(|layout| layout.method_slot(method))
            .ok_or_else(|| {
                self.fail(format!(
                    "builtin method `{}` has no slot",
                    self.program.function(method).name
                ))
            })
    }
}
