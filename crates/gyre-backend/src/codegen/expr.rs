//! Expression lowering
//!
//! Stores keep the receiver below the value: a field store pops the
//! receiver from the top, then the value. Value-producing stores duplicate
//! the value and move the copy under the receiver with `swap2`.

use super::{Lowering, Mode};
use crate::bytecode::{Conversion, FloatOp, FloatWidth, Inst, IntOp, IntWidth};
use crate::error::{CompileError, CompileResult};
use crate::model::{
    BinaryOp, Callee, ClassId, DefnId, DefnKind, Expr, ExprKind, FunctionId, Literal, Repr, Type,
    UnaryOp,
};

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(IntWidth),
    Float(FloatWidth),
}

fn numeric(ty: &Type) -> Option<Numeric> {
    match ty {
        Type::I8 => Some(Numeric::Int(IntWidth::I8)),
        Type::I16 => Some(Numeric::Int(IntWidth::I16)),
        Type::I32 => Some(Numeric::Int(IntWidth::I32)),
        Type::I64 => Some(Numeric::Int(IntWidth::I64)),
        Type::F32 => Some(Numeric::Float(FloatWidth::F32)),
        Type::F64 => Some(Numeric::Float(FloatWidth::F64)),
        _ => None,
    }
}

/// The integer width with as many bits as `width`.
fn int_of(width: FloatWidth) -> IntWidth {
    match width {
        FloatWidth::F32 => IntWidth::I32,
        FloatWidth::F64 => IntWidth::I64,
    }
}

pub(super) fn load_inst(repr: Repr, nullable: bool, index: u32) -> Inst {
    match repr {
        Repr::Bits8 => Inst::Ld8(index),
        Repr::Bits16 => Inst::Ld16(index),
        Repr::Bits32 => Inst::Ld32(index),
        Repr::Bits64 => Inst::Ld64(index),
        Repr::Pointer if !nullable => Inst::Ldpc(index),
        Repr::Pointer | Repr::ErasedPointer => Inst::Ldp(index),
    }
}

pub(super) fn store_inst(repr: Repr, index: u32) -> Inst {
    match repr {
        Repr::Bits8 => Inst::St8(index),
        Repr::Bits16 => Inst::St16(index),
        Repr::Bits32 => Inst::St32(index),
        Repr::Bits64 => Inst::St64(index),
        Repr::Pointer | Repr::ErasedPointer => Inst::Stp(index),
    }
}

impl<'a> Lowering<'a, '_> {
    pub(super) fn lower(&mut self, expr: &'a Expr, mode: Mode) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Block(stmts) => self.lower_block(stmts, mode),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_deref(), mode),
            ExprKind::While { cond, body } => self.lower_while(cond, body, mode),
            ExprKind::And(left, right) => {
                self.lower_and(left, right)?;
                self.discard(mode);
                Ok(())
            }
            ExprKind::Or(left, right) => {
                self.lower_or(left, right)?;
                self.discard(mode);
                Ok(())
            }
            ExprKind::Try {
                body,
                catches,
                finally,
            } => self.lower_try(body, catches, finally.as_deref(), mode),
            ExprKind::Throw(value) => self.lower_throw(value),
            ExprKind::Return(value) => self.lower_return(value.as_deref()),
            ExprKind::Assign { target, value } => self.lower_assign(target, value, mode),
            ExprKind::CompoundAssign { op, target, value } => {
                self.lower_compound_assign(*op, target, value, mode)
            }
            ExprKind::InitField {
                receiver,
                field,
                value,
            } => {
                let program = self.program;
                self.lower(value, Mode::Value)?;
                self.coerce(&value.ty, &program.defn(*field).ty)?;
                self.lower(receiver, Mode::Value)?;
                let (index, repr) = self.field_slot(*field)?;
                self.emit(store_inst(repr, index));
                if mode == Mode::Value {
                    self.emit(Inst::Unit);
                }
                Ok(())
            }
            ExprKind::New {
                class,
                constructor,
                args,
            } => self.lower_new(&expr.ty, *class, *constructor, args, mode),
            ExprKind::Call {
                callee,
                type_args,
                args,
            } => {
                self.lower_call(callee, type_args, args)?;
                self.discard(mode);
                Ok(())
            }
            ExprKind::FunctionValue(function) => Err(self.fail(format!(
                "function `{}` is used as a value but has no closure class",
                self.program.function(*function).name
            ))),
            _ => {
                self.lower_value(expr)?;
                self.discard(mode);
                Ok(())
            }
        }
    }

    pub(super) fn discard(&mut self, mode: Mode) {
        if mode == Mode::Effect {
            self.emit(Inst::Drop);
        }
    }

    /// Expressions without control flow or side effects.
    fn lower_value(&mut self, expr: &'a Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Literal(literal) => self.lower_literal(literal),
            ExprKind::Uninitialized => self.emit(Inst::Uninitialized),
            ExprKind::This => {
                if self.function.receiver().is_none() {
                    return Err(CompileError::UnresolvedDefinition {
                        function: self.function.name.clone(),
                        name: "this".to_string(),
                    });
                }
                self.emit(Inst::LdLocal(0));
            }
            ExprKind::Variable(defn) => self.load_variable(*defn)?,
            ExprKind::Field { receiver, field } => {
                self.lower(receiver, Mode::Value)?;
                let (index, repr) = self.field_slot(*field)?;
                let nullable = self.program.defn(*field).ty.is_nullable();
                self.emit(load_inst(repr, nullable, index));
            }
            ExprKind::Binary { op, left, right } => {
                self.lower(left, Mode::Value)?;
                self.lower(right, Mode::Value)?;
                let inst = self.binary_inst(*op, &left.ty)?;
                self.emit(inst);
            }
            ExprKind::Unary { op, operand } => {
                self.lower(operand, Mode::Value)?;
                let inst = self.unary_inst(*op, &operand.ty)?;
                self.emit(inst);
            }
            ExprKind::Convert(operand) => {
                self.lower(operand, Mode::Value)?;
                self.convert(&operand.ty, &expr.ty)?;
            }
            other => return Err(self.fail(format!("cannot lower {:?} as a value", other))),
        }
        Ok(())
    }

    fn lower_literal(&mut self, literal: &Literal) {
        let inst = match literal {
            Literal::Unit => Inst::Unit,
            Literal::Boolean(true) => Inst::True,
            Literal::Boolean(false) => Inst::False,
            Literal::I8(v) => Inst::I8(*v),
            Literal::I16(v) => Inst::I16(*v),
            Literal::I32(v) => Inst::I32(*v),
            Literal::I64(v) => Inst::I64(*v),
            Literal::F32(v) => Inst::F32(*v),
            Literal::F64(v) => Inst::F64(*v),
            Literal::Null => Inst::Null,
            Literal::String(s) => {
                if !self.blocks.is_reachable() {
                    return;
                }
                Inst::String(self.strings.intern(s))
            }
        };
        self.emit(inst);
    }

    fn load_variable(&mut self, defn: DefnId) -> CompileResult<()> {
        let inst = match self.program.defn(defn).kind {
            DefnKind::Global(index) => Inst::LdG(index),
            DefnKind::Parameter | DefnKind::Local => Inst::LdLocal(self.slot(defn)?),
            DefnKind::Field(_) => {
                return Err(self.fail(format!(
                    "field `{}` is read without a receiver",
                    self.program.defn(defn).name
                )))
            }
        };
        self.emit(inst);
        Ok(())
    }

    fn store_variable(&mut self, defn: DefnId) -> CompileResult<()> {
        let inst = match self.program.defn(defn).kind {
            DefnKind::Global(index) => Inst::StG(index),
            DefnKind::Parameter | DefnKind::Local => Inst::StLocal(self.slot(defn)?),
            DefnKind::Field(_) => {
                return Err(self.fail(format!(
                    "field `{}` is written without a receiver",
                    self.program.defn(defn).name
                )))
            }
        };
        self.emit(inst);
        Ok(())
    }

    /// Store the value on top of the stack into `field` of the object below it.
    fn store_field(&mut self, field: DefnId, mode: Mode) -> CompileResult<()> {
        match mode {
            Mode::Value => {
                self.emit(Inst::Dup);
                self.emit(Inst::Swap2);
            }
            Mode::Effect => self.emit(Inst::Swap),
        }
        let (index, repr) = self.field_slot(field)?;
        self.emit(store_inst(repr, index));
        Ok(())
    }

    fn lower_assign(&mut self, target: &'a Expr, value: &'a Expr, mode: Mode) -> CompileResult<()> {
        match &target.kind {
            ExprKind::Variable(defn) => {
                self.lower(value, Mode::Value)?;
                self.coerce(&value.ty, &target.ty)?;
                if mode == Mode::Value {
                    self.emit(Inst::Dup);
                }
                self.store_variable(*defn)
            }
            ExprKind::Field { receiver, field } => {
                self.lower(receiver, Mode::Value)?;
                self.lower(value, Mode::Value)?;
                self.coerce(&value.ty, &target.ty)?;
                self.store_field(*field, mode)
            }
            _ => Err(self.fail("assignment target is neither a variable nor a field")),
        }
    }

    fn lower_compound_assign(
        &mut self,
        op: BinaryOp,
        target: &'a Expr,
        value: &'a Expr,
        mode: Mode,
    ) -> CompileResult<()> {
        let inst = self.binary_inst(op, &target.ty)?;
        match &target.kind {
            ExprKind::Variable(defn) => {
                self.load_variable(*defn)?;
                self.lower(value, Mode::Value)?;
                self.emit(inst);
                if mode == Mode::Value {
                    self.emit(Inst::Dup);
                }
                self.store_variable(*defn)
            }
            ExprKind::Field { receiver, field } => {
                self.lower(receiver, Mode::Value)?;
                self.emit(Inst::Dup);
                let (index, repr) = self.field_slot(*field)?;
                let nullable = self.program.defn(*field).ty.is_nullable();
                self.emit(load_inst(repr, nullable, index));
                self.lower(value, Mode::Value)?;
                self.emit(inst);
                self.store_field(*field, mode)
            }
            _ => Err(self.fail("assignment target is neither a variable nor a field")),
        }
    }

    fn binary_inst(&self, op: BinaryOp, operand: &Type) -> CompileResult<Inst> {
        match numeric(operand) {
            Some(Numeric::Int(width)) => {
                let op = match op {
                    BinaryOp::Add => IntOp::Add,
                    BinaryOp::Sub => IntOp::Sub,
                    BinaryOp::Mul => IntOp::Mul,
                    BinaryOp::Div => IntOp::Div,
                    BinaryOp::Rem => IntOp::Mod,
                    BinaryOp::Shl => IntOp::Lsl,
                    BinaryOp::LShr => IntOp::Lsr,
                    BinaryOp::AShr => IntOp::Asr,
                    BinaryOp::BitAnd => IntOp::And,
                    BinaryOp::BitOr => IntOp::Or,
                    BinaryOp::BitXor => IntOp::Xor,
                    BinaryOp::Eq => IntOp::Eq,
                    BinaryOp::Ne => IntOp::Ne,
                    BinaryOp::Lt => IntOp::Lt,
                    BinaryOp::Le => IntOp::Le,
                    BinaryOp::Gt => IntOp::Gt,
                    BinaryOp::Ge => IntOp::Ge,
                };
                return Ok(Inst::Int(op, width));
            }
            Some(Numeric::Float(width)) => {
                let op = match op {
                    BinaryOp::Add => Some(FloatOp::Add),
                    BinaryOp::Sub => Some(FloatOp::Sub),
                    BinaryOp::Mul => Some(FloatOp::Mul),
                    BinaryOp::Div => Some(FloatOp::Div),
                    BinaryOp::Eq => Some(FloatOp::Eq),
                    BinaryOp::Ne => Some(FloatOp::Ne),
                    BinaryOp::Lt => Some(FloatOp::Lt),
                    BinaryOp::Le => Some(FloatOp::Le),
                    BinaryOp::Gt => Some(FloatOp::Gt),
                    BinaryOp::Ge => Some(FloatOp::Ge),
                    _ => None,
                };
                if let Some(op) = op {
                    return Ok(Inst::Float(op, width));
                }
            }
            None => {}
        }

        let inst = match (operand, op) {
            (Type::Boolean | Type::Unit, BinaryOp::Eq) => Some(Inst::Int(IntOp::Eq, IntWidth::I8)),
            (Type::Boolean | Type::Unit, BinaryOp::Ne) => Some(Inst::Int(IntOp::Ne, IntWidth::I8)),
            (Type::Boolean, BinaryOp::BitAnd) => Some(Inst::Int(IntOp::And, IntWidth::I8)),
            (Type::Boolean, BinaryOp::BitOr) => Some(Inst::Int(IntOp::Or, IntWidth::I8)),
            (Type::Boolean, BinaryOp::BitXor) => Some(Inst::Int(IntOp::Xor, IntWidth::I8)),
            (ty, BinaryOp::Eq) if ty.is_object() => Some(Inst::Eqp),
            (ty, BinaryOp::Ne) if ty.is_object() => Some(Inst::Nep),
            _ => None,
        };
        inst.ok_or_else(|| self.fail(format!("operator {:?} is not defined on `{}`", op, operand)))
    }

    fn unary_inst(&self, op: UnaryOp, operand: &Type) -> CompileResult<Inst> {
        let inst = match (op, numeric(operand)) {
            (UnaryOp::Neg, Some(Numeric::Int(width))) => Some(Inst::Int(IntOp::Neg, width)),
            (UnaryOp::Neg, Some(Numeric::Float(width))) => Some(Inst::Float(FloatOp::Neg, width)),
            (UnaryOp::BitNot, Some(Numeric::Int(width))) => Some(Inst::Int(IntOp::Inv, width)),
            (UnaryOp::BitNot | UnaryOp::Not, None) if *operand == Type::Boolean => Some(Inst::NotB),
            _ => None,
        };
        inst.ok_or_else(|| self.fail(format!("operator {:?} is not defined on `{}`", op, operand)))
    }

    /// Numeric conversion between primitive types. Floats convert through
    /// the integer type of the same width.
    fn convert(&mut self, from: &Type, to: &Type) -> CompileResult<()> {
        if from == to || from.is_nothing() {
            return Ok(());
        }
        match (numeric(from), numeric(to)) {
            (Some(Numeric::Int(a)), Some(Numeric::Int(b))) => self.resize_int(a, b),
            (Some(Numeric::Float(a)), Some(Numeric::Int(b))) => {
                self.emit(Inst::Convert(Conversion::FloatToInt(a)));
                self.resize_int(int_of(a), b);
            }
            (Some(Numeric::Int(a)), Some(Numeric::Float(b))) => {
                self.resize_int(a, int_of(b));
                self.emit(Inst::Convert(Conversion::IntToFloat(b)));
            }
            (Some(Numeric::Float(FloatWidth::F32)), Some(Numeric::Float(FloatWidth::F64))) => {
                self.emit(Inst::Convert(Conversion::ExtF64))
            }
            (Some(Numeric::Float(FloatWidth::F64)), Some(Numeric::Float(FloatWidth::F32))) => {
                self.emit(Inst::Convert(Conversion::TruncF32))
            }
            _ => {
                return Err(self.fail(format!("cannot convert `{}` to `{}`", from, to)));
            }
        }
        Ok(())
    }

    fn resize_int(&mut self, from: IntWidth, to: IntWidth) {
        if from.bits() < to.bits() {
            self.emit(Inst::Convert(Conversion::Sext { to, from }));
        } else if from.bits() > to.bits() {
            self.emit(Inst::Convert(Conversion::Trunc(to)));
        }
    }

    fn lower_call(
        &mut self,
        callee: &'a Callee,
        type_args: &'a [Type],
        args: &'a [Expr],
    ) -> CompileResult<()> {
        match callee {
            Callee::Function(function) => {
                for arg in args {
                    self.lower(arg, Mode::Value)?;
                }
                self.emit_types(type_args)?;
                self.emit(Inst::CallG(*function));
            }
            Callee::Method { receiver, method } => {
                self.lower(receiver, Mode::Value)?;
                for arg in args {
                    self.lower(arg, Mode::Value)?;
                }
                // Type arguments of the class that declares the method.
                let owner = self.program.function(*method).kind.owner_class();
                if let (Some(ty), Some(owner)) = (receiver.ty.as_class(), owner) {
                    if let Some(owner_args) = self.program.instantiate_supertype(ty, owner) {
                        self.emit_types(&owner_args)?;
                    }
                }
                self.emit_types(type_args)?;
                let inst = self.dispatch(&receiver.ty, *method, args.len())?;
                self.emit(inst);
            }
            Callee::ImplicitMethod(method) => {
                return Err(self.fail(format!(
                    "method `{}` is called without an explicit receiver",
                    self.program.function(*method).name
                )));
            }
        }
        Ok(())
    }

    /// `callg` when the target is statically known, `callv` otherwise.
    fn dispatch(&self, receiver: &Type, method: FunctionId, argc: usize) -> CompileResult<Inst> {
        let target = self.program.function(method);
        if !receiver.is_object() || target.is_final {
            return Ok(Inst::CallG(method));
        }
        let receiver_class = receiver.as_class().map(|ct| ct.class);
        if receiver_class.is_some_and(|c| self.program.class(c).is_final) {
            return Ok(Inst::CallG(method));
        }

        let slot = receiver_class
            .into_iter()
            .chain(target.kind.owner_class())
            .find_map(|class| {
                self.program
                    .class(class)
                    .layout
                    .as_ref()
                    .and_then(|layout| layout.method_slot(method))
            })
            .ok_or_else(|| {
                self.fail(format!("method `{}` has no slot in the receiver's class", target.name))
            })?;
        Ok(Inst::CallV {
            argc: argc as u32 + 1,
            slot,
        })
    }

    fn lower_new(
        &mut self,
        ty: &'a Type,
        class: ClassId,
        constructor: FunctionId,
        args: &'a [Expr],
        mode: Mode,
    ) -> CompileResult<()> {
        let type_args = ty.as_class().map(|ct| ct.args.as_slice()).unwrap_or(&[]);
        self.emit_types(type_args)?;
        self.emit(Inst::AllocObj(class));
        if mode == Mode::Value {
            self.emit(Inst::Dup);
        }
        for arg in args {
            self.lower(arg, Mode::Value)?;
        }
        self.emit_types(type_args)?;
        self.emit(Inst::CallG(constructor));
        self.emit(Inst::Drop);
        Ok(())
    }

    /// Push a runtime type: arguments first, then the class.
    pub(super) fn emit_type(&mut self, ty: &Type) -> CompileResult<()> {
        match ty {
            Type::Class(ct) => {
                self.emit_types(&ct.args)?;
                self.emit(Inst::Tyc(ct.class));
            }
            Type::Variable(param) => self.emit(Inst::Tyv(*param)),
            other => {
                return Err(self.fail(format!("`{}` cannot be used as a type argument", other)));
            }
        }
        Ok(())
    }

    pub(super) fn emit_types(&mut self, types: &[Type]) -> CompileResult<()> {
        for ty in types {
            self.emit_type(ty)?;
        }
        Ok(())
    }

    /// Checked cast between distinct class types.
    pub(super) fn coerce(&mut self, from: &Type, to: &Type) -> CompileResult<()> {
        if let (Type::Class(source), Type::Class(target)) = (from, to) {
            if source.class != target.class || source.args != target.args {
                self.emit_type(to)?;
                self.emit(Inst::Cast);
            }
        }
        Ok(())
    }

    pub(super) fn field_slot(&self, field: DefnId) -> CompileResult<(u32, Repr)> {
        let defn = self.program.defn(field);
        let DefnKind::Field(class) = defn.kind else {
            return Err(self.fail(format!("`{}` is not a field", defn.name)));
        };
        let class = self.program.class(class);
        let layout = class
            .layout
            .as_ref()
            .ok_or_else(|| CompileError::LayoutNotFinalized {
                class: class.name.clone(),
            })?;
        let index = layout.field_index(field).ok_or_else(|| {
            self.fail(format!("field `{}` is missing from `{}`", defn.name, class.name))
        })?;
        Ok((index, layout.fields[index as usize].repr))
    }
}
