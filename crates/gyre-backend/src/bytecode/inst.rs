//! Stack-machine instructions
//!
//! Terminators (`ret`, `branch`, `branchif`, `pushtry`, `poptry`, `throw`)
//! are ordinary instructions that may only appear last in a block.

use super::BlockId;
use crate::model::{ClassId, FunctionId, TypeParamId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer operand width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntWidth {
    I8,
    I16,
    I32,
    I64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::I8 => 8,
            IntWidth::I16 => 16,
            IntWidth::I32 => 32,
            IntWidth::I64 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatWidth {
    F32,
    F64,
}

impl FloatWidth {
    pub fn bits(self) -> u32 {
        match self {
            FloatWidth::F32 => 32,
            FloatWidth::F64 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lsl,
    Lsr,
    Asr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Neg,
    Inv,
}

impl IntOp {
    fn mnemonic(self) -> &'static str {
        match self {
            IntOp::Add => "add",
            IntOp::Sub => "sub",
            IntOp::Mul => "mul",
            IntOp::Div => "div",
            IntOp::Mod => "mod",
            IntOp::Lsl => "lsl",
            IntOp::Lsr => "lsr",
            IntOp::Asr => "asr",
            IntOp::And => "and",
            IntOp::Or => "or",
            IntOp::Xor => "xor",
            IntOp::Eq => "eq",
            IntOp::Ne => "ne",
            IntOp::Lt => "lt",
            IntOp::Le => "le",
            IntOp::Gt => "gt",
            IntOp::Ge => "ge",
            IntOp::Neg => "neg",
            IntOp::Inv => "inv",
        }
    }

    pub fn is_unary(self) -> bool {
        matches!(self, IntOp::Neg | IntOp::Inv)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Neg,
}

impl FloatOp {
    fn mnemonic(self) -> &'static str {
        match self {
            FloatOp::Add => "add",
            FloatOp::Sub => "sub",
            FloatOp::Mul => "mul",
            FloatOp::Div => "div",
            FloatOp::Eq => "eq",
            FloatOp::Ne => "ne",
            FloatOp::Lt => "lt",
            FloatOp::Le => "le",
            FloatOp::Gt => "gt",
            FloatOp::Ge => "ge",
            FloatOp::Neg => "neg",
        }
    }
}

/// Numeric conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conversion {
    /// Truncate an integer to the given width.
    Trunc(IntWidth),
    /// Sign-extend from `from` to `to`.
    Sext { to: IntWidth, from: IntWidth },
    TruncF32,
    ExtF64,
    /// Float to integer of the same width.
    FloatToInt(FloatWidth),
    /// Integer to float of the same width.
    IntToFloat(FloatWidth),
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::Trunc(w) => write!(f, "trunci{}", w.bits()),
            Conversion::Sext { to, from } => write!(f, "sexti{}_{}", to.bits(), from.bits()),
            Conversion::TruncF32 => write!(f, "truncf32"),
            Conversion::ExtF64 => write!(f, "extf64"),
            Conversion::FloatToInt(w) => write!(f, "fcvti{}", w.bits()),
            Conversion::IntToFloat(w) => write!(f, "icvtf{}", w.bits()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inst {
    // Control
    Nop,
    Ret,
    Branch(BlockId),
    /// Pops a boolean: true goes to the first target.
    BranchIf(BlockId, BlockId),
    /// Opens a protected region: (body, handler).
    PushTry(BlockId, BlockId),
    /// Closes the innermost protected region and continues at the target.
    PopTry(BlockId),
    Throw,

    // Stack
    Drop,
    Dup,
    DupI(u32),
    Swap,
    /// Swaps the top value with the one two below it.
    Swap2,

    // Constants
    Unit,
    True,
    False,
    Null,
    Uninitialized,
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Index into the program's string pool.
    String(u32),

    // Variables
    LdLocal(i32),
    StLocal(i32),
    LdG(u32),
    StG(u32),

    // Fields (operand is the flattened field index)
    Ld8(u32),
    Ld16(u32),
    Ld32(u32),
    Ld64(u32),
    /// Load a pointer field.
    Ldp(u32),
    /// Load a pointer field, faulting on null or uninitialized.
    Ldpc(u32),
    St8(u32),
    St16(u32),
    St32(u32),
    St64(u32),
    Stp(u32),

    // Objects and types
    AllocObj(ClassId),
    AllocArrI(ClassId, u32),
    Cls(ClassId),
    /// Push a class type; its arguments must already be pushed.
    Tyc(ClassId),
    /// Push the caller-supplied binding of a type parameter.
    Tyv(TypeParamId),
    Cast,

    // Calls
    CallG(FunctionId),
    /// Virtual call; `argc` counts the receiver.
    CallV { argc: u32, slot: u32 },

    // Arithmetic
    Eqp,
    Nep,
    Int(IntOp, IntWidth),
    Float(FloatOp, FloatWidth),
    NotB,
    Convert(Conversion),
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Inst::Ret
                | Inst::Branch(_)
                | Inst::BranchIf(..)
                | Inst::PushTry(..)
                | Inst::PopTry(_)
                | Inst::Throw
        )
    }

    /// Blocks this instruction may transfer control to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Inst::Branch(b) | Inst::PopTry(b) => vec![*b],
            Inst::BranchIf(a, b) | Inst::PushTry(a, b) => vec![*a, *b],
            _ => Vec::new(),
        }
    }

    pub(crate) fn map_targets(&mut self, mut f: impl FnMut(BlockId) -> BlockId) {
        match self {
            Inst::Branch(b) | Inst::PopTry(b) => *b = f(*b),
            Inst::BranchIf(a, b) | Inst::PushTry(a, b) => {
                *a = f(*a);
                *b = f(*b);
            }
            _ => {}
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Nop => write!(f, "nop"),
            Inst::Ret => write!(f, "ret"),
            Inst::Branch(b) => write!(f, "branch {}", b.0),
            Inst::BranchIf(t, e) => write!(f, "branchif {}, {}", t.0, e.0),
            Inst::PushTry(t, h) => write!(f, "pushtry {}, {}", t.0, h.0),
            Inst::PopTry(b) => write!(f, "poptry {}", b.0),
            Inst::Throw => write!(f, "throw"),
            Inst::Drop => write!(f, "drop"),
            Inst::Dup => write!(f, "dup"),
            Inst::DupI(n) => write!(f, "dupi {}", n),
            Inst::Swap => write!(f, "swap"),
            Inst::Swap2 => write!(f, "swap2"),
            Inst::Unit => write!(f, "unit"),
            Inst::True => write!(f, "true"),
            Inst::False => write!(f, "false"),
            Inst::Null => write!(f, "null"),
            Inst::Uninitialized => write!(f, "uninitialized"),
            Inst::I8(v) => write!(f, "i8 {}", v),
            Inst::I16(v) => write!(f, "i16 {}", v),
            Inst::I32(v) => write!(f, "i32 {}", v),
            Inst::I64(v) => write!(f, "i64 {}", v),
            Inst::F32(v) => write!(f, "f32 {}", v),
            Inst::F64(v) => write!(f, "f64 {}", v),
            Inst::String(i) => write!(f, "string {}", i),
            Inst::LdLocal(i) => write!(f, "ldlocal {}", i),
            Inst::StLocal(i) => write!(f, "stlocal {}", i),
            Inst::LdG(i) => write!(f, "ldg {}", i),
            Inst::StG(i) => write!(f, "stg {}", i),
            Inst::Ld8(i) => write!(f, "ld8 {}", i),
            Inst::Ld16(i) => write!(f, "ld16 {}", i),
            Inst::Ld32(i) => write!(f, "ld32 {}", i),
            Inst::Ld64(i) => write!(f, "ld64 {}", i),
            Inst::Ldp(i) => write!(f, "ldp {}", i),
            Inst::Ldpc(i) => write!(f, "ldpc {}", i),
            Inst::St8(i) => write!(f, "st8 {}", i),
            Inst::St16(i) => write!(f, "st16 {}", i),
            Inst::St32(i) => write!(f, "st32 {}", i),
            Inst::St64(i) => write!(f, "st64 {}", i),
            Inst::Stp(i) => write!(f, "stp {}", i),
            Inst::AllocObj(c) => write!(f, "allocobj {}", c.0),
            Inst::AllocArrI(c, n) => write!(f, "allocarri {}, {}", c.0, n),
            Inst::Cls(c) => write!(f, "cls {}", c.0),
            Inst::Tyc(c) => write!(f, "tyc {}", c.0),
            Inst::Tyv(t) => write!(f, "tyv {}", t.0),
            Inst::Cast => write!(f, "cast"),
            Inst::CallG(id) => write!(f, "callg {}", id.0),
            Inst::CallV { argc, slot } => write!(f, "callv {}, {}", argc, slot),
            Inst::Eqp => write!(f, "eqp"),
            Inst::Nep => write!(f, "nep"),
            Inst::Int(op, w) => write!(f, "{}i{}", op.mnemonic(), w.bits()),
            Inst::Float(op, w) => write!(f, "{}f{}", op.mnemonic(), w.bits()),
            Inst::NotB => write!(f, "notb"),
            Inst::Convert(c) => write!(f, "{}", c),
        }
    }
}
