//! Lowered function bodies
//!
//! A lowered body is an ordered list of basic blocks. Each block is a
//! straight-line instruction sequence ending in exactly one terminator.

mod inst;
mod pretty;
mod verify;

pub use inst::{Conversion, FloatOp, FloatWidth, Inst, IntOp, IntWidth};
pub use pretty::PrettyPrint;
pub use verify::{verify_body, verify_program};

use crate::model::{DefnId, Type};
use serde::{Deserialize, Serialize};

/// Basic block identifier (its position in the block list)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Inst>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
        }
    }

    /// The final control instruction, if the block has one.
    pub fn terminator(&self) -> Option<&Inst> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator().map(Inst::successors).unwrap_or_default()
    }
}

/// A parameter or local variable slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSlot {
    pub defn: DefnId,
    pub name: String,
    pub ty: Type,
    /// Parameters count up from 0, locals down from -1.
    pub slot: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoweredBody {
    pub params: Vec<LocalSlot>,
    pub locals: Vec<LocalSlot>,
    pub blocks: Vec<BasicBlock>,
}

impl LoweredBody {
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0 as usize)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn slot_of(&self, defn: DefnId) -> Option<i32> {
        self.params
            .iter()
            .chain(self.locals.iter())
            .find(|s| s.defn == defn)
            .map(|s| s.slot)
    }

    /// Instructions of every block, in order.
    pub fn instructions(&self) -> Vec<Vec<Inst>> {
        self.blocks.iter().map(|b| b.instructions.clone()).collect()
    }
}
