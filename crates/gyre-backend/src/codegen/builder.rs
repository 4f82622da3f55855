//! Basic block construction
//!
//! Labels are handed out before their code exists and only become blocks
//! when started. A label that no reachable terminator refers to is never
//! started, so dead code never produces blocks. Block ids are assigned in
//! the order labels are started, which makes them increase along a
//! left-to-right walk of the control tree.

use crate::bytecode::{BasicBlock, BlockId, Inst};
use crate::error::{CompileError, CompileResult};

#[derive(Debug, Default)]
struct LabelState {
    code: Vec<Inst>,
    started: bool,
    referenced: bool,
}

#[derive(Debug)]
pub(super) struct BlockBuilder {
    labels: Vec<LabelState>,
    /// Started labels, in start order.
    order: Vec<usize>,
    current: Option<usize>,
}

impl BlockBuilder {
    /// A builder positioned at the start of the entry block.
    pub fn new() -> Self {
        let mut builder = Self {
            labels: Vec::new(),
            order: Vec::new(),
            current: None,
        };
        let entry = builder.label();
        builder.labels[0].referenced = true;
        builder.start(entry);
        builder
    }

    /// Allocate a label. It becomes a block only if started.
    pub fn label(&mut self) -> BlockId {
        self.labels.push(LabelState::default());
        BlockId::new((self.labels.len() - 1) as u32)
    }

    /// Whether code emitted now would be reachable.
    pub fn is_reachable(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_referenced(&self, label: BlockId) -> bool {
        self.labels[label.0 as usize].referenced
    }

    /// Begin emitting into `label`. Returns false, leaving the builder
    /// unreachable, when nothing branches to it.
    pub fn start(&mut self, label: BlockId) -> bool {
        let index = label.0 as usize;
        let state = &mut self.labels[index];
        if !state.referenced || state.started {
            self.current = None;
            return false;
        }
        state.started = true;
        self.order.push(index);
        self.current = Some(index);
        true
    }

    /// Continue emitting into a started, unterminated block.
    pub fn resume(&mut self, label: BlockId) {
        let index = label.0 as usize;
        let state = &self.labels[index];
        let open = state.code.last().map_or(true, |i| !i.is_terminator());
        self.current = (state.started && open).then_some(index);
    }

    pub fn emit(&mut self, inst: Inst) {
        if let Some(current) = self.current {
            self.labels[current].code.push(inst);
        }
    }

    /// End the current block with `inst`, marking its targets live.
    pub fn terminate(&mut self, inst: Inst) {
        let Some(current) = self.current.take() else {
            return;
        };
        for target in inst.successors() {
            self.labels[target.0 as usize].referenced = true;
        }
        self.labels[current].code.push(inst);
    }

    pub fn branch(&mut self, target: BlockId) {
        self.terminate(Inst::Branch(target));
    }

    pub fn branch_if(&mut self, if_true: BlockId, if_false: BlockId) {
        self.terminate(Inst::BranchIf(if_true, if_false));
    }

    /// Renumber labels to block ids and produce the block list.
    pub fn finish(mut self, function: &str) -> CompileResult<Vec<BasicBlock>> {
        let mut ids = vec![None; self.labels.len()];
        for (position, label) in self.order.iter().enumerate() {
            ids[*label] = Some(BlockId::new(position as u32));
        }

        let mut blocks = Vec::with_capacity(self.order.len());
        for (position, label) in self.order.iter().enumerate() {
            let mut code = std::mem::take(&mut self.labels[*label].code);
            if !code.last().is_some_and(Inst::is_terminator) {
                return Err(CompileError::UnterminatedBlock {
                    function: function.to_string(),
                    block: position as u32,
                });
            }
            let mut missing = None;
            for inst in &mut code {
                inst.map_targets(|target| match ids[target.0 as usize] {
                    Some(id) => id,
                    None => {
                        missing = Some(target.0);
                        target
                    }
                });
            }
            if let Some(target) = missing {
                return Err(CompileError::InvalidBranchTarget {
                    function: function.to_string(),
                    block: position as u32,
                    target,
                });
            }
            blocks.push(BasicBlock {
                id: BlockId::new(position as u32),
                instructions: code,
            });
        }
        Ok(blocks)
    }
}
