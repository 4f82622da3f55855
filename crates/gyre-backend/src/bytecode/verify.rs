//! Block-graph verification
//!
//! Checks the structural guarantees every lowered body must satisfy: one
//! trailing terminator per block, branch targets inside the function, every
//! block reachable from the entry, and operands that resolve against the
//! program's tables.

use super::{BlockId, Inst, LoweredBody};
use crate::error::{CompileError, CompileResult};
use crate::model::Program;

pub fn verify_program(program: &Program) -> CompileResult<()> {
    for function in &program.functions {
        if let Some(body) = &function.lowered {
            verify_body(program, &function.name, body)?;
        }
    }
    Ok(())
}

pub fn verify_body(program: &Program, function: &str, body: &LoweredBody) -> CompileResult<()> {
    if body.blocks.is_empty() {
        return Err(CompileError::lowering(function, "lowered body has no blocks"));
    }

    let block_count = body.blocks.len() as u32;
    for (index, block) in body.blocks.iter().enumerate() {
        let index = index as u32;
        if block.id != BlockId(index) {
            return Err(CompileError::lowering(
                function,
                format!("block at position {} is numbered {}", index, block.id.0),
            ));
        }

        let Some((last, rest)) = block.instructions.split_last() else {
            return Err(CompileError::UnterminatedBlock {
                function: function.to_string(),
                block: index,
            });
        };
        if !last.is_terminator() {
            return Err(CompileError::UnterminatedBlock {
                function: function.to_string(),
                block: index,
            });
        }
        if let Some(early) = rest.iter().find(|i| i.is_terminator()) {
            return Err(CompileError::lowering(
                function,
                format!("block {} transfers control before its end at `{}`", index, early),
            ));
        }

        for target in last.successors() {
            if target.0 >= block_count {
                return Err(CompileError::InvalidBranchTarget {
                    function: function.to_string(),
                    block: index,
                    target: target.0,
                });
            }
        }

        for inst in &block.instructions {
            if !operand_in_range(program, body, inst) {
                return Err(CompileError::InvalidOperand {
                    function: function.to_string(),
                    block: index,
                    inst: inst.to_string(),
                });
            }
        }
    }

    let mut reached = vec![false; body.blocks.len()];
    let mut worklist = vec![BlockId(0)];
    while let Some(id) = worklist.pop() {
        let seen = &mut reached[id.0 as usize];
        if *seen {
            continue;
        }
        *seen = true;
        worklist.extend(body.blocks[id.0 as usize].successors());
    }
    if let Some(index) = reached.iter().position(|r| !r) {
        return Err(CompileError::UnreachableBlock {
            function: function.to_string(),
            block: index as u32,
        });
    }

    Ok(())
}

fn operand_in_range(program: &Program, body: &LoweredBody, inst: &Inst) -> bool {
    match inst {
        Inst::LdLocal(slot) | Inst::StLocal(slot) => {
            let slot = *slot as i64;
            slot >= -(body.locals.len() as i64) && slot < body.params.len() as i64
        }
        Inst::LdG(i) | Inst::StG(i) => (*i as usize) < program.globals.len(),
        Inst::String(i) => (*i as usize) < program.strings.len(),
        Inst::AllocObj(c) | Inst::AllocArrI(c, _) | Inst::Cls(c) | Inst::Tyc(c) => {
            c.index() < program.classes.len()
        }
        Inst::Tyv(t) => t.index() < program.type_params.len(),
        Inst::CallG(f) => f.index() < program.functions.len(),
        Inst::CallV { argc, .. } => *argc >= 1,
        _ => true,
    }
}
