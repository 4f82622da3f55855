//! Gyre compiler back end
//!
//! Turns a fully resolved, fully typed program into closure-free, flat,
//! stack-machine bytecode. The passes run in a fixed order:
//!
//! 1. [`members`]: synthesize default constructors, initializers and `$init`
//! 2. [`closure`]: capture analysis and closure conversion
//! 3. [`layout`]: class flattening (field offsets and method slots)
//! 4. [`codegen`]: lowering of function bodies to basic blocks
//!
//! [`Compiler`] drives them and optionally verifies the result.

pub mod bytecode;
pub mod closure;
pub mod codegen;
pub mod error;
pub mod layout;
pub mod members;
pub mod model;
pub mod options;

pub use bytecode::{BasicBlock, BlockId, Inst, LocalSlot, LoweredBody, PrettyPrint};
pub use error::{CompileError, CompileResult};
pub use model::{ClassId, DefnId, Expr, FunctionId, Program, Type};
pub use options::CompileOptions;

use tracing::debug;

/// Back end driver
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Run every pass over `program` and return the lowered program.
    pub fn compile(&self, mut program: Program) -> CompileResult<Program> {
        debug!(
            classes = program.classes.len(),
            functions = program.functions.len(),
            "compiling program"
        );

        members::synthesize(&mut program);
        closure::convert_closures(&mut program)?;
        layout::flatten_classes(&mut program)?;
        codegen::generate(&mut program, &self.options)?;

        if self.options.verify {
            bytecode::verify_program(&program)?;
        }

        debug!(strings = program.strings.len(), "compilation finished");
        Ok(program)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}
