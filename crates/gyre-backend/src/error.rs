//! Compilation errors
//!
//! Two classes of failure exist at this layer: layout errors, found while
//! flattening the class hierarchy, and lowering invariant violations, which
//! mean an earlier pass handed code generation something it cannot lower.

use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    // ── Layout errors ──
    #[error("Class `{class}` inherits from itself")]
    InheritanceCycle { class: String },

    #[error("Class `{class}`: field `{field}` is declared by both `{first}` and `{second}`")]
    ConflictingField {
        class: String,
        field: String,
        first: String,
        second: String,
    },

    #[error("Class `{class}`: method `{method}` is incompatible with the inherited `{method}`")]
    IncompatibleOverride { class: String, method: String },

    #[error("Class `{class}`: method `{method}` is declared more than once")]
    DuplicateMethod { class: String, method: String },

    // ── Lowering invariant violations ──
    #[error("Function `{function}`: reference to unresolved definition `{name}`")]
    UnresolvedDefinition { function: String, name: String },

    #[error("Function `{function}`: no context chain reaches scope {scope} for `{name}`")]
    UnreachableContext {
        function: String,
        scope: String,
        name: String,
    },

    #[error("Function `{function}`: block {block} has no terminator")]
    UnterminatedBlock { function: String, block: u32 },

    #[error("Function `{function}`: block {block} branches to missing block {target}")]
    InvalidBranchTarget {
        function: String,
        block: u32,
        target: u32,
    },

    #[error("Function `{function}`: block {block} has an out-of-range operand in `{inst}`")]
    InvalidOperand {
        function: String,
        block: u32,
        inst: String,
    },

    #[error("Function `{function}`: block {block} is unreachable")]
    UnreachableBlock { function: String, block: u32 },

    #[error("Class `{class}` has not been flattened")]
    LayoutNotFinalized { class: String },

    #[error("Class `{class}` has no no-argument constructor")]
    MissingDefaultConstructor { class: String },

    #[error("Function `{function}`: too many local variables (max {max})")]
    TooManyLocals { function: String, max: usize },

    #[error("Function `{function}`: {message}")]
    InvalidLowering { function: String, message: String },

    // ── Ambient ──
    #[error("Invalid compile options: {0}")]
    Options(#[from] toml::de::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompileError {
    /// Whether this error was found while flattening classes.
    pub fn is_layout_error(&self) -> bool {
        matches!(
            self,
            CompileError::InheritanceCycle { .. }
                | CompileError::ConflictingField { .. }
                | CompileError::IncompatibleOverride { .. }
                | CompileError::DuplicateMethod { .. }
        )
    }

    /// Whether this error reports a defect in an earlier pass.
    pub fn is_invariant_violation(&self) -> bool {
        !self.is_layout_error()
            && !matches!(
                self,
                CompileError::Options(_)
                    | CompileError::Serialization(_)
                    | CompileError::TooManyLocals { .. }
            )
    }

    pub(crate) fn lowering(function: &str, message: impl Into<String>) -> Self {
        CompileError::InvalidLowering {
            function: function.to_string(),
            message: message.into(),
        }
    }
}
