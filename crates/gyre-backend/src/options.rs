//! Compile options
//!
//! Options are read from TOML, e.g.
//!
//! ```toml
//! verify = true
//! max_locals = 4096
//! ```

use crate::error::CompileResult;
use serde::{Deserialize, Serialize};

/// Largest slot count a lowered function may use by default.
pub const DEFAULT_MAX_LOCALS: usize = 65535;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Check the block graph of every lowered function before returning.
    pub verify: bool,
    /// Maximum number of declared locals per function.
    pub max_locals: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            verify: true,
            max_locals: DEFAULT_MAX_LOCALS,
        }
    }
}

impl CompileOptions {
    pub fn from_toml_str(source: &str) -> CompileResult<Self> {
        Ok(toml::from_str(source)?)
    }
}
