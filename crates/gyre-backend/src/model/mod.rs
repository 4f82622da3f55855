//! Typed program model
//!
//! The fully resolved, fully typed program handed over by the front end.
//! Everything lives in flat tables indexed by small integer ids; the passes
//! only ever append to these tables or annotate existing entries.

mod builtins;
mod expr;
mod program;
mod types;
mod visit;

pub use builtins::*;
pub use expr::{BinaryOp, Callee, CatchClause, Expr, ExprKind, Literal, Stmt, UnaryOp};
pub use program::{
    ChainCall, Class, ClassOrigin, ConstructorChain, DefnKind, Definition, FieldDecl, Function,
    FunctionKind, Global, Program, Scope, ScopeKind, TypeParameter,
};
pub use types::{ClassType, Repr, Type};
pub use visit::{walk_expr, walk_expr_mut, walk_stmt, walk_stmt_mut, Visitor, VisitorMut};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            pub fn as_u32(&self) -> u32 {
                self.0
            }

            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Index into [`Program::classes`]
    ClassId,
    "class"
);
define_id!(
    /// Index into [`Program::functions`]
    FunctionId,
    "fn"
);
define_id!(
    /// Index into [`Program::definitions`]
    DefnId,
    "defn"
);
define_id!(
    /// Index into [`Program::scopes`]
    ScopeId,
    "scope"
);
define_id!(
    /// Index into [`Program::type_params`]
    TypeParamId,
    "T"
);
