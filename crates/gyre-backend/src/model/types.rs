//! Source-level types as seen by the back end

use super::{ClassId, TypeParamId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Unit,
    Boolean,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Bottom type: an expression of this type never completes normally.
    Nothing,
    /// Type of the `null` literal.
    Null,
    Class(ClassType),
    Variable(TypeParamId),
}

/// An instantiated class type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassType {
    pub class: ClassId,
    pub args: Vec<Type>,
    pub nullable: bool,
}

impl ClassType {
    pub fn new(class: ClassId, args: Vec<Type>) -> Self {
        Self {
            class,
            args,
            nullable: false,
        }
    }
}

/// Storage representation of a field or method result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Repr {
    Bits8,
    Bits16,
    Bits32,
    Bits64,
    Pointer,
    /// A pointer whose static type is a type parameter.
    ErasedPointer,
}

impl Repr {
    pub fn is_pointer(self) -> bool {
        matches!(self, Repr::Pointer | Repr::ErasedPointer)
    }
}

impl Type {
    pub fn class(class: ClassId) -> Self {
        Type::Class(ClassType::new(class, Vec::new()))
    }

    pub fn generic(class: ClassId, args: Vec<Type>) -> Self {
        Type::Class(ClassType::new(class, args))
    }

    /// The nullable version of a class type. Other types are returned as is.
    pub fn nullable(self) -> Self {
        match self {
            Type::Class(mut ct) => {
                ct.nullable = true;
                Type::Class(ct)
            }
            other => other,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Type::Class(_) | Type::Null | Type::Variable(_))
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Type::Nothing)
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Type::Null | Type::Variable(_) => true,
            Type::Class(ct) => ct.nullable,
            _ => false,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            Type::Class(ct) => Some(ct),
            _ => None,
        }
    }

    /// Layout representation, or `None` for the bottom type.
    pub fn repr(&self) -> Option<Repr> {
        match self {
            Type::Unit | Type::Boolean | Type::I8 => Some(Repr::Bits8),
            Type::I16 => Some(Repr::Bits16),
            Type::I32 | Type::F32 => Some(Repr::Bits32),
            Type::I64 | Type::F64 => Some(Repr::Bits64),
            Type::Class(_) | Type::Null => Some(Repr::Pointer),
            Type::Variable(_) => Some(Repr::ErasedPointer),
            Type::Nothing => None,
        }
    }

    /// Replace each of `params` with the argument at the same position.
    pub fn substitute(&self, params: &[TypeParamId], args: &[Type]) -> Type {
        match self {
            Type::Variable(id) => params
                .iter()
                .position(|p| p == id)
                .and_then(|i| args.get(i))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Type::Class(ct) => Type::Class(ClassType {
                class: ct.class,
                args: ct.args.iter().map(|a| a.substitute(params, args)).collect(),
                nullable: ct.nullable,
            }),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "unit"),
            Type::Boolean => write!(f, "boolean"),
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Nothing => write!(f, "nothing"),
            Type::Null => write!(f, "null"),
            Type::Variable(id) => write!(f, "{}", id),
            Type::Class(ct) => {
                write!(f, "{}", ct.class)?;
                if !ct.args.is_empty() {
                    let args: Vec<String> = ct.args.iter().map(|a| a.to_string()).collect();
                    write!(f, "[{}]", args.join(", "))?;
                }
                if ct.nullable {
                    write!(f, "?")?;
                }
                Ok(())
            }
        }
    }
}
