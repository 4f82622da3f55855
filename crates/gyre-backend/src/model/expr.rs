//! Typed expression tree
//!
//! Every node carries its resolved type and every identifier use carries its
//! resolved definition.

use super::{ClassId, DefnId, FunctionId, Type};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Unit,
    Boolean(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Null,
}

/// Binary operators on primitive operands
///
/// `Eq` and `Ne` on object operands compare identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    LShr,
    AShr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    BitNot,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    /// The "not yet assigned" marker stored into pointer fields by initializers.
    Uninitialized,
    /// The receiver of the enclosing method.
    This,
    /// Use of a parameter, local or global; a field here means the implicit receiver.
    Variable(DefnId),
    Field {
        receiver: Box<Expr>,
        field: DefnId,
    },
    /// `target = value` where the target is a `Variable` or `Field`.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `target op= value`.
    CompoundAssign {
        op: BinaryOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// Field store that evaluates the value before the receiver.
    InitField {
        receiver: Box<Expr>,
        field: DefnId,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Numeric conversion to this node's type.
    Convert(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Block(Vec<Stmt>),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    Call {
        callee: Callee,
        type_args: Vec<Type>,
        args: Vec<Expr>,
    },
    /// Allocation plus constructor call; type arguments come from the node type.
    New {
        class: ClassId,
        constructor: FunctionId,
        args: Vec<Expr>,
    },
    /// A nested function used as a first-class value.
    FunctionValue(FunctionId),
    Throw(Box<Expr>),
    Return(Option<Box<Expr>>),
    Try {
        body: Box<Expr>,
        catches: Vec<CatchClause>,
        finally: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    Function(FunctionId),
    Method {
        receiver: Box<Expr>,
        method: FunctionId,
    },
    /// A method of the enclosing class called through the implicit receiver.
    ImplicitMethod(FunctionId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),
    Var { defn: DefnId, init: Option<Expr> },
    Function(FunctionId),
}

/// `case binding: Guard => body`
///
/// A clause without a guard matches any exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub binding: Option<DefnId>,
    pub guard: Option<ClassId>,
    pub body: Expr,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    pub fn literal(literal: Literal) -> Self {
        let ty = match &literal {
            Literal::Unit => Type::Unit,
            Literal::Boolean(_) => Type::Boolean,
            Literal::I8(_) => Type::I8,
            Literal::I16(_) => Type::I16,
            Literal::I32(_) => Type::I32,
            Literal::I64(_) => Type::I64,
            Literal::F32(_) => Type::F32,
            Literal::F64(_) => Type::F64,
            Literal::String(_) => Type::class(super::STRING_CLASS),
            Literal::Null => Type::Null,
        };
        Self::new(ExprKind::Literal(literal), ty)
    }

    pub fn unit() -> Self {
        Self::literal(Literal::Unit)
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(Literal::Boolean(value))
    }

    pub fn i32(value: i32) -> Self {
        Self::literal(Literal::I32(value))
    }

    pub fn i64(value: i64) -> Self {
        Self::literal(Literal::I64(value))
    }

    pub fn f64(value: f64) -> Self {
        Self::literal(Literal::F64(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(Literal::String(value.into()))
    }

    pub fn null() -> Self {
        Self::literal(Literal::Null)
    }

    pub fn this(ty: Type) -> Self {
        Self::new(ExprKind::This, ty)
    }

    pub fn variable(defn: DefnId, ty: Type) -> Self {
        Self::new(ExprKind::Variable(defn), ty)
    }

    pub fn field(receiver: Expr, field: DefnId, ty: Type) -> Self {
        Self::new(
            ExprKind::Field {
                receiver: Box::new(receiver),
                field,
            },
            ty,
        )
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        let ty = target.ty.clone();
        Self::new(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn compound_assign(op: BinaryOp, target: Expr, value: Expr) -> Self {
        let ty = target.ty.clone();
        Self::new(
            ExprKind::CompoundAssign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn init_field(receiver: Expr, field: DefnId, value: Expr) -> Self {
        Self::new(
            ExprKind::InitField {
                receiver: Box::new(receiver),
                field,
                value: Box::new(value),
            },
            Type::Unit,
        )
    }

    /// Binary operation; comparisons produce booleans, everything else the left type.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let ty = if op.is_comparison() {
            Type::Boolean
        } else {
            left.ty.clone()
        };
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let ty = operand.ty.clone();
        Self::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn convert(operand: Expr, ty: Type) -> Self {
        Self::new(ExprKind::Convert(Box::new(operand)), ty)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::And(Box::new(left), Box::new(right)), Type::Boolean)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Or(Box::new(left), Box::new(right)), Type::Boolean)
    }

    /// Block whose value is its trailing expression statement, or unit.
    pub fn block(stmts: Vec<Stmt>) -> Self {
        let diverges = stmts.iter().any(|s| match s {
            Stmt::Expr(e) => e.ty.is_nothing(),
            Stmt::Var { init: Some(e), .. } => e.ty.is_nothing(),
            _ => false,
        });
        let ty = if diverges {
            Type::Nothing
        } else {
            match stmts.last() {
                Some(Stmt::Expr(e)) => e.ty.clone(),
                _ => Type::Unit,
            }
        };
        Self::new(ExprKind::Block(stmts), ty)
    }

    pub fn if_then(cond: Expr, then_branch: Expr) -> Self {
        Self::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: None,
            },
            Type::Unit,
        )
    }

    pub fn if_else(cond: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        let ty = if then_branch.ty.is_nothing() {
            else_branch.ty.clone()
        } else {
            then_branch.ty.clone()
        };
        Self::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Some(Box::new(else_branch)),
            },
            ty,
        )
    }

    pub fn while_loop(cond: Expr, body: Expr) -> Self {
        Self::new(
            ExprKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            Type::Unit,
        )
    }

    pub fn call(function: FunctionId, type_args: Vec<Type>, args: Vec<Expr>, ty: Type) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Callee::Function(function),
                type_args,
                args,
            },
            ty,
        )
    }

    pub fn method_call(
        receiver: Expr,
        method: FunctionId,
        type_args: Vec<Type>,
        args: Vec<Expr>,
        ty: Type,
    ) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Callee::Method {
                    receiver: Box::new(receiver),
                    method,
                },
                type_args,
                args,
            },
            ty,
        )
    }

    pub fn implicit_call(
        method: FunctionId,
        type_args: Vec<Type>,
        args: Vec<Expr>,
        ty: Type,
    ) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Callee::ImplicitMethod(method),
                type_args,
                args,
            },
            ty,
        )
    }

    /// `new C[args](...)`; `ty` must be a class type of `class`.
    pub fn new_object(ty: Type, constructor: FunctionId, args: Vec<Expr>) -> Self {
        let class = ty.as_class().map(|ct| ct.class).unwrap_or(super::OBJECT_CLASS);
        Self::new(
            ExprKind::New {
                class,
                constructor,
                args,
            },
            ty,
        )
    }

    pub fn function_value(function: FunctionId) -> Self {
        Self::new(
            ExprKind::FunctionValue(function),
            Type::class(super::OBJECT_CLASS),
        )
    }

    pub fn throw(value: Expr) -> Self {
        Self::new(ExprKind::Throw(Box::new(value)), Type::Nothing)
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(ExprKind::Return(value.map(Box::new)), Type::Nothing)
    }

    pub fn try_catch(body: Expr, catches: Vec<CatchClause>, finally: Option<Expr>) -> Self {
        let ty = std::iter::once(&body.ty)
            .chain(catches.iter().map(|c| &c.body.ty))
            .find(|ty| !ty.is_nothing())
            .cloned()
            .unwrap_or(Type::Nothing);
        Self::new(
            ExprKind::Try {
                body: Box::new(body),
                catches,
                finally: finally.map(Box::new),
            },
            ty,
        )
    }
}

impl Stmt {
    pub fn var(defn: DefnId, init: Expr) -> Self {
        Stmt::Var {
            defn,
            init: Some(init),
        }
    }
}
