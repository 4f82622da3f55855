//! Expression tree traversal
//!
//! Implementors override the hooks they care about and call the matching
//! `walk_*` function to continue into children.

use super::{Callee, Expr, ExprKind, Stmt};

pub trait Visitor {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }
}

pub trait VisitorMut {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Expr(expr) => visitor.visit_expr(expr),
        Stmt::Var { init, .. } => {
            if let Some(init) = init {
                visitor.visit_expr(init);
            }
        }
        Stmt::Function(_) => {}
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Literal(_)
        | ExprKind::Uninitialized
        | ExprKind::This
        | ExprKind::Variable(_)
        | ExprKind::FunctionValue(_) => {}
        ExprKind::Field { receiver, .. } => visitor.visit_expr(receiver),
        ExprKind::Assign { target, value } | ExprKind::CompoundAssign { target, value, .. } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        }
        ExprKind::InitField {
            receiver, value, ..
        } => {
            visitor.visit_expr(value);
            visitor.visit_expr(receiver);
        }
        ExprKind::Binary { left, right, .. }
        | ExprKind::And(left, right)
        | ExprKind::Or(left, right) => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        ExprKind::Unary { operand, .. } | ExprKind::Convert(operand) | ExprKind::Throw(operand) => {
            visitor.visit_expr(operand)
        }
        ExprKind::Block(stmts) => {
            for stmt in stmts {
                visitor.visit_stmt(stmt);
            }
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(cond);
            visitor.visit_expr(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_expr(else_branch);
            }
        }
        ExprKind::While { cond, body } => {
            visitor.visit_expr(cond);
            visitor.visit_expr(body);
        }
        ExprKind::Call { callee, args, .. } => {
            if let Callee::Method { receiver, .. } = callee {
                visitor.visit_expr(receiver);
            }
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::New { args, .. } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        ExprKind::Try {
            body,
            catches,
            finally,
        } => {
            visitor.visit_expr(body);
            for clause in catches {
                visitor.visit_expr(&clause.body);
            }
            if let Some(finally) = finally {
                visitor.visit_expr(finally);
            }
        }
    }
}

pub fn walk_stmt_mut<V: VisitorMut + ?Sized>(visitor: &mut V, stmt: &mut Stmt) {
    match stmt {
        Stmt::Expr(expr) => visitor.visit_expr_mut(expr),
        Stmt::Var { init, .. } => {
            if let Some(init) = init {
                visitor.visit_expr_mut(init);
            }
        }
        Stmt::Function(_) => {}
    }
}

pub fn walk_expr_mut<V: VisitorMut + ?Sized>(visitor: &mut V, expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Literal(_)
        | ExprKind::Uninitialized
        | ExprKind::This
        | ExprKind::Variable(_)
        | ExprKind::FunctionValue(_) => {}
        ExprKind::Field { receiver, .. } => visitor.visit_expr_mut(receiver),
        ExprKind::Assign { target, value } | ExprKind::CompoundAssign { target, value, .. } => {
            visitor.visit_expr_mut(target);
            visitor.visit_expr_mut(value);
        }
        ExprKind::InitField {
            receiver, value, ..
        } => {
            visitor.visit_expr_mut(value);
            visitor.visit_expr_mut(receiver);
        }
        ExprKind::Binary { left, right, .. }
        | ExprKind::And(left, right)
        | ExprKind::Or(left, right) => {
            visitor.visit_expr_mut(left);
            visitor.visit_expr_mut(right);
        }
        ExprKind::Unary { operand, .. } | ExprKind::Convert(operand) | ExprKind::Throw(operand) => {
            visitor.visit_expr_mut(operand)
        }
        ExprKind::Block(stmts) => {
            for stmt in stmts {
                visitor.visit_stmt_mut(stmt);
            }
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr_mut(cond);
            visitor.visit_expr_mut(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_expr_mut(else_branch);
            }
        }
        ExprKind::While { cond, body } => {
            visitor.visit_expr_mut(cond);
            visitor.visit_expr_mut(body);
        }
        ExprKind::Call { callee, args, .. } => {
            if let Callee::Method { receiver, .. } = callee {
                visitor.visit_expr_mut(receiver);
            }
            for arg in args {
                visitor.visit_expr_mut(arg);
            }
        }
        ExprKind::New { args, .. } => {
            for arg in args {
                visitor.visit_expr_mut(arg);
            }
        }
        ExprKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr_mut(value);
            }
        }
        ExprKind::Try {
            body,
            catches,
            finally,
        } => {
            visitor.visit_expr_mut(body);
            for clause in catches {
                visitor.visit_expr_mut(&mut clause.body);
            }
            if let Some(finally) = finally {
                visitor.visit_expr_mut(finally);
            }
        }
    }
}
