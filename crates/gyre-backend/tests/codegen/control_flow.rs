//! Conditionals, loops, short-circuit operators and early exits

use super::harness::*;

#[test]
fn test_and_short_circuits() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::Boolean);
    program.set_body(f, Expr::and(Expr::boolean(true), Expr::boolean(false)));
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![
            vec![Inst::True, Inst::Dup, Inst::BranchIf(b(1), b(2))],
            vec![Inst::Drop, Inst::False, Inst::Branch(b(2))],
            vec![Inst::Ret],
        ]
    );
}

// ============================================================================
// Conditionals
// ============================================================================

#[test]
fn test_if_else_for_value() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::I64);
    program.set_body(
        f,
        Expr::if_else(Expr::boolean(true), Expr::i64(12), Expr::i64(34)),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![
            vec![Inst::True, Inst::BranchIf(b(1), b(2))],
            vec![Inst::I64(12), Inst::Branch(b(3))],
            vec![Inst::I64(34), Inst::Branch(b(3))],
            vec![Inst::Ret],
        ]
    );
}

#[test]
fn test_if_else_for_effect() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::Unit);
    program.set_body(
        f,
        Expr::block(vec![
            Stmt::Expr(Expr::if_else(
                Expr::boolean(true),
                Expr::i64(12),
                Expr::i64(34),
            )),
            Stmt::Expr(Expr::unit()),
        ]),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![
            vec![Inst::True, Inst::BranchIf(b(1), b(2))],
            vec![Inst::I64(12), Inst::Drop, Inst::Branch(b(3))],
            vec![Inst::I64(34), Inst::Drop, Inst::Branch(b(3))],
            vec![Inst::Unit, Inst::Ret],
        ]
    );
}

#[test]
fn test_nested_if_numbers_blocks_depth_first() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::I64);
    let c1 = program.add_param(f, "c1", Type::Boolean, false);
    let c2 = program.add_param(f, "c2", Type::Boolean, false);
    let c3 = program.add_param(f, "c3", Type::Boolean, false);
    program.set_body(
        f,
        Expr::if_else(
            program.load(c1),
            Expr::if_else(program.load(c2), Expr::i64(1), Expr::i64(2)),
            Expr::if_else(program.load(c3), Expr::i64(3), Expr::i64(4)),
        ),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![
            vec![Inst::LdLocal(0), Inst::BranchIf(b(1), b(5))],
            vec![Inst::LdLocal(1), Inst::BranchIf(b(2), b(3))],
            vec![Inst::I64(1), Inst::Branch(b(4))],
            vec![Inst::I64(2), Inst::Branch(b(4))],
            vec![Inst::Branch(b(9))],
            vec![Inst::LdLocal(2), Inst::BranchIf(b(6), b(7))],
            vec![Inst::I64(3), Inst::Branch(b(8))],
            vec![Inst::I64(4), Inst::Branch(b(8))],
            vec![Inst::Branch(b(9))],
            vec![Inst::Ret],
        ]
    );
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn test_while_for_value() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::Unit);
    program.set_body(f, Expr::while_loop(Expr::boolean(true), Expr::i64(12)));
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![
            vec![Inst::Branch(b(1))],
            vec![Inst::True, Inst::BranchIf(b(2), b(3))],
            vec![Inst::I64(12), Inst::Drop, Inst::Branch(b(1))],
            vec![Inst::Unit, Inst::Ret],
        ]
    );
}

/// def f(var n: i64): i64 = { var p = 1; while (n > 1) { p = p * n; n = n - 1; }; p; }
#[test]
fn test_factorial() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::I64);
    let n = program.add_param(f, "n", Type::I64, true);
    let p = program.add_local(f, "p", Type::I64, true);
    program.set_body(
        f,
        Expr::block(vec![
            Stmt::var(p, Expr::i64(1)),
            Stmt::Expr(Expr::while_loop(
                Expr::binary(BinaryOp::Gt, program.load(n), Expr::i64(1)),
                Expr::block(vec![
                    Stmt::Expr(Expr::assign(
                        program.load(p),
                        Expr::binary(BinaryOp::Mul, program.load(p), program.load(n)),
                    )),
                    Stmt::Expr(Expr::assign(
                        program.load(n),
                        Expr::binary(BinaryOp::Sub, program.load(n), Expr::i64(1)),
                    )),
                ]),
            )),
            Stmt::Expr(program.load(p)),
        ]),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![
            vec![Inst::I64(1), Inst::StLocal(-1), Inst::Branch(b(1))],
            vec![
                Inst::LdLocal(0),
                Inst::I64(1),
                Inst::Int(IntOp::Gt, IntWidth::I64),
                Inst::BranchIf(b(2), b(3)),
            ],
            vec![
                Inst::LdLocal(-1),
                Inst::LdLocal(0),
                Inst::Int(IntOp::Mul, IntWidth::I64),
                Inst::StLocal(-1),
                Inst::LdLocal(0),
                Inst::I64(1),
                Inst::Int(IntOp::Sub, IntWidth::I64),
                Inst::StLocal(0),
                Inst::Branch(b(1)),
            ],
            vec![Inst::LdLocal(-1), Inst::Ret],
        ]
    );
}

#[test]
fn test_return_inside_loop() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::I64);
    program.set_body(
        f,
        Expr::block(vec![
            Stmt::Expr(Expr::while_loop(
                Expr::boolean(true),
                Expr::block(vec![Stmt::Expr(Expr::ret(Some(Expr::i64(5))))]),
            )),
            Stmt::Expr(Expr::i64(0)),
        ]),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![
            vec![Inst::Branch(b(1))],
            vec![Inst::True, Inst::BranchIf(b(2), b(3))],
            vec![Inst::I64(5), Inst::Ret],
            vec![Inst::I64(0), Inst::Ret],
        ]
    );
}

// ============================================================================
// Dead code
// ============================================================================

#[test]
fn test_throw_in_condition_leaves_no_arms() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::I64);
    program.set_body(
        f,
        Expr::if_else(Expr::throw(Expr::null()), Expr::i64(1), Expr::i64(2)),
    );
    let program = compile(program);
    assert_eq!(blocks(&program, f), vec![vec![Inst::Null, Inst::Throw]]);
}

#[test]
fn test_code_after_return_is_dropped() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::I64);
    let x = program.add_local(f, "x", Type::class(STRING_CLASS), false);
    program.set_body(
        f,
        Expr::block(vec![
            Stmt::Expr(Expr::ret(Some(Expr::i64(1)))),
            Stmt::var(x, Expr::string("dead")),
            Stmt::Expr(Expr::i64(2)),
        ]),
    );
    let program = compile(program);
    assert_eq!(blocks(&program, f), vec![vec![Inst::I64(1), Inst::Ret]]);

    // The local keeps its slot; the string never reaches the pool.
    let lowered = program.function(f).lowered.as_ref().unwrap();
    assert_eq!(lowered.locals.len(), 1);
    assert!(program.strings.is_empty());
}
