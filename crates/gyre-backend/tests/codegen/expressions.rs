//! Literals, variables, fields, operators and calls

use super::harness::*;

// ============================================================================
// Literals and blocks
// ============================================================================

#[test]
fn test_empty_global_init() {
    let program = compile(Program::new());
    assert_eq!(blocks_of(&program, "$init"), vec![vec![Inst::Unit, Inst::Ret]]);
}

#[test]
fn test_global_init_stores_globals() {
    let mut program = Program::new();
    program.add_global("x", Type::I64, false, Some(Expr::i64(42)));
    let program = compile(program);
    assert_eq!(
        blocks_of(&program, "$init"),
        vec![vec![Inst::I64(42), Inst::StG(0), Inst::Unit, Inst::Ret]]
    );
}

#[test]
fn test_block_drops_all_but_last() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::I64);
    program.set_body(
        f,
        Expr::block(vec![Stmt::Expr(Expr::i64(12)), Stmt::Expr(Expr::i64(34))]),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![Inst::I64(12), Inst::Drop, Inst::I64(34), Inst::Ret]]
    );
}

#[test]
fn test_trailing_var_yields_unit() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::Unit);
    let x = program.add_local(f, "x", Type::I64, false);
    program.set_body(f, Expr::block(vec![Stmt::var(x, Expr::i64(12))]));
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![Inst::I64(12), Inst::StLocal(-1), Inst::Unit, Inst::Ret]]
    );
}

#[test]
fn test_negation() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::I64);
    program.set_body(f, Expr::unary(UnaryOp::Neg, Expr::i64(12)));
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::I64(12),
            Inst::Int(IntOp::Neg, IntWidth::I64),
            Inst::Ret
        ]]
    );
}

// ============================================================================
// Variables and casts
// ============================================================================

#[test]
fn test_var_upcast() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::Unit);
    let x = program.add_local(f, "x", Type::class(OBJECT_CLASS), false);
    program.set_body(f, Expr::block(vec![Stmt::var(x, Expr::string("foo"))]));
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::String(0),
            Inst::Tyc(OBJECT_CLASS),
            Inst::Cast,
            Inst::StLocal(-1),
            Inst::Unit,
            Inst::Ret,
        ]]
    );
    assert_eq!(program.strings, vec!["foo".to_string()]);
}

#[test]
fn test_generic_return_cast() {
    let mut program = Program::new();
    let foo = program.add_class("Foo");
    program.add_class_type_param(foo, "T");
    let f = program.add_function("f", Type::generic(foo, vec![Type::class(OBJECT_CLASS)]));
    let p = program.add_param(
        f,
        "p",
        Type::generic(foo, vec![Type::class(STRING_CLASS)]),
        false,
    );
    program.set_body(f, program.load(p));
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::LdLocal(0),
            Inst::Tyc(OBJECT_CLASS),
            Inst::Tyc(foo),
            Inst::Cast,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_accumulate_local_for_value() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::I64);
    let x = program.add_local(f, "x", Type::I64, true);
    program.set_body(
        f,
        Expr::block(vec![
            Stmt::var(x, Expr::i64(12)),
            Stmt::Expr(Expr::compound_assign(
                BinaryOp::Add,
                program.load(x),
                Expr::i64(34),
            )),
        ]),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::I64(12),
            Inst::StLocal(-1),
            Inst::LdLocal(-1),
            Inst::I64(34),
            add_i64(),
            Inst::Dup,
            Inst::StLocal(-1),
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_global_read_and_write() {
    let mut program = Program::new();
    let g = program.add_global("g", Type::I64, true, None);
    let f = program.add_function("f", Type::Unit);
    program.set_body(
        f,
        Expr::block(vec![
            Stmt::Expr(Expr::assign(
                program.load(g),
                Expr::binary(BinaryOp::Mul, program.load(g), Expr::i64(2)),
            )),
            Stmt::Expr(Expr::unit()),
        ]),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::LdG(0),
            Inst::I64(2),
            Inst::Int(IntOp::Mul, IntWidth::I64),
            Inst::StG(0),
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

// ============================================================================
// Fields
// ============================================================================

mod fields {
    use super::*;

    /// class Foo { var b: boolean; var n: i64; var s: String; var t: String? }
    fn foo() -> (Program, ClassId, [DefnId; 4]) {
        let mut program = Program::new();
        let foo = program.add_class("Foo");
        let b = program.add_field(foo, "b", Type::Boolean, true, None);
        let n = program.add_field(foo, "n", Type::I64, true, None);
        let s = program.add_field(foo, "s", Type::class(STRING_CLASS), true, None);
        let t = program.add_field(foo, "t", Type::class(STRING_CLASS).nullable(), true, None);
        (program, foo, [b, n, s, t])
    }

    #[test]
    fn test_store_for_effect() {
        let (mut program, foo, [b, ..]) = foo();
        let f = program.add_function("f", Type::Unit);
        let p = program.add_param(f, "foo", Type::class(foo), false);
        program.set_body(
            f,
            Expr::block(vec![
                Stmt::Expr(Expr::assign(
                    Expr::field(program.load(p), b, Type::Boolean),
                    Expr::boolean(false),
                )),
                Stmt::Expr(Expr::unit()),
            ]),
        );
        let program = compile(program);
        assert_eq!(
            blocks(&program, f),
            vec![vec![
                Inst::LdLocal(0),
                Inst::False,
                Inst::Swap,
                Inst::St8(0),
                Inst::Unit,
                Inst::Ret,
            ]]
        );
    }

    #[test]
    fn test_store_for_value() {
        let (mut program, foo, [_, n, ..]) = foo();
        let f = program.add_function("f", Type::I64);
        let p = program.add_param(f, "foo", Type::class(foo), false);
        program.set_body(
            f,
            Expr::assign(Expr::field(program.load(p), n, Type::I64), Expr::i64(12)),
        );
        let program = compile(program);
        assert_eq!(
            blocks(&program, f),
            vec![vec![
                Inst::LdLocal(0),
                Inst::I64(12),
                Inst::Dup,
                Inst::Swap2,
                Inst::St64(1),
                Inst::Ret,
            ]]
        );
    }

    #[test]
    fn test_accumulate_for_effect() {
        let (mut program, foo, [_, n, ..]) = foo();
        let f = program.add_function("f", Type::Unit);
        let p = program.add_param(f, "foo", Type::class(foo), false);
        program.set_body(
            f,
            Expr::block(vec![
                Stmt::Expr(Expr::compound_assign(
                    BinaryOp::Add,
                    Expr::field(program.load(p), n, Type::I64),
                    Expr::i64(12),
                )),
                Stmt::Expr(Expr::unit()),
            ]),
        );
        let program = compile(program);
        assert_eq!(
            blocks(&program, f),
            vec![vec![
                Inst::LdLocal(0),
                Inst::Dup,
                Inst::Ld64(1),
                Inst::I64(12),
                add_i64(),
                Inst::Swap,
                Inst::St64(1),
                Inst::Unit,
                Inst::Ret,
            ]]
        );
    }

    #[test]
    fn test_accumulate_for_value() {
        let (mut program, foo, [_, n, ..]) = foo();
        let f = program.add_function("f", Type::I64);
        let p = program.add_param(f, "foo", Type::class(foo), false);
        program.set_body(
            f,
            Expr::compound_assign(
                BinaryOp::Add,
                Expr::field(program.load(p), n, Type::I64),
                Expr::i64(12),
            ),
        );
        let program = compile(program);
        assert_eq!(
            blocks(&program, f),
            vec![vec![
                Inst::LdLocal(0),
                Inst::Dup,
                Inst::Ld64(1),
                Inst::I64(12),
                add_i64(),
                Inst::Dup,
                Inst::Swap2,
                Inst::St64(1),
                Inst::Ret,
            ]]
        );
    }

    #[test]
    fn test_pointer_loads_check_non_nullable_fields() {
        let (mut program, foo, [_, _, s, t]) = foo();
        let f = program.add_function("f", Type::class(STRING_CLASS));
        let p = program.add_param(f, "foo", Type::class(foo), false);
        program.set_body(f, Expr::field(program.load(p), s, Type::class(STRING_CLASS)));
        let g = program.add_function("g", Type::class(STRING_CLASS).nullable());
        let q = program.add_param(g, "foo", Type::class(foo), false);
        program.set_body(
            g,
            Expr::field(program.load(q), t, Type::class(STRING_CLASS).nullable()),
        );
        let program = compile(program);
        assert_eq!(
            blocks(&program, f),
            vec![vec![Inst::LdLocal(0), Inst::Ldpc(2), Inst::Ret]]
        );
        assert_eq!(
            blocks(&program, g),
            vec![vec![Inst::LdLocal(0), Inst::Ldp(3), Inst::Ret]]
        );
    }
}

// ============================================================================
// Operators and conversions
// ============================================================================

mod operators {
    use super::*;

    fn unary_function(
        param: Type,
        result: Type,
        body: impl FnOnce(Expr) -> Expr,
    ) -> Vec<Vec<Inst>> {
        let mut program = Program::new();
        let f = program.add_function("f", result);
        let x = program.add_param(f, "x", param, false);
        let value = body(program.load(x));
        program.set_body(f, value);
        let program = compile(program);
        blocks(&program, f)
    }

    #[test]
    fn test_object_identity() {
        let code = unary_function(Type::class(OBJECT_CLASS), Type::Boolean, |x| {
            Expr::binary(BinaryOp::Eq, x, Expr::null())
        });
        assert_eq!(
            code,
            vec![vec![Inst::LdLocal(0), Inst::Null, Inst::Eqp, Inst::Ret]]
        );
    }

    #[test]
    fn test_widening_sign_extends() {
        let code = unary_function(Type::I8, Type::I16, |x| Expr::convert(x, Type::I16));
        assert_eq!(
            code,
            vec![vec![
                Inst::LdLocal(0),
                Inst::Convert(Conversion::Sext {
                    to: IntWidth::I16,
                    from: IntWidth::I8
                }),
                Inst::Ret,
            ]]
        );
    }

    #[test]
    fn test_int_to_narrow_float() {
        let code = unary_function(Type::I64, Type::F32, |x| Expr::convert(x, Type::F32));
        assert_eq!(
            code,
            vec![vec![
                Inst::LdLocal(0),
                Inst::Convert(Conversion::Trunc(IntWidth::I32)),
                Inst::Convert(Conversion::IntToFloat(FloatWidth::F32)),
                Inst::Ret,
            ]]
        );
    }

    #[test]
    fn test_float_widening() {
        let code = unary_function(Type::F32, Type::F64, |x| Expr::convert(x, Type::F64));
        assert_eq!(
            code,
            vec![vec![
                Inst::LdLocal(0),
                Inst::Convert(Conversion::ExtF64),
                Inst::Ret
            ]]
        );
    }

    #[test]
    fn test_float_comparison() {
        let code = unary_function(Type::F64, Type::Boolean, |x| {
            Expr::binary(BinaryOp::Lt, x, Expr::f64(1.5))
        });
        assert_eq!(
            code,
            vec![vec![
                Inst::LdLocal(0),
                Inst::F64(1.5),
                Inst::Float(FloatOp::Lt, FloatWidth::F64),
                Inst::Ret,
            ]]
        );
    }

    #[test]
    fn test_boolean_not() {
        let code = unary_function(Type::Boolean, Type::Boolean, |x| {
            Expr::unary(UnaryOp::Not, x)
        });
        assert_eq!(code, vec![vec![Inst::LdLocal(0), Inst::NotB, Inst::Ret]]);
    }
}

// ============================================================================
// Builtin calls
// ============================================================================

#[test]
fn test_concat_strings() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::class(STRING_CLASS));
    program.set_body(
        f,
        Expr::method_call(
            Expr::string("foo"),
            STRING_CONCAT_METHOD,
            vec![],
            vec![Expr::string("bar")],
            Type::class(STRING_CLASS),
        ),
    );
    let program = compile(program);
    let slot = method_slot(&program, STRING_CLASS, STRING_CONCAT_METHOD);
    assert_eq!(slot, 2);
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::String(0),
            Inst::String(1),
            Inst::CallV { argc: 2, slot },
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_compare_strings() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::Boolean);
    let s = program.add_param(f, "s", Type::class(STRING_CLASS), false);
    program.set_body(
        f,
        Expr::method_call(
            program.load(s),
            STRING_EQ_METHOD,
            vec![],
            vec![Expr::string("x")],
            Type::Boolean,
        ),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::LdLocal(0),
            Inst::String(0),
            Inst::CallV { argc: 2, slot: 3 },
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_call_builtin_function() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::Unit);
    program.set_body(
        f,
        Expr::call(PRINT_FUNCTION, vec![], vec![Expr::string("hi")], Type::Unit),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![Inst::String(0), Inst::CallG(PRINT_FUNCTION), Inst::Ret]]
    );
}

#[test]
fn test_call_with_arguments() {
    let mut program = Program::new();
    let add = program.add_function("add", Type::I64);
    let a = program.add_param(add, "a", Type::I64, false);
    let bb = program.add_param(add, "b", Type::I64, false);
    program.set_body(
        add,
        Expr::binary(BinaryOp::Add, program.load(a), program.load(bb)),
    );
    let f = program.add_function("f", Type::I64);
    program.set_body(
        f,
        Expr::call(add, vec![], vec![Expr::i64(1), Expr::i64(2)], Type::I64),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, add),
        vec![vec![Inst::LdLocal(0), Inst::LdLocal(1), add_i64(), Inst::Ret]]
    );
    assert_eq!(
        blocks(&program, f),
        vec![vec![Inst::I64(1), Inst::I64(2), Inst::CallG(add), Inst::Ret]]
    );
}
