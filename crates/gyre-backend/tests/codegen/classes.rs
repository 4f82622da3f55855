//! Constructors, initializers, allocation and dispatch

use super::harness::*;

fn constructor(program: &Program, class: ClassId) -> FunctionId {
    program.class(class).constructors[0]
}

// ============================================================================
// Initializers and constructors
// ============================================================================

#[test]
fn test_initializer_stores_field_defaults() {
    let mut program = Program::new();
    let foo = program.add_class("Foo");
    program.add_field(
        foo,
        "me",
        Type::class(foo),
        true,
        Some(Expr::this(Type::class(foo))),
    );
    program.add_field(foo, "name", Type::class(STRING_CLASS), true, None);
    program.add_field(foo, "count", Type::I64, true, None);
    let program = compile(program);

    assert_eq!(
        blocks(&program, initializer(&program, foo)),
        vec![vec![
            Inst::LdLocal(0),
            Inst::LdLocal(0),
            Inst::Stp(0),
            Inst::Uninitialized,
            Inst::LdLocal(0),
            Inst::Stp(1),
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_default_constructor() {
    let mut program = Program::new();
    let foo = program.add_class("Foo");
    let program = compile(program);

    assert_eq!(
        blocks(&program, constructor(&program, foo)),
        vec![vec![
            Inst::LdLocal(0),
            Inst::CallG(OBJECT_CONSTRUCTOR),
            Inst::Drop,
            Inst::LdLocal(0),
            Inst::CallG(initializer(&program, foo)),
            Inst::Drop,
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_field_parameter_is_stored_before_initializer() {
    let mut program = Program::new();
    let foo = program.add_class("Foo");
    let x = program.add_field(foo, "x", Type::I32, false, None);
    let ctor = program.add_constructor(foo);
    let p = program.add_param(ctor, "x", Type::I32, false);
    program.set_chain(
        ctor,
        ConstructorChain {
            call: ChainCall::Default,
            field_params: vec![(p, x)],
        },
    );
    program.set_body(ctor, Expr::block(vec![]));
    let program = compile(program);

    assert_eq!(
        blocks(&program, ctor),
        vec![vec![
            Inst::LdLocal(0),
            Inst::CallG(OBJECT_CONSTRUCTOR),
            Inst::Drop,
            Inst::LdLocal(1),
            Inst::LdLocal(0),
            Inst::St32(0),
            Inst::LdLocal(0),
            Inst::CallG(initializer(&program, foo)),
            Inst::Drop,
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_super_constructor_with_arguments() {
    let mut program = Program::new();
    let a = program.add_class("A");
    let a_ctor = program.add_constructor(a);
    program.add_param(a_ctor, "n", Type::I64, false);
    program.set_body(a_ctor, Expr::block(vec![]));

    let bclass = program.add_subclass("B", ClassType::new(a, vec![]));
    let b_ctor = program.add_constructor(bclass);
    program.set_chain(
        b_ctor,
        ConstructorChain {
            call: ChainCall::Super {
                constructor: a_ctor,
                args: vec![Expr::i64(12)],
            },
            field_params: vec![],
        },
    );
    program.set_body(b_ctor, Expr::block(vec![]));
    let program = compile(program);

    assert_eq!(
        blocks(&program, b_ctor),
        vec![vec![
            Inst::LdLocal(0),
            Inst::I64(12),
            Inst::CallG(a_ctor),
            Inst::Drop,
            Inst::LdLocal(0),
            Inst::CallG(initializer(&program, bclass)),
            Inst::Drop,
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_sibling_constructor_skips_initializer() {
    let mut program = Program::new();
    let a = program.add_class("A");
    let primary = program.add_constructor(a);
    program.add_param(primary, "n", Type::I64, false);
    program.set_body(primary, Expr::block(vec![]));
    let secondary = program.add_constructor(a);
    program.set_chain(
        secondary,
        ConstructorChain {
            call: ChainCall::This {
                constructor: primary,
                args: vec![Expr::i64(12)],
            },
            field_params: vec![],
        },
    );
    program.set_body(secondary, Expr::block(vec![]));
    let program = compile(program);

    assert_eq!(
        blocks(&program, secondary),
        vec![vec![
            Inst::LdLocal(0),
            Inst::I64(12),
            Inst::CallG(primary),
            Inst::Drop,
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_missing_default_constructor() {
    let mut program = Program::new();
    let a = program.add_class("A");
    let ctor = program.add_constructor(a);
    program.add_param(ctor, "n", Type::I64, false);
    program.set_body(ctor, Expr::block(vec![]));
    program.add_subclass("B", ClassType::new(a, vec![]));

    let err = compile_err(program);
    assert!(
        matches!(&err, CompileError::MissingDefaultConstructor { class } if class == "A"),
        "unexpected error: {}",
        err
    );
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn test_new_for_value_and_effect() {
    let mut program = Program::new();
    let foo = program.add_class("Foo");
    let f = program.add_function("f", Type::class(foo));
    let g = program.add_function("g", Type::Unit);
    // Constructors are synthesized by the first pass; declare one up front.
    let ctor = program.add_constructor(foo);
    program.set_body(ctor, Expr::block(vec![]));
    program.set_body(f, Expr::new_object(Type::class(foo), ctor, vec![]));
    program.set_body(
        g,
        Expr::block(vec![
            Stmt::Expr(Expr::new_object(Type::class(foo), ctor, vec![])),
            Stmt::Expr(Expr::unit()),
        ]),
    );
    let program = compile(program);

    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::AllocObj(foo),
            Inst::Dup,
            Inst::CallG(ctor),
            Inst::Drop,
            Inst::Ret,
        ]]
    );
    assert_eq!(
        blocks(&program, g),
        vec![vec![
            Inst::AllocObj(foo),
            Inst::CallG(ctor),
            Inst::Drop,
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

// ============================================================================
// Methods
// ============================================================================

mod dispatch {
    use super::*;

    /// class Foo { var n: i64; def m(): i64 = this.n }
    fn foo() -> (Program, ClassId, FunctionId) {
        let mut program = Program::new();
        let foo = program.add_class("Foo");
        let n = program.add_field(foo, "n", Type::I64, true, None);
        let m = program.add_method(foo, "m", Type::I64);
        program.set_body(m, Expr::field(Expr::this(Type::class(foo)), n, Type::I64));
        (program, foo, m)
    }

    fn call_m(program: &mut Program, receiver: ClassId, m: FunctionId) -> FunctionId {
        let f = program.add_function("f", Type::I64);
        let p = program.add_param(f, "p", Type::class(receiver), false);
        program.set_body(
            f,
            Expr::method_call(program.load(p), m, vec![], vec![], Type::I64),
        );
        f
    }

    #[test]
    fn test_method_body_reads_receiver() {
        let (program, _, m) = foo();
        let program = compile(program);
        assert_eq!(
            blocks(&program, m),
            vec![vec![Inst::LdLocal(0), Inst::Ld64(0), Inst::Ret]]
        );
    }

    #[test]
    fn test_virtual_call() {
        let (mut program, foo, m) = foo();
        let f = call_m(&mut program, foo, m);
        let program = compile(program);
        assert_eq!(method_slot(&program, foo, m), 2);
        assert_eq!(
            blocks(&program, f),
            vec![vec![
                Inst::LdLocal(0),
                Inst::CallV { argc: 1, slot: 2 },
                Inst::Ret
            ]]
        );
    }

    #[test]
    fn test_final_method_is_called_directly() {
        let (mut program, foo, m) = foo();
        program.function_mut(m).is_final = true;
        let f = call_m(&mut program, foo, m);
        let program = compile(program);
        assert_eq!(
            blocks(&program, f),
            vec![vec![Inst::LdLocal(0), Inst::CallG(m), Inst::Ret]]
        );
    }

    #[test]
    fn test_final_class_is_called_directly() {
        let (mut program, foo, m) = foo();
        program.class_mut(foo).is_final = true;
        let f = call_m(&mut program, foo, m);
        let program = compile(program);
        assert_eq!(
            blocks(&program, f),
            vec![vec![Inst::LdLocal(0), Inst::CallG(m), Inst::Ret]]
        );
    }

    #[test]
    fn test_override_keeps_inherited_slot() {
        let (mut program, foo, m) = foo();
        let bar = program.add_subclass("Bar", ClassType::new(foo, vec![]));
        let extra = program.add_method(bar, "extra", Type::Unit);
        program.set_body(extra, Expr::unit());
        let m2 = program.add_method(bar, "m", Type::I64);
        program.set_body(m2, Expr::i64(34));
        let f = call_m(&mut program, bar, m2);
        let program = compile(program);

        assert_eq!(method_slot(&program, bar, m2), 2);
        assert_eq!(method_slot(&program, bar, extra), 3);
        assert_eq!(
            blocks(&program, f),
            vec![vec![
                Inst::LdLocal(0),
                Inst::CallV { argc: 1, slot: 2 },
                Inst::Ret
            ]]
        );
    }
}
