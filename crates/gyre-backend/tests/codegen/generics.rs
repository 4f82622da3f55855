//! Runtime type arguments

use super::harness::*;

/// class Box[T] { var value: T; def get(): T = this.value; def set(v: T) = { this.value = v; () } }
struct Boxed {
    program: Program,
    class: ClassId,
    t: TypeParamId,
    get: FunctionId,
    set: FunctionId,
}

fn boxed() -> Boxed {
    let mut program = Program::new();
    let class = program.add_class("Box");
    let t = program.add_class_type_param(class, "T");
    let this_type = Type::generic(class, vec![Type::Variable(t)]);
    let value = program.add_field(class, "value", Type::Variable(t), true, None);

    let get = program.add_method(class, "get", Type::Variable(t));
    program.set_body(
        get,
        Expr::field(Expr::this(this_type.clone()), value, Type::Variable(t)),
    );

    let set = program.add_method(class, "set", Type::Unit);
    let v = program.add_param(set, "v", Type::Variable(t), false);
    program.set_body(
        set,
        Expr::block(vec![
            Stmt::Expr(Expr::assign(
                Expr::field(Expr::this(this_type), value, Type::Variable(t)),
                program.load(v),
            )),
            Stmt::Expr(Expr::unit()),
        ]),
    );

    Boxed {
        program,
        class,
        t,
        get,
        set,
    }
}

fn string_box(class: ClassId) -> Type {
    Type::generic(class, vec![Type::class(STRING_CLASS)])
}

#[test]
fn test_erased_field_access() {
    let Boxed { program, get, set, .. } = boxed();
    let program = compile(program);
    assert_eq!(
        blocks(&program, get),
        vec![vec![Inst::LdLocal(0), Inst::Ldp(0), Inst::Ret]]
    );
    assert_eq!(
        blocks(&program, set),
        vec![vec![
            Inst::LdLocal(0),
            Inst::LdLocal(1),
            Inst::Swap,
            Inst::Stp(0),
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_generic_constructor_passes_type_to_initializer() {
    let Boxed { program, class, t, .. } = boxed();
    let program = compile(program);
    let ctor = program.class(class).constructors[0];
    assert_eq!(
        blocks(&program, ctor),
        vec![vec![
            Inst::LdLocal(0),
            Inst::CallG(OBJECT_CONSTRUCTOR),
            Inst::Drop,
            Inst::LdLocal(0),
            Inst::Tyv(t),
            Inst::CallG(initializer(&program, class)),
            Inst::Drop,
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_method_calls_pass_receiver_type_arguments() {
    let Boxed {
        mut program,
        class,
        get,
        set,
        ..
    } = boxed();
    let f = program.add_function("f", Type::Unit);
    let p = program.add_param(f, "b", string_box(class), false);
    program.set_body(
        f,
        Expr::method_call(
            program.load(p),
            set,
            vec![],
            vec![Expr::method_call(
                program.load(p),
                get,
                vec![],
                vec![],
                Type::class(STRING_CLASS),
            )],
            Type::Unit,
        ),
    );
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::LdLocal(0),
            Inst::LdLocal(0),
            Inst::Tyc(STRING_CLASS),
            Inst::CallV { argc: 1, slot: 2 },
            Inst::Tyc(STRING_CLASS),
            Inst::CallV { argc: 2, slot: 3 },
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_new_generic_object() {
    let Boxed {
        mut program, class, ..
    } = boxed();
    let ctor = program.add_constructor(class);
    program.set_body(ctor, Expr::block(vec![]));
    let f = program.add_function("f", string_box(class));
    program.set_body(f, Expr::new_object(string_box(class), ctor, vec![]));
    let program = compile(program);
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::Tyc(STRING_CLASS),
            Inst::AllocObj(class),
            Inst::Dup,
            Inst::Tyc(STRING_CLASS),
            Inst::CallG(ctor),
            Inst::Drop,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_subclass_instantiates_superclass() {
    let Boxed {
        mut program, class, ..
    } = boxed();
    let sub = program.add_subclass(
        "StringBox",
        ClassType::new(class, vec![Type::class(STRING_CLASS)]),
    );
    let program = compile(program);
    let ctor = program.class(sub).constructors[0];
    let super_ctor = program.class(class).constructors[0];
    assert_eq!(
        blocks(&program, ctor),
        vec![vec![
            Inst::LdLocal(0),
            Inst::Tyc(STRING_CLASS),
            Inst::CallG(super_ctor),
            Inst::Drop,
            Inst::LdLocal(0),
            Inst::CallG(initializer(&program, sub)),
            Inst::Drop,
            Inst::Unit,
            Inst::Ret,
        ]]
    );
}

#[test]
fn test_generic_function_call() {
    let mut program = Program::new();
    let c = program.add_class("C");
    let id = program.add_function("id", Type::class(OBJECT_CLASS));
    let t = program.add_function_type_param(id, "T");
    program.function_mut(id).return_type = Type::Variable(t);
    let x = program.add_param(id, "x", Type::Variable(t), false);
    program.set_body(id, program.load(x));

    let f = program.add_function("f", Type::class(c));
    let o = program.add_param(f, "o", Type::class(c), false);
    program.set_body(
        f,
        Expr::call(id, vec![Type::class(c)], vec![program.load(o)], Type::class(c)),
    );
    let program = compile(program);
    assert_eq!(blocks(&program, id), vec![vec![Inst::LdLocal(0), Inst::Ret]]);
    assert_eq!(
        blocks(&program, f),
        vec![vec![Inst::LdLocal(0), Inst::Tyc(c), Inst::CallG(id), Inst::Ret]]
    );
}

/// def f[T](x: T): T = { def g: T = x; g[T]() }
#[test]
fn test_generic_closure() {
    let mut program = Program::new();
    let f = program.add_function("f", Type::Unit);
    let t = program.add_function_type_param(f, "T");
    program.function_mut(f).return_type = Type::Variable(t);
    let x = program.add_param(f, "x", Type::Variable(t), false);
    let g = program.add_nested_function(f, "g", Type::Variable(t));
    program.set_body(g, program.load(x));
    program.set_body(
        f,
        Expr::block(vec![
            Stmt::Function(g),
            Stmt::Expr(Expr::call(
                g,
                vec![Type::Variable(t)],
                vec![],
                Type::Variable(t),
            )),
        ]),
    );
    let program = compile(program);

    let context = program.find_class("f$context").unwrap();
    let closure = program.find_class("g$closure").unwrap();
    let context_ctor = program.class(context).constructors[0];
    let closure_ctor = program.class(closure).constructors[0];
    assert_eq!(
        blocks(&program, f),
        vec![vec![
            Inst::Tyv(t),
            Inst::AllocObj(context),
            Inst::Dup,
            Inst::Tyv(t),
            Inst::CallG(context_ctor),
            Inst::Drop,
            Inst::StLocal(-1),
            Inst::LdLocal(0),
            Inst::LdLocal(-1),
            Inst::Stp(0),
            Inst::Tyv(t),
            Inst::AllocObj(closure),
            Inst::Dup,
            Inst::LdLocal(-1),
            Inst::Tyv(t),
            Inst::CallG(closure_ctor),
            Inst::Drop,
            Inst::StLocal(-2),
            Inst::LdLocal(-2),
            Inst::Tyv(t),
            Inst::CallV { argc: 1, slot: 2 },
            Inst::Ret,
        ]]
    );
}

mod to_string {
    use super::*;

    /// class Foo[T] { def to-string(): String = "foo" }
    fn foo() -> (Program, ClassId, FunctionId) {
        let mut program = Program::new();
        let foo = program.add_class("Foo");
        program.add_class_type_param(foo, "T");
        let m = program.add_method(foo, "to-string", Type::class(STRING_CLASS));
        program.set_body(m, Expr::string("foo"));
        (program, foo, m)
    }

    fn call(program: &mut Program, foo: ClassId, method: FunctionId) -> FunctionId {
        let f = program.add_function("f", Type::class(STRING_CLASS));
        let p = program.add_param(
            f,
            "p",
            Type::generic(foo, vec![Type::class(OBJECT_CLASS)]),
            false,
        );
        program.set_body(
            f,
            Expr::method_call(
                program.load(p),
                method,
                vec![],
                vec![],
                Type::class(STRING_CLASS),
            ),
        );
        f
    }

    #[test]
    fn test_override_declared_on_generic_class() {
        let (mut program, foo, m) = foo();
        let f = call(&mut program, foo, m);
        let program = compile(program);
        assert_eq!(method_slot(&program, foo, m), 1);
        assert_eq!(
            blocks(&program, f),
            vec![vec![
                Inst::LdLocal(0),
                Inst::Tyc(OBJECT_CLASS),
                Inst::CallV { argc: 1, slot: 1 },
                Inst::Ret,
            ]]
        );
    }

    #[test]
    fn test_inherited_method_takes_no_type_arguments() {
        let (mut program, foo, _) = foo();
        let f = call(&mut program, foo, TO_STRING_METHOD);
        let program = compile(program);
        assert_eq!(
            blocks(&program, f),
            vec![vec![
                Inst::LdLocal(0),
                Inst::CallV { argc: 1, slot: 1 },
                Inst::Ret,
            ]]
        );
    }
}
