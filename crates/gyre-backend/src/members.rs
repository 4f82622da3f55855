//! Member synthesis
//!
//! Adds the functions the source leaves implicit: a `$initializer` per
//! declared class, a default `$constructor` for classes without one, and the
//! `$init` function that initializes globals. Runs before closure conversion
//! because field and global initializers may contain closures.

use crate::model::{ClassId, ClassOrigin, Expr, ExprKind, FunctionKind, Program, Stmt, Type};
use tracing::debug;

pub fn synthesize(program: &mut Program) {
    let declared: Vec<ClassId> = program
        .classes
        .iter()
        .filter(|c| c.origin == ClassOrigin::Declared)
        .map(|c| c.id)
        .collect();

    for class in declared {
        if program.class(class).initializer.is_none() {
            synthesize_initializer(program, class);
        }
        if program.class(class).constructors.is_empty() {
            let ctor = program.add_constructor(class);
            program.set_body(ctor, Expr::block(Vec::new()));
            debug!(class = %program.class(class).name, "synthesized default constructor");
        }
    }

    if program.init_function.is_none() {
        synthesize_global_init(program);
    }
}

fn synthesize_initializer(program: &mut Program, class: ClassId) {
    let scope = program.class(class).scope;
    let init = program.push_function(
        "$initializer",
        FunctionKind::Initializer(class),
        scope,
        Type::Unit,
    );
    let this_type = program.this_type(class);

    let mut stmts = Vec::new();
    for field in &program.class(class).fields {
        let defn = program.defn(field.defn);
        let value = match &field.init {
            Some(value) => value.clone(),
            None if defn.ty.is_object() => Expr::new(ExprKind::Uninitialized, defn.ty.clone()),
            None => continue,
        };
        stmts.push(Stmt::Expr(Expr::init_field(
            Expr::this(this_type.clone()),
            field.defn,
            value,
        )));
    }

    program.set_body(init, Expr::block(stmts));
    program.class_mut(class).initializer = Some(init);
}

fn synthesize_global_init(program: &mut Program) {
    let mut stmts = Vec::new();
    for global in &program.globals {
        if let Some(init) = &global.init {
            stmts.push(Stmt::Expr(Expr::assign(
                program.load(global.defn),
                init.clone(),
            )));
        }
    }
    // Stores are statements; the function itself yields unit.
    if !stmts.is_empty() {
        stmts.push(Stmt::Expr(Expr::unit()));
    }
    let init = program.add_function("$init", Type::Unit);
    program.set_body(init, Expr::block(stmts));
    program.init_function = Some(init);
    debug!(globals = program.globals.len(), "synthesized global initializer");
}
