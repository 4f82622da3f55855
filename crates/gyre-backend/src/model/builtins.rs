//! Builtin classes and functions
//!
//! Installed first by [`Program::new`], so their ids are fixed.

use super::program::{ClassOrigin, FunctionKind, Program};
use super::{ClassId, ClassType, FunctionId, Type};

pub const OBJECT_CLASS: ClassId = ClassId::new(0);
pub const STRING_CLASS: ClassId = ClassId::new(1);
pub const TYPE_CLASS: ClassId = ClassId::new(2);
pub const EXCEPTION_CLASS: ClassId = ClassId::new(3);

pub const OBJECT_CONSTRUCTOR: FunctionId = FunctionId::new(0);
pub const TYPEOF_METHOD: FunctionId = FunctionId::new(1);
pub const TO_STRING_METHOD: FunctionId = FunctionId::new(2);
pub const STRING_CONCAT_METHOD: FunctionId = FunctionId::new(3);
pub const STRING_EQ_METHOD: FunctionId = FunctionId::new(4);
pub const STRING_TO_STRING_METHOD: FunctionId = FunctionId::new(5);
pub const TYPE_CONSTRUCTOR: FunctionId = FunctionId::new(6);
pub const IS_SUBTYPE_OF_METHOD: FunctionId = FunctionId::new(7);
pub const EXCEPTION_CONSTRUCTOR: FunctionId = FunctionId::new(8);
pub const PRINT_FUNCTION: FunctionId = FunctionId::new(9);

pub(super) fn install(program: &mut Program) {
    let object = program.push_class("Object", None, ClassOrigin::Builtin);
    let object_type = ClassType::new(object, Vec::new());
    let string = program.push_class("String", Some(object_type.clone()), ClassOrigin::Builtin);
    let ty = program.push_class("Type", Some(object_type.clone()), ClassOrigin::Builtin);
    let exception = program.push_class("Exception", Some(object_type), ClassOrigin::Builtin);
    debug_assert_eq!(
        [object, string, ty, exception],
        [OBJECT_CLASS, STRING_CLASS, TYPE_CLASS, EXCEPTION_CLASS]
    );

    let string_type = Type::class(STRING_CLASS);

    builtin_constructor(program, object);
    builtin_method(program, object, "typeof", Type::class(TYPE_CLASS), &[]);
    builtin_method(program, object, "to-string", string_type.clone(), &[]);

    builtin_method(program, string, "+", string_type.clone(), &[string_type.clone()]);
    builtin_method(program, string, "==", Type::Boolean, &[string_type.clone()]);
    builtin_method(program, string, "to-string", string_type.clone(), &[]);

    let ctor = builtin_constructor(program, ty);
    program.add_param(ctor, "class", Type::class(OBJECT_CLASS), false);
    builtin_method(program, ty, "is-subtype-of", Type::Boolean, &[Type::class(TYPE_CLASS)]);

    builtin_constructor(program, exception);

    let print = program.add_function("print", Type::Unit);
    program.add_param(print, "message", string_type, false);
    program.function_mut(print).is_builtin = true;
    debug_assert_eq!(print, PRINT_FUNCTION);
}

fn builtin_constructor(program: &mut Program, class: ClassId) -> FunctionId {
    let id = program.add_constructor(class);
    program.function_mut(id).is_builtin = true;
    id
}

fn builtin_method(
    program: &mut Program,
    class: ClassId,
    name: &str,
    return_type: Type,
    params: &[Type],
) -> FunctionId {
    let id = program.add_method(class, name, return_type);
    for (i, ty) in params.iter().enumerate() {
        program.add_param(id, &format!("arg{}", i), ty.clone(), false);
    }
    let function = program.function_mut(id);
    function.is_builtin = true;
    debug_assert!(matches!(function.kind, FunctionKind::Method(_)));
    id
}
