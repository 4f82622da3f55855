//! Closure conversion
//!
//! Removes every reference from a function body into an enclosing stack
//! frame. For each scope whose definitions are used from nested functions,
//! a context class holds those definitions. A function allocates the
//! context of its body on entry; a block allocates its own context each time
//! it is entered. Captured definitions are then read and written through
//! the context. Each nested function that captures anything, or is used as
//! a value, becomes the only method of a closure class whose fields point at
//! the enclosing contexts it needs. A top-level function used as a value
//! gets a closure class whose method forwards to it.

mod analysis;
mod receiver;
mod rewrite;

use crate::error::{CompileError, CompileResult};
use crate::model::{
    ClassId, ClassOrigin, ClassType, DefnId, DefnKind, Expr, FieldDecl, FunctionId, FunctionKind,
    Program, ScopeId, ScopeKind, Type, OBJECT_CLASS,
};
use analysis::{Capture, CaptureInfo};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// The context class synthesized for one scope
#[derive(Debug)]
struct ContextClass {
    constructor: FunctionId,
    /// The `$context` local holding the instance.
    local: DefnId,
    ty: Type,
}

/// The closure class synthesized for one nested function
#[derive(Debug)]
struct ClosureClass {
    constructor: FunctionId,
    /// The variable holding the closure in the enclosing scope.
    var: DefnId,
    /// The method's receiver.
    receiver: DefnId,
    ty: Type,
    /// Leading type parameters now supplied by the closure class.
    inherited_type_params: usize,
}

/// The closure class of a top-level function used as a value
#[derive(Debug)]
struct ValueClass {
    constructor: FunctionId,
    ty: Type,
}

#[derive(Debug, Default)]
struct Conversion {
    info: CaptureInfo,
    contexts: FxHashMap<ScopeId, ContextClass>,
    closures: FxHashMap<FunctionId, ClosureClass>,
    values: FxHashMap<FunctionId, ValueClass>,
    /// Captured parameter to the context field holding its copy.
    param_fields: FxHashMap<DefnId, DefnId>,
    /// (closure function, context scope) to the closure field holding that context.
    context_fields: FxHashMap<(FunctionId, ScopeId), DefnId>,
    /// Captured `catch` binding to the local that receives the exception.
    caught: FxHashMap<DefnId, DefnId>,
}

impl Conversion {
    /// The scope whose context holds `defn`.
    fn context_scope(&self, program: &Program, defn: DefnId) -> Option<ScopeId> {
        if let Some(field) = self.param_fields.get(&defn) {
            return self.context_scope(program, *field);
        }
        match program.defn(defn).kind {
            DefnKind::Field(class) => match program.class(class).origin {
                ClassOrigin::Context { scope } => Some(scope),
                _ => None,
            },
            _ => None,
        }
    }
}

pub fn convert_closures(program: &mut Program) -> CompileResult<()> {
    receiver::desugar_receivers(program)?;
    let info = analysis::analyze(program)?;
    debug!(
        contexts = info.captured.len(),
        closures = info.closures.len(),
        values = info.values.len(),
        "capture analysis finished"
    );

    let conversion = synthesize(program, info)?;
    rewrite::rewrite_functions(program, &conversion)
}

/// How `scope` is named in diagnostics.
fn scope_label(program: &Program, scope: ScopeId) -> String {
    let function = program
        .scope_function(scope)
        .map(|f| program.function(f).name.as_str())
        .unwrap_or("<global>");
    match program.scope(scope).kind {
        ScopeKind::Block => format!("{} ({})", function, scope),
        _ => function.to_string(),
    }
}

fn unreachable_context(
    program: &Program,
    function: &str,
    scope: ScopeId,
    name: &str,
) -> CompileError {
    CompileError::UnreachableContext {
        function: function.to_string(),
        scope: scope_label(program, scope),
        name: name.to_string(),
    }
}

fn synthesize(program: &mut Program, info: CaptureInfo) -> CompileResult<Conversion> {
    let mut conversion = Conversion::default();
    let object = Some(ClassType::new(OBJECT_CLASS, Vec::new()));

    // Class shells first: context fields may hold closures and vice versa.
    let mut context_classes = Vec::new();
    let mut blocks: FxHashMap<FunctionId, usize> = FxHashMap::default();
    for scope in info.captured.keys() {
        let owner = program
            .scope_function(*scope)
            .ok_or_else(|| unreachable_context(program, "<global>", *scope, "$context"))?;
        let function = program.function(owner).name.clone();
        let name = match program.scope(*scope).kind {
            ScopeKind::Block => {
                let count = blocks.entry(owner).or_default();
                *count += 1;
                format!("{}$context{}", function, count)
            }
            _ => format!("{}$context", function),
        };
        let origin = ClassOrigin::Context { scope: *scope };
        let class = program.push_class(&name, object.clone(), origin);
        program.class_mut(class).type_params = program.scope_type_params(owner);
        context_classes.push((*scope, owner, class));
    }
    let mut closure_classes: BTreeMap<FunctionId, (ClassId, usize)> = BTreeMap::new();
    for function in &info.closures {
        let name = program.function(*function).name.clone();
        let Some(&parent) = info.parents.get(function) else {
            let scope = program.function(*function).scope;
            return Err(unreachable_context(program, &name, scope, &name));
        };
        let origin = ClassOrigin::Closure {
            function: *function,
        };
        let class = program.push_class(&format!("{}$closure", name), object.clone(), origin);
        let type_params = program.scope_type_params(parent);
        let inherited = type_params.len();
        program.class_mut(class).type_params = type_params;
        closure_classes.insert(*function, (class, inherited));
    }

    // Contexts: relocate captured locals, copy captured parameters.
    let mut closure_vars: FxHashMap<FunctionId, DefnId> = FxHashMap::default();
    for (scope, owner, class) in &context_classes {
        let ty = program.this_type(*class);
        let local =
            program.add_definition("$context", DefnKind::Local, ty.clone(), false, *scope);
        let class_scope = program.class(*class).scope;

        for capture in &info.captured[scope] {
            match *capture {
                Capture::Defn(defn) => match program.defn(defn).kind {
                    DefnKind::Parameter => {
                        let param = program.defn(defn).clone();
                        let field =
                            program.add_field(*class, &param.name, param.ty, param.mutable, None);
                        conversion.param_fields.insert(defn, field);
                    }
                    _ => {
                        if info.catch_bindings.contains(&defn) {
                            let binding = program.defn(defn).clone();
                            let temp = program.add_definition(
                                &binding.name,
                                DefnKind::Local,
                                binding.ty,
                                false,
                                *scope,
                            );
                            conversion.caught.insert(defn, temp);
                        }
                        let relocated = program.defn_mut(defn);
                        relocated.kind = DefnKind::Field(*class);
                        relocated.scope = class_scope;
                        let name = relocated.name.clone();
                        program.scopes[class_scope.index()].names.insert(name, defn);
                        program.class_mut(*class).fields.push(FieldDecl { defn, init: None });
                    }
                },
                Capture::Closure(function) => {
                    let name = program.function(function).name.clone();
                    let Some(&(closure_class, _)) = closure_classes.get(&function) else {
                        let owner = &program.function(*owner).name;
                        return Err(unreachable_context(program, owner, *scope, &name));
                    };
                    let closure_ty = program.this_type(closure_class);
                    let field = program.add_field(*class, &name, closure_ty, false, None);
                    closure_vars.insert(function, field);
                }
            }
        }

        let constructor = program.add_constructor(*class);
        program.set_body(constructor, Expr::block(Vec::new()));
        debug!(
            scope = %scope_label(program, *scope),
            class = %program.class(*class).name,
            fields = program.class(*class).fields.len(),
            "synthesized context class"
        );
        conversion.contexts.insert(
            *scope,
            ContextClass {
                constructor,
                local,
                ty,
            },
        );
    }

    // Closures: one context field per needed scope, then the method itself.
    for (function, (class, inherited)) in closure_classes {
        let ty = program.this_type(class);
        let needed = info.needed.get(&function).cloned().unwrap_or_default();
        let constructor = program.add_constructor(class);
        let function_name = program.function(function).name.clone();

        for (i, scope) in needed.iter().enumerate() {
            let name = if i == 0 {
                "$context".to_string()
            } else {
                format!("$context{}", i)
            };
            let context_ty = conversion
                .contexts
                .get(scope)
                .map(|c| c.ty.clone())
                .ok_or_else(|| unreachable_context(program, &function_name, *scope, &name))?;
            let field = program.add_field(class, &name, context_ty.clone(), false, None);
            let param = program.add_param(constructor, &name, context_ty, false);
            if let Some(chain) = program.function_mut(constructor).chain.as_mut() {
                chain.field_params.push((param, field));
            }
            conversion.context_fields.insert((function, *scope), field);
        }
        program.set_body(constructor, Expr::block(Vec::new()));

        let scope = program.function(function).scope;
        let var = match closure_vars.get(&function) {
            Some(field) => *field,
            None => {
                let Some(home) = program.declaring_scope(function) else {
                    let error = unreachable_context(program, &function_name, scope, &function_name);
                    return Err(error);
                };
                program.add_definition(&function_name, DefnKind::Local, ty.clone(), false, home)
            }
        };

        let receiver =
            program.add_definition("$this", DefnKind::Parameter, ty.clone(), false, scope);
        let method = program.function_mut(function);
        method.kind = FunctionKind::Method(class);
        method.params.insert(0, receiver);
        method.type_params.drain(..inherited.min(method.type_params.len()));
        program.class_mut(class).methods.push(function);

        debug!(
            function = %function_name,
            class = %program.class(class).name,
            contexts = needed.len(),
            "synthesized closure class"
        );
        conversion.closures.insert(
            function,
            ClosureClass {
                constructor,
                var,
                receiver,
                ty,
                inherited_type_params: inherited,
            },
        );
    }

    // Top-level functions used as values: no contexts, a forwarding method.
    for function in &info.values {
        let target = program.function(*function);
        let name = target.name.clone();
        let return_type = target.return_type.clone();
        let type_params = target.type_params.clone();
        let params = target.params.clone();

        let origin = ClassOrigin::Closure {
            function: *function,
        };
        let class = program.push_class(&format!("{}$closure", name), object.clone(), origin);
        let ty = program.this_type(class);
        let constructor = program.add_constructor(class);
        program.set_body(constructor, Expr::block(Vec::new()));

        let method = program.add_method(class, &name, return_type.clone());
        program.function_mut(method).type_params = type_params.clone();
        let mut args = Vec::with_capacity(params.len());
        for param in params {
            let param = program.defn(param).clone();
            let copy = program.add_param(method, &param.name, param.ty, false);
            args.push(program.load(copy));
        }
        let type_args = type_params.iter().map(|p| Type::Variable(*p)).collect();
        program.set_body(method, Expr::call(*function, type_args, args, return_type));

        debug!(
            function = %name,
            class = %program.class(class).name,
            "synthesized function value class"
        );
        conversion
            .values
            .insert(*function, ValueClass { constructor, ty });
    }

    conversion.info = info;
    Ok(conversion)
}
