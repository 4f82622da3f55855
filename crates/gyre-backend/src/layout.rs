//! Class flattening
//!
//! Computes, for every class, the complete field table (inherited fields
//! first, at their inherited offsets) and the complete virtual method table
//! (overrides replace the inherited entry at the same slot, new methods are
//! appended). Interfaces contribute their own members after the superclass
//! prefix and before the class's own members.

use crate::error::{CompileError, CompileResult};
use crate::model::{ClassId, DefnId, DefnKind, FunctionId, Program, Repr, Type};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSlot {
    pub defn: DefnId,
    pub repr: Repr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSlot {
    pub function: FunctionId,
    /// Representation of the result; `None` when the method never returns.
    pub repr: Option<Repr>,
}

/// Flattened field and method tables of one class
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassLayout {
    pub fields: Vec<FieldSlot>,
    pub methods: Vec<MethodSlot>,
}

impl ClassLayout {
    pub fn field_index(&self, defn: DefnId) -> Option<u32> {
        self.fields
            .iter()
            .position(|f| f.defn == defn)
            .map(|i| i as u32)
    }

    pub fn field(&self, defn: DefnId) -> Option<&FieldSlot> {
        self.fields.iter().find(|f| f.defn == defn)
    }

    pub fn method_slot(&self, function: FunctionId) -> Option<u32> {
        self.methods
            .iter()
            .position(|m| m.function == function)
            .map(|i| i as u32)
    }
}

/// Flatten every class in the program, superclasses first.
pub fn flatten_classes(program: &mut Program) -> CompileResult<()> {
    let order = inheritance_order(program)?;
    for class in order {
        let layout = flatten_class(program, class)?;
        trace!(
            class = %program.class(class).name,
            fields = layout.fields.len(),
            methods = layout.methods.len(),
            "flattened class"
        );
        program.class_mut(class).layout = Some(layout);
    }
    debug!(classes = program.classes.len(), "class layouts finalized");
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Classes ordered so that every superclass and interface precedes its users.
fn inheritance_order(program: &Program) -> CompileResult<Vec<ClassId>> {
    let mut marks = vec![Mark::Unvisited; program.classes.len()];
    let mut order = Vec::with_capacity(program.classes.len());
    for class in &program.classes {
        visit(program, class.id, &mut marks, &mut order)?;
    }
    Ok(order)
}

fn visit(
    program: &Program,
    id: ClassId,
    marks: &mut [Mark],
    order: &mut Vec<ClassId>,
) -> CompileResult<()> {
    match marks[id.index()] {
        Mark::Done => return Ok(()),
        Mark::Visiting => {
            return Err(CompileError::InheritanceCycle {
                class: program.class(id).name.clone(),
            })
        }
        Mark::Unvisited => {}
    }
    marks[id.index()] = Mark::Visiting;
    let class = program.class(id);
    if let Some(supertype) = &class.supertype {
        visit(program, supertype.class, marks, order)?;
    }
    for iface in &class.interfaces {
        visit(program, *iface, marks, order)?;
    }
    marks[id.index()] = Mark::Done;
    order.push(id);
    Ok(())
}

fn flatten_class(program: &Program, id: ClassId) -> CompileResult<ClassLayout> {
    let class = program.class(id);
    let mut layout = match program.superclass(id) {
        Some(sup) => program
            .class(sup)
            .layout
            .clone()
            .ok_or_else(|| CompileError::LayoutNotFinalized {
                class: program.class(sup).name.clone(),
            })?,
        None => ClassLayout::default(),
    };

    for iface in &class.interfaces {
        let source = program.class(*iface);
        for field in &source.fields {
            add_field(program, id, &mut layout, field.defn, &source.name)?;
        }
        for method in &source.methods {
            add_method(program, id, &mut layout, *method)?;
        }
    }

    for field in &class.fields {
        add_field(program, id, &mut layout, field.defn, &class.name)?;
    }

    let mut own_names = FxHashSet::default();
    for method in &class.methods {
        let name = &program.function(*method).name;
        if !own_names.insert(name.as_str()) {
            return Err(CompileError::DuplicateMethod {
                class: class.name.clone(),
                method: name.clone(),
            });
        }
        add_method(program, id, &mut layout, *method)?;
    }

    Ok(layout)
}

fn add_field(
    program: &Program,
    class: ClassId,
    layout: &mut ClassLayout,
    defn: DefnId,
    declared_by: &str,
) -> CompileResult<()> {
    let field = program.defn(defn);
    if let Some(existing) = layout
        .fields
        .iter()
        .find(|f| program.defn(f.defn).name == field.name)
    {
        // The same interface reached twice contributes the same definition.
        if existing.defn == defn {
            return Ok(());
        }
        let first = match program.defn(existing.defn).kind {
            DefnKind::Field(owner) => program.class(owner).name.clone(),
            _ => program.class(class).name.clone(),
        };
        return Err(CompileError::ConflictingField {
            class: program.class(class).name.clone(),
            field: field.name.clone(),
            first,
            second: declared_by.to_string(),
        });
    }
    // A field of the bottom type can never be read; store it as a pointer.
    let repr = field.ty.repr().unwrap_or(Repr::Pointer);
    layout.fields.push(FieldSlot { defn, repr });
    Ok(())
}

fn add_method(
    program: &Program,
    class: ClassId,
    layout: &mut ClassLayout,
    method: FunctionId,
) -> CompileResult<()> {
    let function = program.function(method);
    let entry = MethodSlot {
        function: method,
        repr: function.return_type.repr(),
    };
    let existing = layout
        .methods
        .iter()
        .position(|m| program.function(m.function).name == function.name);
    match existing {
        Some(slot) => {
            let inherited = layout.methods[slot].function;
            if inherited != method && !is_compatible_override(program, class, inherited, method) {
                return Err(CompileError::IncompatibleOverride {
                    class: program.class(class).name.clone(),
                    method: function.name.clone(),
                });
            }
            layout.methods[slot] = entry;
        }
        None => layout.methods.push(entry),
    }
    Ok(())
}

/// Same arity and parameter types, and a result that is a subtype of the
/// inherited one, after substituting the inherited class's type arguments.
fn is_compatible_override(
    program: &Program,
    class: ClassId,
    inherited: FunctionId,
    method: FunctionId,
) -> bool {
    let old = program.function(inherited);
    let new = program.function(method);
    if old.params.len() != new.params.len() || old.type_params.len() != new.type_params.len() {
        return false;
    }

    let (params, args) = match old.kind.owner_class() {
        Some(owner) => {
            let this_type = program.this_type(class);
            let args = this_type
                .as_class()
                .and_then(|ct| program.instantiate_supertype(ct, owner))
                .unwrap_or_default();
            (program.class(owner).type_params.clone(), args)
        }
        None => (Vec::new(), Vec::new()),
    };
    let mut params = params;
    let mut args = args;
    // Method type parameters correspond by position.
    params.extend(old.type_params.iter().copied());
    args.extend(new.type_params.iter().map(|t| Type::Variable(*t)));

    let same_params = old
        .params
        .iter()
        .zip(new.params.iter())
        .skip(1)
        .all(|(o, n)| program.defn(*o).ty.substitute(&params, &args) == program.defn(*n).ty);
    let old_return = old.return_type.substitute(&params, &args);
    same_params && program.is_subtype(&new.return_type, &old_return)
}
