//! Program tables and the construction API

use super::builtins;
use super::{ClassId, ClassType, DefnId, Expr, FunctionId, ScopeId, Type, TypeParamId};
use crate::bytecode::LoweredBody;
use crate::error::CompileResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    Class(ClassId),
    Function(FunctionId),
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub names: BTreeMap<String, DefnId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefnKind {
    Parameter,
    Local,
    Field(ClassId),
    Global(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub id: DefnId,
    pub name: String,
    pub kind: DefnKind,
    pub ty: Type,
    pub mutable: bool,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub defn: DefnId,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassOrigin {
    Declared,
    Builtin,
    /// Holds the captured definitions of one activation of a scope.
    Context { scope: ScopeId },
    /// Holds the contexts a function needs when used as a value.
    Closure { function: FunctionId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub supertype: Option<ClassType>,
    /// Mixed in after the superclass prefix, before the class's own members.
    pub interfaces: Vec<ClassId>,
    pub type_params: Vec<TypeParamId>,
    pub scope: ScopeId,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FunctionId>,
    pub constructors: Vec<FunctionId>,
    pub initializer: Option<FunctionId>,
    pub origin: ClassOrigin,
    pub is_final: bool,
    pub layout: Option<crate::layout::ClassLayout>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    Global,
    Method(ClassId),
    Constructor(ClassId),
    Initializer(ClassId),
}

impl FunctionKind {
    pub fn owner_class(self) -> Option<ClassId> {
        match self {
            FunctionKind::Global => None,
            FunctionKind::Method(c)
            | FunctionKind::Constructor(c)
            | FunctionKind::Initializer(c) => Some(c),
        }
    }
}

/// What a constructor runs before its body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChainCall {
    /// The superclass's no-argument constructor.
    Default,
    Super {
        constructor: FunctionId,
        args: Vec<Expr>,
    },
    /// A sibling constructor of the same class.
    This {
        constructor: FunctionId,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorChain {
    pub call: ChainCall,
    /// Primary-constructor parameters stored straight into fields: (parameter, field).
    pub field_params: Vec<(DefnId, DefnId)>,
}

impl Default for ConstructorChain {
    fn default() -> Self {
        Self {
            call: ChainCall::Default,
            field_params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub kind: FunctionKind,
    pub scope: ScopeId,
    pub return_type: Type,
    /// Own type parameters; a nested function lists the enclosing ones first.
    pub type_params: Vec<TypeParamId>,
    /// Parameters in order, receiver first for class members.
    pub params: Vec<DefnId>,
    pub body: Option<Expr>,
    pub chain: Option<ConstructorChain>,
    pub is_builtin: bool,
    pub is_final: bool,
    pub lowered: Option<LoweredBody>,
}

impl Function {
    pub fn receiver(&self) -> Option<DefnId> {
        self.kind.owner_class().and_then(|_| self.params.first().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub defn: DefnId,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParameter {
    pub id: TypeParamId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub scopes: Vec<Scope>,
    pub definitions: Vec<Definition>,
    pub classes: Vec<Class>,
    pub functions: Vec<Function>,
    pub type_params: Vec<TypeParameter>,
    pub globals: Vec<Global>,
    /// String literal pool, filled by code generation.
    pub strings: Vec<String>,
    /// The synthesized global initialization function.
    pub init_function: Option<FunctionId>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    /// Empty program holding only the global scope and the builtin classes.
    pub fn new() -> Self {
        let mut program = Self {
            scopes: Vec::new(),
            definitions: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            type_params: Vec::new(),
            globals: Vec::new(),
            strings: Vec::new(),
            init_function: None,
        };
        program.add_scope(None, ScopeKind::Global);
        builtins::install(&mut program);
        program
    }

    pub fn global_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    // ── Lookup ──

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.index()]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn defn(&self, id: DefnId) -> &Definition {
        &self.definitions[id.index()]
    }

    pub fn defn_mut(&mut self, id: DefnId) -> &mut Definition {
        &mut self.definitions[id.index()]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.classes.iter().find(|c| c.name == name).map(|c| c.id)
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.functions.iter().find(|f| f.name == name).map(|f| f.id)
    }

    /// Resolve `name` from `scope` outward.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<DefnId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(defn) = scope.names.get(name) {
                return Some(*defn);
            }
            current = scope.parent;
        }
        None
    }

    /// The nearest enclosing function, class or global scope.
    pub fn activation_scope(&self, scope: ScopeId) -> ScopeId {
        let mut id = scope;
        loop {
            let s = self.scope(id);
            match (s.kind, s.parent) {
                (ScopeKind::Block, Some(parent)) => id = parent,
                _ => return id,
            }
        }
    }

    /// The function whose activation owns `scope`, if any.
    pub fn scope_function(&self, scope: ScopeId) -> Option<FunctionId> {
        match self.scope(self.activation_scope(scope)).kind {
            ScopeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// The function a nested function is declared in.
    pub fn enclosing_function(&self, function: FunctionId) -> Option<FunctionId> {
        self.declaring_scope(function)
            .and_then(|parent| self.scope_function(parent))
    }

    /// The scope a function is declared in.
    pub fn declaring_scope(&self, function: FunctionId) -> Option<ScopeId> {
        self.scope(self.function(function).scope).parent
    }

    /// Number of scopes enclosing `scope`.
    pub fn scope_depth(&self, scope: ScopeId) -> usize {
        let mut depth = 0;
        let mut current = self.scope(scope).parent;
        while let Some(id) = current {
            depth += 1;
            current = self.scope(id).parent;
        }
        depth
    }

    /// The type of `this` inside members of `class`.
    pub fn this_type(&self, class: ClassId) -> Type {
        let args = self
            .class(class)
            .type_params
            .iter()
            .map(|p| Type::Variable(*p))
            .collect();
        Type::generic(class, args)
    }

    /// Every type parameter visible in the body of `function`.
    pub fn scope_type_params(&self, function: FunctionId) -> Vec<TypeParamId> {
        let f = self.function(function);
        let mut params = match f.kind.owner_class() {
            Some(class) => self.class(class).type_params.clone(),
            None => Vec::new(),
        };
        params.extend(f.type_params.iter().copied());
        params
    }

    pub fn superclass(&self, class: ClassId) -> Option<ClassId> {
        self.class(class).supertype.as_ref().map(|st| st.class)
    }

    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        let mut current = Some(sub);
        let mut steps = 0;
        while let Some(id) = current {
            if id == sup || self.class(id).interfaces.contains(&sup) {
                return true;
            }
            steps += 1;
            if steps > self.classes.len() {
                return false;
            }
            current = self.superclass(id);
        }
        false
    }

    pub fn is_subtype(&self, sub: &Type, sup: &Type) -> bool {
        match (sub, sup) {
            (Type::Nothing, _) => true,
            (Type::Null, other) => other.is_nullable(),
            (Type::Class(a), Type::Class(b)) => {
                (!a.nullable || b.nullable) && self.is_subclass(a.class, b.class)
            }
            (a, b) => a == b,
        }
    }

    /// Type arguments of `target` when viewed from the instantiation `ty`.
    pub fn instantiate_supertype(&self, ty: &ClassType, target: ClassId) -> Option<Vec<Type>> {
        let mut current = ty.clone();
        for _ in 0..=self.classes.len() {
            if current.class == target {
                return Some(current.args);
            }
            let class = self.class(current.class);
            let supertype = class.supertype.as_ref()?;
            let args: Vec<Type> = supertype
                .args
                .iter()
                .map(|a| a.substitute(&class.type_params, &current.args))
                .collect();
            current = ClassType::new(supertype.class, args);
        }
        None
    }

    // ── Construction ──

    pub fn add_scope(&mut self, parent: Option<ScopeId>, kind: ScopeKind) -> ScopeId {
        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            parent,
            kind,
            names: BTreeMap::new(),
        });
        id
    }

    pub fn add_definition(
        &mut self,
        name: &str,
        kind: DefnKind,
        ty: Type,
        mutable: bool,
        scope: ScopeId,
    ) -> DefnId {
        let id = DefnId::new(self.definitions.len() as u32);
        self.definitions.push(Definition {
            id,
            name: name.to_string(),
            kind,
            ty,
            mutable,
            scope,
        });
        self.scopes[scope.index()].names.insert(name.to_string(), id);
        id
    }

    pub fn add_type_param(&mut self, name: &str) -> TypeParamId {
        let id = TypeParamId::new(self.type_params.len() as u32);
        self.type_params.push(TypeParameter {
            id,
            name: name.to_string(),
        });
        id
    }

    pub(crate) fn push_class(
        &mut self,
        name: &str,
        supertype: Option<ClassType>,
        origin: ClassOrigin,
    ) -> ClassId {
        let id = ClassId::new(self.classes.len() as u32);
        let scope = self.add_scope(Some(self.global_scope()), ScopeKind::Class(id));
        self.classes.push(Class {
            id,
            name: name.to_string(),
            supertype,
            interfaces: Vec::new(),
            type_params: Vec::new(),
            scope,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            initializer: None,
            origin,
            is_final: false,
            layout: None,
        });
        id
    }

    /// Declare a class deriving directly from `Object`.
    pub fn add_class(&mut self, name: &str) -> ClassId {
        self.push_class(
            name,
            Some(ClassType::new(builtins::OBJECT_CLASS, Vec::new())),
            ClassOrigin::Declared,
        )
    }

    pub fn add_subclass(&mut self, name: &str, supertype: ClassType) -> ClassId {
        self.push_class(name, Some(supertype), ClassOrigin::Declared)
    }

    /// Add a class type parameter. Declare these before the class's members.
    pub fn add_class_type_param(&mut self, class: ClassId, name: &str) -> TypeParamId {
        let id = self.add_type_param(name);
        self.class_mut(class).type_params.push(id);
        id
    }

    pub fn add_field(
        &mut self,
        class: ClassId,
        name: &str,
        ty: Type,
        mutable: bool,
        init: Option<Expr>,
    ) -> DefnId {
        let scope = self.class(class).scope;
        let defn = self.add_definition(name, DefnKind::Field(class), ty, mutable, scope);
        self.class_mut(class).fields.push(FieldDecl { defn, init });
        defn
    }

    pub(crate) fn push_function(
        &mut self,
        name: &str,
        kind: FunctionKind,
        parent_scope: ScopeId,
        return_type: Type,
    ) -> FunctionId {
        let id = FunctionId::new(self.functions.len() as u32);
        let scope = self.add_scope(Some(parent_scope), ScopeKind::Function(id));
        self.functions.push(Function {
            id,
            name: name.to_string(),
            kind,
            scope,
            return_type,
            type_params: Vec::new(),
            params: Vec::new(),
            body: None,
            chain: None,
            is_builtin: false,
            is_final: false,
            lowered: None,
        });
        if let Some(class) = kind.owner_class() {
            let this_type = self.this_type(class);
            let receiver =
                self.add_definition("$this", DefnKind::Parameter, this_type, false, scope);
            self.function_mut(id).params.push(receiver);
        }
        id
    }

    pub fn add_function(&mut self, name: &str, return_type: Type) -> FunctionId {
        let global = self.global_scope();
        self.push_function(name, FunctionKind::Global, global, return_type)
    }

    /// Declare a function inside the body of `parent`. It inherits the
    /// type parameters visible in `parent`.
    pub fn add_nested_function(
        &mut self,
        parent: FunctionId,
        name: &str,
        return_type: Type,
    ) -> FunctionId {
        let parent_scope = self.function(parent).scope;
        let inherited = self.scope_type_params(parent);
        let id = self.push_function(name, FunctionKind::Global, parent_scope, return_type);
        self.function_mut(id).type_params = inherited;
        id
    }

    pub fn add_method(&mut self, class: ClassId, name: &str, return_type: Type) -> FunctionId {
        let scope = self.class(class).scope;
        let id = self.push_function(name, FunctionKind::Method(class), scope, return_type);
        self.class_mut(class).methods.push(id);
        id
    }

    pub fn add_constructor(&mut self, class: ClassId) -> FunctionId {
        let scope = self.class(class).scope;
        let id = self.push_function(
            "$constructor",
            FunctionKind::Constructor(class),
            scope,
            Type::Unit,
        );
        self.function_mut(id).chain = Some(ConstructorChain::default());
        self.class_mut(class).constructors.push(id);
        id
    }

    pub fn add_function_type_param(&mut self, function: FunctionId, name: &str) -> TypeParamId {
        let id = self.add_type_param(name);
        self.function_mut(function).type_params.push(id);
        id
    }

    pub fn add_param(
        &mut self,
        function: FunctionId,
        name: &str,
        ty: Type,
        mutable: bool,
    ) -> DefnId {
        let scope = self.function(function).scope;
        let defn = self.add_definition(name, DefnKind::Parameter, ty, mutable, scope);
        self.function_mut(function).params.push(defn);
        defn
    }

    pub fn add_local(
        &mut self,
        function: FunctionId,
        name: &str,
        ty: Type,
        mutable: bool,
    ) -> DefnId {
        let scope = self.function(function).scope;
        self.add_definition(name, DefnKind::Local, ty, mutable, scope)
    }

    /// Open a block scope inside `parent`.
    pub fn add_block_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.add_scope(Some(parent), ScopeKind::Block)
    }

    pub fn add_block_local(
        &mut self,
        scope: ScopeId,
        name: &str,
        ty: Type,
        mutable: bool,
    ) -> DefnId {
        self.add_definition(name, DefnKind::Local, ty, mutable, scope)
    }

    pub fn add_global(
        &mut self,
        name: &str,
        ty: Type,
        mutable: bool,
        init: Option<Expr>,
    ) -> DefnId {
        let index = self.globals.len() as u32;
        let global = self.global_scope();
        let defn = self.add_definition(name, DefnKind::Global(index), ty, mutable, global);
        self.globals.push(Global { defn, init });
        defn
    }

    pub fn set_body(&mut self, function: FunctionId, body: Expr) {
        self.function_mut(function).body = Some(body);
    }

    pub fn set_chain(&mut self, constructor: FunctionId, chain: ConstructorChain) {
        self.function_mut(constructor).chain = Some(chain);
    }

    /// Read a definition as an expression of its declared type.
    pub fn load(&self, defn: DefnId) -> Expr {
        Expr::variable(defn, self.defn(defn).ty.clone())
    }

    // ── Output ──

    pub fn to_json(&self) -> CompileResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(source: &str) -> CompileResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// SHA-256 of the serialized program, hex encoded.
    pub fn checksum(&self) -> CompileResult<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}
