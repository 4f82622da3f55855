//! Capture analysis
//!
//! Finds, for every function, the definitions of enclosing scopes it uses,
//! decides which functions need a closure object, and which enclosing
//! contexts each closure must hold on to. Contexts belong to scopes: a
//! function body or a block whose definitions are used from nested
//! functions.

use crate::error::{CompileError, CompileResult};
use crate::model::{
    walk_expr, Callee, DefnId, DefnKind, Expr, ExprKind, FunctionId, FunctionKind, Program,
    ScopeId, Visitor,
};
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Something stored in a context object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(super) enum Capture {
    /// A parameter or local declared in the owning scope.
    Defn(DefnId),
    /// The variable holding the closure of a function declared in the owning scope.
    Closure(FunctionId),
}

#[derive(Debug, Default)]
pub(super) struct CaptureInfo {
    /// Captured items per owning scope.
    pub captured: BTreeMap<ScopeId, BTreeSet<Capture>>,
    /// Nested functions that become closure classes.
    pub closures: BTreeSet<FunctionId>,
    /// Top-level functions used as values.
    pub values: BTreeSet<FunctionId>,
    /// For each closure, the scopes whose contexts it holds, outermost first.
    pub needed: BTreeMap<FunctionId, Vec<ScopeId>>,
    /// Locals bound by `catch` clauses.
    pub catch_bindings: BTreeSet<DefnId>,
    /// Enclosing function of every nested function.
    pub parents: FxHashMap<FunctionId, FunctionId>,
}

#[derive(Debug, Default)]
struct Uses {
    vars: Vec<DefnId>,
    functions: Vec<FunctionId>,
    values: Vec<FunctionId>,
}

struct UseCollector<'a> {
    program: &'a Program,
    uses: Uses,
    catch_bindings: Vec<DefnId>,
}

impl Visitor for UseCollector<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Variable(defn) => {
                if matches!(
                    self.program.defn(*defn).kind,
                    DefnKind::Parameter | DefnKind::Local
                ) {
                    self.uses.vars.push(*defn);
                }
            }
            ExprKind::FunctionValue(function) => self.uses.values.push(*function),
            ExprKind::Call {
                callee: Callee::Function(function),
                ..
            } => self.uses.functions.push(*function),
            ExprKind::Try { catches, .. } => {
                self.catch_bindings
                    .extend(catches.iter().filter_map(|c| c.binding));
            }
            _ => {}
        }
        walk_expr(self, expr);
    }
}

pub(super) fn analyze(program: &Program) -> CompileResult<CaptureInfo> {
    let mut info = CaptureInfo::default();
    let mut uses: BTreeMap<FunctionId, Uses> = BTreeMap::new();

    for function in &program.functions {
        let Some(body) = &function.body else {
            continue;
        };
        let mut collector = UseCollector {
            program,
            uses: Uses::default(),
            catch_bindings: Vec::new(),
        };
        collector.visit_expr(body);
        info.catch_bindings.extend(collector.catch_bindings);
        uses.insert(function.id, collector.uses);
        if let Some(parent) = program.enclosing_function(function.id) {
            info.parents.insert(function.id, parent);
        }
    }

    // A function used as a value always needs a closure object. Top-level
    // ones get a class of their own that forwards to them.
    for function in uses.values().flat_map(|u| u.values.iter().copied()) {
        if info.parents.contains_key(&function) {
            info.closures.insert(function);
        } else if program.function(function).kind == FunctionKind::Global {
            info.values.insert(function);
        }
    }

    // Deepest functions first, so children are finished before parents.
    let mut order: Vec<FunctionId> = uses.keys().copied().collect();
    order.sort_by_key(|f| (Reverse(depth(&info.parents, *f)), *f));

    let needed = loop {
        let needed = needed_contexts(program, &uses, &info, &order)?;
        let mut grew = false;
        for (function, scopes) in &needed {
            if !scopes.is_empty() && info.parents.contains_key(function) {
                grew |= info.closures.insert(*function);
            }
        }
        if !grew {
            break needed;
        }
    };

    for (function, u) in &uses {
        for defn in &u.vars {
            let home = program.defn(*defn).scope;
            if let Some(owner) = program.scope_function(home) {
                if owner != *function {
                    info.captured
                        .entry(home)
                        .or_default()
                        .insert(Capture::Defn(*defn));
                }
            }
        }
        for nested in u.functions.iter().chain(u.values.iter()) {
            if !info.closures.contains(nested) {
                continue;
            }
            let (Some(parent), Some(home)) =
                (info.parents.get(nested), program.declaring_scope(*nested))
            else {
                continue;
            };
            if parent != function {
                info.captured
                    .entry(home)
                    .or_default()
                    .insert(Capture::Closure(*nested));
            }
        }
    }

    for closure in &info.closures {
        let mut scopes: Vec<ScopeId> = needed
            .get(closure)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        scopes.sort_by_key(|s| (program.scope_depth(*s), *s));
        info.needed.insert(*closure, scopes);
    }

    Ok(info)
}

/// Context scopes of enclosing functions each function reaches into,
/// directly or through the closures nested inside it.
fn needed_contexts(
    program: &Program,
    uses: &BTreeMap<FunctionId, Uses>,
    info: &CaptureInfo,
    order: &[FunctionId],
) -> CompileResult<BTreeMap<FunctionId, BTreeSet<ScopeId>>> {
    let mut needed: BTreeMap<FunctionId, BTreeSet<ScopeId>> = BTreeMap::new();

    for function in order {
        let mut scopes = BTreeSet::new();
        let u = &uses[function];

        for defn in &u.vars {
            let home = program.defn(*defn).scope;
            let Some(owner) = program.scope_function(home) else {
                continue;
            };
            if owner == *function {
                continue;
            }
            if !is_ancestor(&info.parents, owner, *function) {
                return Err(CompileError::UnresolvedDefinition {
                    function: program.function(*function).name.clone(),
                    name: program.defn(*defn).name.clone(),
                });
            }
            scopes.insert(home);
        }

        for nested in u.functions.iter().chain(u.values.iter()) {
            if !info.closures.contains(nested) {
                continue;
            }
            let (Some(parent), Some(home)) =
                (info.parents.get(nested), program.declaring_scope(*nested))
            else {
                continue;
            };
            if parent == function {
                continue;
            }
            if !is_ancestor(&info.parents, *parent, *function) {
                return Err(CompileError::UnresolvedDefinition {
                    function: program.function(*function).name.clone(),
                    name: program.function(*nested).name.clone(),
                });
            }
            scopes.insert(home);
        }

        for (child, parent) in &info.parents {
            if parent != function {
                continue;
            }
            if let Some(child_needs) = needed.get(child) {
                scopes.extend(
                    child_needs
                        .iter()
                        .copied()
                        .filter(|s| program.scope_function(*s) != Some(*function)),
                );
            }
        }

        needed.insert(*function, scopes);
    }

    Ok(needed)
}

fn depth(parents: &FxHashMap<FunctionId, FunctionId>, function: FunctionId) -> usize {
    let mut depth = 0;
    let mut current = function;
    while let Some(parent) = parents.get(&current) {
        depth += 1;
        current = *parent;
    }
    depth
}

fn is_ancestor(
    parents: &FxHashMap<FunctionId, FunctionId>,
    ancestor: FunctionId,
    function: FunctionId,
) -> bool {
    let mut current = function;
    while let Some(parent) = parents.get(&current) {
        if *parent == ancestor {
            return true;
        }
        current = *parent;
    }
    false
}
