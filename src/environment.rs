use indexmap::IndexMap;

use crate::{
    diagnostics::{Diagnostic, Location, RuntimeErrorKind},
    value::Value,
};

/// Handle to a scope record inside a [`ScopeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(u32);

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    bindings: IndexMap<String, Value>,
    /// Set once a closure captures this scope (or any descendant of it);
    /// captured scopes are never recycled.
    captured: bool,
}

/// Arena of lexical scopes. The parent chain is child-to-parent only, so it
/// can never form a cycle; the root scope has no parent. Scopes left without
/// a capturing closure are recycled through a free list on block/call exit.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    free: Vec<ScopeId>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the root scope of an environment tree.
    pub fn root(&mut self) -> ScopeId {
        self.alloc(None)
    }

    /// Allocates a child scope, as done on block entry and function call.
    pub fn push(&mut self, parent: ScopeId) -> ScopeId {
        self.alloc(Some(parent))
    }

    fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        if let Some(id) = self.free.pop() {
            let scope = &mut self.scopes[id.0 as usize];
            scope.parent = parent;
            scope.captured = false;
            return id;
        }
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            bindings: IndexMap::new(),
            captured: false,
        });
        id
    }

    /// Returns a scope to the free list unless a closure still needs it.
    pub fn release(&mut self, id: ScopeId) {
        let scope = &mut self.scopes[id.0 as usize];
        if scope.captured {
            return;
        }
        scope.bindings.clear();
        scope.parent = None;
        self.free.push(id);
    }

    /// Pins a scope and all of its ancestors; called when a closure value is
    /// created, so the defining chain outlives its lexical block.
    pub fn mark_captured(&mut self, id: ScopeId) {
        let mut next = Some(id);
        while let Some(id) = next {
            let scope = &mut self.scopes[id.0 as usize];
            if scope.captured {
                break;
            }
            scope.captured = true;
            next = scope.parent;
        }
    }

    /// `let` always defines in the given scope, shadowing outer bindings.
    pub fn define(&mut self, id: ScopeId, name: String, value: Value) {
        self.scopes[id.0 as usize].bindings.insert(name, value);
    }

    /// Walks the parent chain; `None` when the name is unbound everywhere.
    pub fn lookup(&self, id: ScopeId, name: &str) -> Option<Value> {
        let mut next = Some(id);
        while let Some(id) = next {
            let scope = &self.scopes[id.0 as usize];
            if let Some(value) = scope.bindings.get(name) {
                return Some(value.clone());
            }
            next = scope.parent;
        }
        None
    }

    pub fn get(&self, id: ScopeId, name: &str, loc: Location) -> Result<Value, Diagnostic> {
        self.lookup(id, name).ok_or_else(|| {
            Diagnostic::runtime(
                RuntimeErrorKind::UndefinedVariable,
                format!("undefined variable `{name}`"),
            )
            .with_location(loc)
        })
    }

    /// Assignment mutates the nearest existing binding; it never defines.
    pub fn assign(
        &mut self,
        id: ScopeId,
        name: &str,
        value: Value,
        loc: Location,
    ) -> Result<(), Diagnostic> {
        let mut next = Some(id);
        while let Some(id) = next {
            let scope = &mut self.scopes[id.0 as usize];
            if let Some(slot) = scope.bindings.get_mut(name) {
                *slot = value;
                return Ok(());
            }
            next = scope.parent;
        }
        Err(Diagnostic::runtime(
            RuntimeErrorKind::UndefinedVariable,
            format!("undefined variable `{name}`"),
        )
        .with_location(loc))
    }
}
