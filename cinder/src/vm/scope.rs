//! Runtime scope chain for variable bindings

use crate::syntax::Span;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared reference to a scope; closures hold these
pub type ScopeRef = Rc<RefCell<Scope>>;

/// One level of bindings plus where each was last written
#[derive(Debug, Default)]
pub struct Scope {
    values: IndexMap<String, Value>,
    /// Span of the instruction that last defined or assigned each name
    definitions: IndexMap<String, Span>,
    parent: Option<ScopeRef>,
}

impl Scope {
    /// Create a root scope
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: ScopeRef) -> Self {
        Scope {
            parent: Some(parent),
            ..Self::default()
        }
    }

    pub fn into_ref(self) -> ScopeRef {
        Rc::new(RefCell::new(self))
    }

    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    /// Bind in this scope, replacing any earlier binding of the name
    pub fn define(&mut self, name: &str, value: Value, span: Span) {
        self.values.insert(name.to_string(), value);
        self.definitions.insert(name.to_string(), span);
    }

    /// Look up a name in the scope chain
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match self.values.get(name) {
            Some(value) => Some(value.clone()),
            None => self.parent.as_ref()?.borrow().lookup(name),
        }
    }

    /// Rebind the nearest existing binding; false if the name is unbound
    pub fn assign(&mut self, name: &str, value: Value, span: Span) -> bool {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            self.definitions.insert(name.to_string(), span);
            return true;
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value, span),
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.borrow().contains(name))
    }

    /// Span of the last write to the nearest binding of `name`
    pub fn definition(&self, name: &str) -> Option<Span> {
        match self.definitions.get(name) {
            Some(span) => Some(*span),
            None => self.parent.as_ref()?.borrow().definition(name),
        }
    }

    /// Names bound directly in this scope, in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Bindings of this scope, in definition order
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Create a child scope from a parent reference
pub fn child_scope(parent: &ScopeRef) -> ScopeRef {
    Scope::with_parent(Rc::clone(parent)).into_ref()
}

/// Every binding visible from `scope`, innermost first, shadowed names skipped
pub fn visible_bindings(scope: &ScopeRef) -> Vec<(String, Value, Option<Span>)> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut current = Some(Rc::clone(scope));
    while let Some(level) = current {
        let level = level.borrow();
        for (name, value) in level.bindings() {
            if seen.insert(name.to_string()) {
                out.push((name.to_string(), value.clone(), level.definitions.get(name).copied()));
            }
        }
        current = level.parent.clone();
    }
    out
}
