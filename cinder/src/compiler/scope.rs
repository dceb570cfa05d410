//! Compile-time name scopes
//!
//! Mirrors the runtime scope chain but only tracks which names exist, so the
//! compiler can flag redeclarations and undefined names before execution.

use indexmap::IndexSet;

/// Stack of name-presence sets in declaration order, index 0 is the program scope
#[derive(Debug)]
pub struct NameScopes {
    scopes: Vec<IndexSet<String>>,
}

impl NameScopes {
    pub fn new() -> Self {
        NameScopes {
            scopes: vec![IndexSet::new()],
        }
    }

    /// Program scope seeded with names that already exist at runtime
    pub fn with_known<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NameScopes {
            scopes: vec![known.into_iter().map(Into::into).collect()],
        }
    }

    pub fn enter(&mut self) {
        self.scopes.push(IndexSet::new());
    }

    /// Leave the innermost scope; the program scope is never popped
    pub fn exit(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare in the innermost scope; false if it was already declared there
    pub fn declare(&mut self, name: &str) -> bool {
        match self.scopes.last_mut() {
            Some(scope) => scope.insert(name.to_string()),
            None => false,
        }
    }

    pub fn declared_here(&self, name: &str) -> bool {
        self.scopes.last().is_some_and(|scope| scope.contains(name))
    }

    /// Whether the name resolves anywhere in the chain
    pub fn resolves(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    /// Every visible name, innermost scope first, each scope in declaration order
    pub fn visible(&self) -> impl Iterator<Item = &str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().map(String::as_str))
    }
}

impl Default for NameScopes {
    fn default() -> Self {
        Self::new()
    }
}
