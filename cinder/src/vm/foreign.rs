//! Foreign function registry

use crate::value::{Heap, Value};
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Host handler callable from scripts by name
pub type ForeignFn = Rc<dyn Fn(&mut CallContext<'_>, &[Value]) -> Value>;

/// What a foreign handler may touch while it runs
pub struct CallContext<'a> {
    heap: &'a Heap,
    input_requested: bool,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(heap: &'a Heap) -> Self {
        CallContext {
            heap,
            input_requested: false,
        }
    }

    /// Allocator for any lists or maps the handler returns
    pub fn heap(&self) -> &Heap {
        self.heap
    }

    /// Suspend after this call until the host supplies a value with
    /// `resume_with_input`; the handler's own return value is a placeholder
    pub fn request_input(&mut self) {
        self.input_requested = true;
    }

    pub fn input_requested(&self) -> bool {
        self.input_requested
    }
}

/// Name to handler table, in registration order
#[derive(Default, Clone)]
pub struct ForeignRegistry {
    handlers: IndexMap<String, ForeignFn>,
}

impl ForeignRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a handler
    pub fn register(&mut self, name: impl Into<String>, handler: ForeignFn) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<ForeignFn> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, for the compiler's call resolution
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl fmt::Debug for ForeignRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Number;

    #[test]
    fn test_register_and_call() {
        let mut registry = ForeignRegistry::new();
        registry.register("double", Rc::new(|_: &mut CallContext<'_>, args: &[Value]| {
            match args.first() {
                Some(Value::Number(n)) => Value::Number(Number::from_i64(n.kind(), n.as_i64() * 2)),
                _ => Value::Nil,
            }
        }));
        let heap = Heap::new();
        let mut ctx = CallContext::new(&heap);
        let handler = registry.get("double").unwrap();
        assert_eq!(handler(&mut ctx, &[Value::int(21)]), Value::int(42));
        assert!(!ctx.input_requested());
        assert_eq!(registry.names(), vec!["double".to_string()]);
    }

    #[test]
    fn test_request_input_flag() {
        let heap = Heap::new();
        let mut ctx = CallContext::new(&heap);
        ctx.request_input();
        assert!(ctx.input_requested());
    }
}
