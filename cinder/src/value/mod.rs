//! Runtime values
//!
//! `Value` is a closed sum type. Every operation is total: a mismatch yields
//! `Value::Error` instead of panicking, and an Error receiver absorbs the
//! operation by returning itself.

mod iter;
mod methods;
mod number;
mod ops;

pub use iter::{RangeValue, ValueIter};
pub use methods::NativeFn;
pub use number::{ArithOp, BitOp, NumError, NumKind, Number};
pub use ops::{BinOp, UnOp};

use crate::syntax::Span;
use crate::vm::ScopeRef;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Mutable ordered sequence with an identity tag
#[derive(Debug)]
pub struct ListObj {
    pub addr: u64,
    pub items: RefCell<Vec<Value>>,
}

/// Mutable string-keyed map with an identity tag; iterates in insertion order
#[derive(Debug)]
pub struct MapObj {
    pub addr: u64,
    pub entries: RefCell<IndexMap<String, Value>>,
}

/// Function value: entry address plus the scope it was created in
pub struct Closure {
    pub entry: usize,
    pub arity: usize,
    pub scope: ScopeRef,
    pub name: Option<String>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The captured scope may transitively hold this closure
        f.debug_struct("Closure")
            .field("entry", &self.entry)
            .field("arity", &self.arity)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Host callable bound to its receiver
#[derive(Debug)]
pub struct NativeMethod {
    pub name: &'static str,
    pub receiver: Value,
    pub func: NativeFn,
}

impl NativeMethod {
    pub fn call(&self, heap: &Heap, args: &[Value]) -> Value {
        (self.func)(heap, &self.receiver, args)
    }
}

/// Language-level error value
#[derive(Debug)]
pub struct ErrorValue {
    pub message: String,
    location: Cell<Option<Span>>,
}

impl ErrorValue {
    pub fn location(&self) -> Option<Span> {
        self.location.get()
    }

    /// Record where the error was first observed; later calls keep the first
    pub fn locate(&self, span: Span) {
        if self.location.get().is_none() {
            self.location.set(Some(span));
        }
    }
}

/// Mints identity tags for lists and maps.
///
/// Owned by one VM, so independent VMs number their containers independently.
#[derive(Debug, Default)]
pub struct Heap {
    next_addr: Cell<u64>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_addr(&self) -> u64 {
        let addr = self.next_addr.get() + 1;
        self.next_addr.set(addr);
        addr
    }

    pub fn new_list(&self, items: Vec<Value>) -> Value {
        Value::List(Rc::new(ListObj {
            addr: self.next_addr(),
            items: RefCell::new(items),
        }))
    }

    pub fn new_map(&self, entries: IndexMap<String, Value>) -> Value {
        Value::Map(Rc::new(MapObj {
            addr: self.next_addr(),
            entries: RefCell::new(entries),
        }))
    }

    /// Number of containers allocated so far
    pub fn allocated(&self) -> u64 {
        self.next_addr.get()
    }
}

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(Number),
    Str(Rc<str>),
    List(Rc<ListObj>),
    Tuple(Rc<[Value]>),
    Map(Rc<MapObj>),
    Range(RangeValue),
    Closure(Rc<Closure>),
    NativeMethod(Rc<NativeMethod>),
    Error(Rc<ErrorValue>),
}

impl Value {
    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::new(ErrorValue {
            message: message.into(),
            location: Cell::new(None),
        }))
    }

    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::from(items))
    }

    pub fn int(v: i32) -> Value {
        Value::Number(Number::I32(v))
    }

    pub fn float(v: f64) -> Value {
        Value::Number(Number::F64(v))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether the value is a container that `ref` may alias
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// Type name as reported by `typeof`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Range(_) => "range",
            Value::Closure(_) => "function",
            Value::NativeMethod(_) => "method",
            Value::Error(_) => "error",
        }
    }

    /// Identity tag of a list or map
    pub fn address(&self) -> Option<u64> {
        match self {
            Value::List(list) => Some(list.addr),
            Value::Map(map) => Some(map.addr),
            _ => None,
        }
    }

    /// Language-level clone: deep for lists and maps, sharing otherwise
    pub fn duplicate(&self, heap: &Heap) -> Value {
        match self {
            Value::List(list) => {
                let items = list.items.borrow().iter().map(|v| v.duplicate(heap)).collect();
                heap.new_list(items)
            }
            Value::Map(map) => {
                let entries = map
                    .entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.duplicate(heap)))
                    .collect();
                heap.new_map(entries)
            }
            Value::Tuple(items) if items.iter().any(|v| v.is_reference()) => {
                Value::tuple(items.iter().map(|v| v.duplicate(heap)).collect())
            }
            other => other.clone(),
        }
    }

    /// Per-variant equality; Errors compare by identity
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.items.borrow(), b.items.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.entries.borrow(), b.entries.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.equals(w)))
            }
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::NativeMethod(a), Value::NativeMethod(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// String conversion used inside containers: strings are quoted
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{s:?}"),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

fn write_seq<'a>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: impl Iterator<Item = &'a Value>,
    close: &str,
) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item.repr())?;
    }
    write!(f, "{close}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(list) => write_seq(f, "[", list.items.borrow().iter(), "]"),
            Value::Tuple(items) => write_seq(f, "(", items.iter(), ")"),
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {}", v.repr())?;
                }
                write!(f, "}}")
            }
            Value::Range(r) => write!(f, "range({}, {}, {})", r.start, r.end, r.step),
            Value::Closure(c) => match &c.name {
                Some(name) => write!(f, "<func {name}>"),
                None => write!(f, "<func>"),
            },
            Value::NativeMethod(m) => write!(f, "<method {}>", m.name),
            Value::Error(e) => write!(f, "error: {}", e.message),
        }
    }
}
