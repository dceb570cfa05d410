//! Indexing, member access and the built-in method properties

use super::{Heap, ListObj, MapObj, NativeMethod, Value};
use std::rc::Rc;

/// Host function behind a method property: `(heap, receiver, args)`
pub type NativeFn = fn(&Heap, &Value, &[Value]) -> Value;

type MethodTable = &'static [(&'static str, NativeFn)];

const STRING_METHODS: MethodTable = &[
    ("len", str_len),
    ("upper", str_upper),
    ("lower", str_lower),
    ("split", str_split),
    ("has", str_has),
];

const LIST_METHODS: MethodTable = &[
    ("push", list_push),
    ("pop", list_pop),
    ("insert", list_insert),
    ("remove", list_remove),
    ("delete", list_delete),
    ("contains", list_contains),
    ("index_of", list_index_of),
    ("clear", list_clear),
    ("join", list_join),
    ("len", list_len),
];

const TUPLE_METHODS: MethodTable = &[("len", tuple_len)];

const MAP_METHODS: MethodTable = &[
    ("keys", map_keys),
    ("values", map_values),
    ("contains", map_contains),
    ("delete", map_delete),
    ("clear", map_clear),
    ("len", map_len),
];

/// Resolve a 1-based index against a sequence of `len` elements
fn resolve_index(key: &Value, len: usize) -> Result<usize, Value> {
    let Value::Number(n) = key else {
        return Err(Value::error(format!(
            "index must be a number, got {}",
            key.type_name()
        )));
    };
    let Some(i) = n.as_index() else {
        return Err(Value::error(format!("index must be an integer, got {n}")));
    };
    if i < 1 || i as u64 > len as u64 {
        return Err(Value::error(format!("index {i} out of range")));
    }
    Ok(i as usize - 1)
}

fn count(n: usize) -> Value {
    Value::int(n as i32)
}

impl Value {
    fn method_table(&self) -> MethodTable {
        match self {
            Value::Str(_) => STRING_METHODS,
            Value::List(_) => LIST_METHODS,
            Value::Tuple(_) => TUPLE_METHODS,
            Value::Map(_) => MAP_METHODS,
            _ => &[],
        }
    }

    /// Bind the method property `name` to this receiver
    pub fn method(&self, name: &str) -> Option<Value> {
        let &(name, func) = self.method_table().iter().find(|(n, _)| *n == name)?;
        Some(Value::NativeMethod(Rc::new(NativeMethod {
            name,
            receiver: self.clone(),
            func,
        })))
    }

    /// Index or key lookup; string keys on sequences resolve method properties
    pub fn get(&self, key: &Value) -> Value {
        if self.is_error() {
            return self.clone();
        }
        if key.is_error() {
            return key.clone();
        }
        match self {
            Value::Map(map) => {
                let key_text = key.to_string();
                if let Some(v) = map.entries.borrow().get(&key_text) {
                    return v.clone();
                }
                if let Value::Str(name) = key
                    && let Some(method) = self.method(name)
                {
                    return method;
                }
                Value::error(format!("key not found: {key_text}"))
            }
            Value::List(_) | Value::Tuple(_) | Value::Str(_) => {
                if let Value::Str(name) = key {
                    return self.method(name).unwrap_or_else(|| {
                        Value::error(format!("{} has no property '{name}'", self.type_name()))
                    });
                }
                self.get_index(key)
            }
            _ => Value::error(format!("cannot index into {}", self.type_name())),
        }
    }

    fn get_index(&self, key: &Value) -> Value {
        let result = match self {
            Value::List(list) => {
                let items = list.items.borrow();
                resolve_index(key, items.len()).map(|i| items[i].clone())
            }
            Value::Tuple(items) => resolve_index(key, items.len()).map(|i| items[i].clone()),
            Value::Str(s) => {
                let len = s.chars().count();
                resolve_index(key, len).map(|i| {
                    s.chars()
                        .nth(i)
                        .map_or(Value::Nil, |c| Value::str(c.to_string()))
                })
            }
            _ => Ok(Value::error(format!("cannot index into {}", self.type_name()))),
        };
        result.unwrap_or_else(|e| e)
    }

    /// Dotted member access
    pub fn get_member(&self, name: &str) -> Value {
        self.get(&Value::str(name))
    }

    /// Store a duplicate of `value` under `key`; returns the stored value
    pub fn set(&self, key: &Value, value: &Value, heap: &Heap) -> Value {
        if self.is_error() {
            return self.clone();
        }
        if key.is_error() {
            return key.clone();
        }
        if value.is_error() {
            return value.clone();
        }
        match self {
            Value::List(list) => {
                let len = list.items.borrow().len();
                match resolve_index(key, len) {
                    Ok(i) => {
                        let stored = value.duplicate(heap);
                        list.items.borrow_mut()[i] = stored.clone();
                        stored
                    }
                    Err(e) => e,
                }
            }
            Value::Map(map) => {
                let key = key.to_string();
                let stored = value.duplicate(heap);
                map.entries.borrow_mut().insert(key, stored.clone());
                stored
            }
            Value::Tuple(_) | Value::Str(_) => {
                Value::error(format!("{} is immutable", self.type_name()))
            }
            _ => Value::error(format!("cannot assign into {}", self.type_name())),
        }
    }

    pub fn set_member(&self, name: &str, value: &Value, heap: &Heap) -> Value {
        self.set(&Value::str(name), value, heap)
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Nil)
}

fn str_arg(args: &[Value], i: usize, method: &str) -> Result<Rc<str>, Value> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(Rc::clone(s)),
        Some(other) => Err(Value::error(format!(
            "{method} expects a string argument, got {}",
            other.type_name()
        ))),
        None => Err(Value::error(format!("{method} expects a string argument"))),
    }
}

fn receiver_list(receiver: &Value) -> Option<&Rc<ListObj>> {
    match receiver {
        Value::List(list) => Some(list),
        _ => None,
    }
}

fn receiver_map(receiver: &Value) -> Option<&Rc<MapObj>> {
    match receiver {
        Value::Map(map) => Some(map),
        _ => None,
    }
}

fn receiver_str(receiver: &Value) -> Option<&Rc<str>> {
    match receiver {
        Value::Str(s) => Some(s),
        _ => None,
    }
}

fn wrong_receiver(receiver: &Value) -> Value {
    Value::error(format!("method called on {}", receiver.type_name()))
}

// String

fn str_len(_: &Heap, recv: &Value, _: &[Value]) -> Value {
    receiver_str(recv).map_or_else(|| wrong_receiver(recv), |s| count(s.chars().count()))
}

fn str_upper(_: &Heap, recv: &Value, _: &[Value]) -> Value {
    receiver_str(recv).map_or_else(|| wrong_receiver(recv), |s| Value::str(s.to_uppercase()))
}

fn str_lower(_: &Heap, recv: &Value, _: &[Value]) -> Value {
    receiver_str(recv).map_or_else(|| wrong_receiver(recv), |s| Value::str(s.to_lowercase()))
}

fn str_split(heap: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(s) = receiver_str(recv) else {
        return wrong_receiver(recv);
    };
    let sep = match str_arg(args, 0, "split") {
        Ok(sep) => sep,
        Err(e) => return e,
    };
    let parts = if sep.is_empty() {
        s.chars().map(|c| Value::str(c.to_string())).collect()
    } else {
        s.split(&*sep).map(Value::str).collect()
    };
    heap.new_list(parts)
}

fn str_has(_: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(s) = receiver_str(recv) else {
        return wrong_receiver(recv);
    };
    match str_arg(args, 0, "has") {
        Ok(sub) => Value::Bool(s.contains(&*sub)),
        Err(e) => e,
    }
}

// List

fn list_push(heap: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(list) = receiver_list(recv) else {
        return wrong_receiver(recv);
    };
    let item = arg(args, 0).duplicate(heap);
    list.items.borrow_mut().push(item);
    Value::Nil
}

fn list_pop(_: &Heap, recv: &Value, _: &[Value]) -> Value {
    let Some(list) = receiver_list(recv) else {
        return wrong_receiver(recv);
    };
    list.items
        .borrow_mut()
        .pop()
        .unwrap_or_else(|| Value::error("pop from empty list"))
}

fn list_insert(heap: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(list) = receiver_list(recv) else {
        return wrong_receiver(recv);
    };
    let len = list.items.borrow().len();
    // Position len + 1 appends
    match resolve_index(&arg(args, 0), len + 1) {
        Ok(i) => {
            let item = arg(args, 1).duplicate(heap);
            list.items.borrow_mut().insert(i, item);
            Value::Nil
        }
        Err(e) => e,
    }
}

fn list_remove(_: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(list) = receiver_list(recv) else {
        return wrong_receiver(recv);
    };
    let needle = arg(args, 0);
    // Comparing may borrow this list again, so search before mutating
    let position = list.items.borrow().iter().position(|v| v.equals(&needle));
    match position {
        Some(i) => {
            list.items.borrow_mut().remove(i);
            Value::Bool(true)
        }
        None => Value::Bool(false),
    }
}

fn list_delete(_: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(list) = receiver_list(recv) else {
        return wrong_receiver(recv);
    };
    let len = list.items.borrow().len();
    match resolve_index(&arg(args, 0), len) {
        Ok(i) => list.items.borrow_mut().remove(i),
        Err(e) => e,
    }
}

fn list_contains(_: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(list) = receiver_list(recv) else {
        return wrong_receiver(recv);
    };
    let needle = arg(args, 0);
    Value::Bool(list.items.borrow().iter().any(|v| v.equals(&needle)))
}

fn list_index_of(_: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(list) = receiver_list(recv) else {
        return wrong_receiver(recv);
    };
    let needle = arg(args, 0);
    list.items
        .borrow()
        .iter()
        .position(|v| v.equals(&needle))
        .map_or(Value::Nil, |i| count(i + 1))
}

fn list_clear(_: &Heap, recv: &Value, _: &[Value]) -> Value {
    let Some(list) = receiver_list(recv) else {
        return wrong_receiver(recv);
    };
    list.items.borrow_mut().clear();
    Value::Nil
}

fn list_join(_: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(list) = receiver_list(recv) else {
        return wrong_receiver(recv);
    };
    let sep = match args.first() {
        None | Some(Value::Nil) => Rc::from(""),
        Some(_) => match str_arg(args, 0, "join") {
            Ok(sep) => sep,
            Err(e) => return e,
        },
    };
    let parts: Vec<String> = list.items.borrow().iter().map(|v| v.to_string()).collect();
    Value::str(parts.join(&*sep))
}

fn list_len(_: &Heap, recv: &Value, _: &[Value]) -> Value {
    receiver_list(recv).map_or_else(|| wrong_receiver(recv), |l| count(l.items.borrow().len()))
}

// Tuple

fn tuple_len(_: &Heap, recv: &Value, _: &[Value]) -> Value {
    match recv {
        Value::Tuple(items) => count(items.len()),
        other => wrong_receiver(other),
    }
}

// Map

fn map_keys(heap: &Heap, recv: &Value, _: &[Value]) -> Value {
    let Some(map) = receiver_map(recv) else {
        return wrong_receiver(recv);
    };
    let keys = map.entries.borrow().keys().map(Value::str).collect();
    heap.new_list(keys)
}

fn map_values(heap: &Heap, recv: &Value, _: &[Value]) -> Value {
    let Some(map) = receiver_map(recv) else {
        return wrong_receiver(recv);
    };
    let values = map
        .entries
        .borrow()
        .values()
        .map(|v| v.duplicate(heap))
        .collect();
    heap.new_list(values)
}

fn map_contains(_: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(map) = receiver_map(recv) else {
        return wrong_receiver(recv);
    };
    let key = arg(args, 0).to_string();
    Value::Bool(map.entries.borrow().contains_key(&key))
}

fn map_delete(_: &Heap, recv: &Value, args: &[Value]) -> Value {
    let Some(map) = receiver_map(recv) else {
        return wrong_receiver(recv);
    };
    let key = arg(args, 0).to_string();
    map.entries
        .borrow_mut()
        .shift_remove(&key)
        .unwrap_or_else(|| Value::error(format!("key not found: {key}")))
}

fn map_clear(_: &Heap, recv: &Value, _: &[Value]) -> Value {
    let Some(map) = receiver_map(recv) else {
        return wrong_receiver(recv);
    };
    map.entries.borrow_mut().clear();
    Value::Nil
}

fn map_len(_: &Heap, recv: &Value, _: &[Value]) -> Value {
    receiver_map(recv).map_or_else(|| wrong_receiver(recv), |m| count(m.entries.borrow().len()))
}
