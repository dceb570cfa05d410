//! Iteration protocol

use super::{ArithOp, ListObj, Number, Value};
use serde::Serialize;
use std::cmp::Ordering;
use std::rc::Rc;

/// Half-open numeric range `start..end` walked by `step`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeValue {
    pub start: Number,
    pub end: Number,
    pub step: Number,
}

impl RangeValue {
    /// A zero step is coerced to one
    pub fn new(start: Number, end: Number, step: Number) -> Self {
        let step = if step.is_zero() {
            Number::from_i64(step.kind(), 1)
        } else {
            step
        };
        Self { start, end, step }
    }

    pub fn ascending(&self) -> bool {
        self.step.as_f64() > 0.0
    }

    fn in_bounds(&self, n: &Number) -> bool {
        let target = if self.ascending() {
            Ordering::Less
        } else {
            Ordering::Greater
        };
        n.compare(&self.end) == Some(target)
    }
}

/// Lazy iterator handed out by [`Value::iter`]
#[derive(Debug)]
pub enum ValueIter {
    /// Reads the live list, so pushes during iteration are observed
    List { list: Rc<ListObj>, index: usize },
    Tuple { items: Rc<[Value]>, index: usize },
    Chars { text: Rc<str>, offset: usize },
    /// Keys are snapshotted at creation
    Keys { keys: Vec<String>, index: usize },
    Range { range: RangeValue, next: Option<Number> },
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::List { list, index } => {
                let item = list.items.borrow().get(*index).cloned()?;
                *index += 1;
                Some(item)
            }
            ValueIter::Tuple { items, index } => {
                let item = items.get(*index).cloned()?;
                *index += 1;
                Some(item)
            }
            ValueIter::Chars { text, offset } => {
                let c = text.get(*offset..)?.chars().next()?;
                *offset += c.len_utf8();
                Some(Value::str(c.to_string()))
            }
            ValueIter::Keys { keys, index } => {
                let key = keys.get(*index)?;
                *index += 1;
                Some(Value::str(key))
            }
            ValueIter::Range { range, next } => {
                let current = (*next)?;
                if !range.in_bounds(&current) {
                    *next = None;
                    return None;
                }
                let following = current.arith(ArithOp::Add, range.step).ok();
                // Stop once the width wraps around instead of looping forever
                let advanced = if range.ascending() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                *next = following.filter(|f| f.compare(&current) == Some(advanced));
                Some(Value::Number(current))
            }
        }
    }
}

impl Value {
    /// Start iterating; non-iterable values yield an Error value
    pub fn iter(&self) -> Result<ValueIter, Value> {
        match self {
            Value::List(list) => Ok(ValueIter::List {
                list: Rc::clone(list),
                index: 0,
            }),
            Value::Tuple(items) => Ok(ValueIter::Tuple {
                items: Rc::clone(items),
                index: 0,
            }),
            Value::Str(text) => Ok(ValueIter::Chars {
                text: Rc::clone(text),
                offset: 0,
            }),
            Value::Map(map) => Ok(ValueIter::Keys {
                keys: map.entries.borrow().keys().cloned().collect(),
                index: 0,
            }),
            Value::Range(range) => Ok(ValueIter::Range {
                range: *range,
                next: Some(range.start),
            }),
            Value::Error(_) => Err(self.clone()),
            other => Err(Value::error(format!("{} is not iterable", other.type_name()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Heap;
    use indexmap::IndexMap;

    fn range(start: i32, end: i32, step: i32) -> Value {
        Value::Range(RangeValue::new(
            Number::I32(start),
            Number::I32(end),
            Number::I32(step),
        ))
    }

    fn ints(v: &Value) -> Vec<i64> {
        v.iter()
            .unwrap()
            .map(|x| x.as_number().unwrap().as_i64())
            .collect()
    }

    #[test]
    fn test_range_ascending() {
        assert_eq!(ints(&range(1, 5, 1)), vec![1, 2, 3, 4]);
        assert_eq!(ints(&range(0, 10, 3)), vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_range_descending() {
        assert_eq!(ints(&range(5, 1, -1)), vec![5, 4, 3, 2]);
    }

    #[test]
    fn test_range_zero_step_is_one() {
        assert_eq!(ints(&range(0, 3, 0)), vec![0, 1, 2]);
    }

    #[test]
    fn test_range_empty_when_direction_mismatches() {
        assert!(ints(&range(5, 1, 1)).is_empty());
        assert!(ints(&range(1, 5, -1)).is_empty());
    }

    #[test]
    fn test_range_stops_on_wraparound() {
        let r = Value::Range(RangeValue::new(
            Number::U8(250),
            Number::I32(300),
            Number::I32(5),
        ));
        assert_eq!(ints(&r), vec![250, 255]);
    }

    #[test]
    fn test_list_iteration_is_live() {
        let heap = Heap::new();
        let list = heap.new_list(vec![Value::int(1)]);
        let mut it = list.iter().unwrap();
        assert_eq!(it.next(), Some(Value::int(1)));
        let Value::List(obj) = &list else { unreachable!() };
        obj.items.borrow_mut().push(Value::int(2));
        assert_eq!(it.next(), Some(Value::int(2)));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn test_string_iterates_code_points() {
        let chars: Vec<_> = Value::str("aé").iter().unwrap().collect();
        assert_eq!(chars, vec![Value::str("a"), Value::str("é")]);
    }

    #[test]
    fn test_map_keys_snapshot() {
        let heap = Heap::new();
        let mut entries = IndexMap::new();
        entries.insert("b".to_string(), Value::int(1));
        entries.insert("a".to_string(), Value::int(2));
        let map = heap.new_map(entries);
        let mut it = map.iter().unwrap();
        let Value::Map(obj) = &map else { unreachable!() };
        obj.entries.borrow_mut().insert("c".to_string(), Value::Nil);
        assert_eq!(it.next(), Some(Value::str("b")));
        assert_eq!(it.next(), Some(Value::str("a")));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn test_not_iterable() {
        let err = Value::int(3).iter().unwrap_err();
        assert_eq!(err.as_error().unwrap().message, "number is not iterable");
        let e = Value::error("boom");
        assert!(e.iter().unwrap_err().equals(&e));
    }
}
