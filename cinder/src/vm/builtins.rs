//! Standard foreign functions
//!
//! Conversions, containers helpers and console I/O registered by the CLI and
//! REPL. Hosts embedding the VM may skip these and register their own.

use super::foreign::CallContext;
use super::machine::VirtualMachine;
use crate::value::{NumKind, Number, RangeValue, Value};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Where `print` and `input` prompts go
#[derive(Debug, Clone)]
pub enum OutputSink {
    Stdout,
    /// Collect lines in memory, for tests and embedding hosts
    Capture(Rc<RefCell<Vec<String>>>),
}

impl OutputSink {
    /// Fresh capture buffer plus the sink writing into it
    pub fn capture() -> (Self, Rc<RefCell<Vec<String>>>) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        (OutputSink::Capture(Rc::clone(&buffer)), buffer)
    }

    fn write_line(&self, line: String) {
        match self {
            OutputSink::Stdout => println!("{line}"),
            OutputSink::Capture(buffer) => buffer.borrow_mut().push(line),
        }
    }

    fn write_prompt(&self, prompt: String) {
        match self {
            OutputSink::Stdout => {
                print!("{prompt}");
                let _ = std::io::stdout().flush();
            }
            OutputSink::Capture(buffer) => buffer.borrow_mut().push(prompt),
        }
    }
}

const CONVERSIONS: &[(&str, NumKind)] = &[
    ("i8", NumKind::I8),
    ("u8", NumKind::U8),
    ("i16", NumKind::I16),
    ("u16", NumKind::U16),
    ("i32", NumKind::I32),
    ("u32", NumKind::U32),
    ("f32", NumKind::F32),
    ("f64", NumKind::F64),
    ("int", NumKind::I32),
    ("float", NumKind::F64),
];

/// Register every standard function on `vm`
pub fn install_standard_library(vm: &mut VirtualMachine, sink: OutputSink) {
    for &(name, kind) in CONVERSIONS {
        vm.register_foreign(name, move |_: &mut CallContext<'_>, args: &[Value]| {
            match args {
                [value] => convert(value, kind),
                _ => arity_error(name, 1, args.len()),
            }
        });
    }

    vm.register_foreign("clone", |ctx: &mut CallContext<'_>, args: &[Value]| match args {
        [value] => value.duplicate(ctx.heap()),
        _ => arity_error("clone", 1, args.len()),
    });
    vm.register_foreign("len", |_: &mut CallContext<'_>, args: &[Value]| match args {
        [value] => length(value),
        _ => arity_error("len", 1, args.len()),
    });
    vm.register_foreign("str", |_: &mut CallContext<'_>, args: &[Value]| match args {
        [value] => Value::str(value.to_string()),
        _ => arity_error("str", 1, args.len()),
    });
    vm.register_foreign("range", |_: &mut CallContext<'_>, args: &[Value]| range(args));
    vm.register_foreign("error", |_: &mut CallContext<'_>, args: &[Value]| match args {
        [message] => Value::error(message.to_string()),
        _ => arity_error("error", 1, args.len()),
    });

    let out = sink.clone();
    vm.register_foreign("print", move |_: &mut CallContext<'_>, args: &[Value]| {
        let line = args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        out.write_line(line);
        Value::Nil
    });
    vm.register_foreign("input", move |ctx: &mut CallContext<'_>, args: &[Value]| {
        if let Some(prompt) = args.first() {
            sink.write_prompt(prompt.to_string());
        }
        ctx.request_input();
        Value::Nil
    });
}

fn arity_error(name: &str, expected: usize, got: usize) -> Value {
    Value::error(format!("{name} expects {expected} argument(s), got {got}"))
}

fn convert(value: &Value, kind: NumKind) -> Value {
    match value {
        Value::Error(_) => value.clone(),
        Value::Number(n) => Value::Number(n.cast(kind)),
        Value::Bool(b) => Value::Number(Number::from_i64(kind, i64::from(*b))),
        Value::Str(s) => {
            let text = s.trim();
            if let Ok(i) = text.parse::<i64>() {
                Value::Number(Number::from_i64(kind, i))
            } else if let Ok(f) = text.parse::<f64>() {
                Value::Number(Number::from_f64(kind, f))
            } else {
                Value::error(format!("cannot convert {text:?} to {}", kind.name()))
            }
        }
        other => Value::error(format!("cannot convert {} to {}", other.type_name(), kind.name())),
    }
}

fn length(value: &Value) -> Value {
    let len = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(list) => list.items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Map(map) => map.entries.borrow().len(),
        Value::Error(_) => return value.clone(),
        other => return Value::error(format!("{} has no length", other.type_name())),
    };
    Value::Number(Number::from_i64(NumKind::I32, len as i64))
}

fn range(args: &[Value]) -> Value {
    let mut numbers = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Number(n) => numbers.push(*n),
            Value::Error(_) => return arg.clone(),
            other => {
                return Value::error(format!("range expects numbers, got {}", other.type_name()));
            }
        }
    }
    let (start, end, step) = match numbers.as_slice() {
        [end] => (Number::from_i64(end.kind(), 0), *end, None),
        [start, end] => (*start, *end, None),
        [start, end, step] => (*start, *end, Some(*step)),
        _ => {
            return Value::error(format!(
                "range expects 1 to 3 arguments, got {}",
                args.len()
            ));
        }
    };
    let step = step.unwrap_or_else(|| Number::from_i64(start.kind(), 1));
    Value::Range(RangeValue::new(start, end, step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Heap;
    use crate::vm::ForeignFn;

    fn call(vm: &VirtualMachine, name: &str, args: &[Value]) -> Value {
        let handler = vm_handler(vm, name);
        let heap = Heap::new();
        let mut ctx = CallContext::new(&heap);
        handler(&mut ctx, args)
    }

    fn vm_handler(vm: &VirtualMachine, name: &str) -> ForeignFn {
        vm.foreign_handler(name).unwrap()
    }

    fn vm_with_capture() -> (VirtualMachine, Rc<RefCell<Vec<String>>>) {
        let mut vm = VirtualMachine::new();
        let (sink, buffer) = OutputSink::capture();
        install_standard_library(&mut vm, sink);
        (vm, buffer)
    }

    #[test]
    fn test_registers_every_name() {
        let (vm, _) = vm_with_capture();
        let names = vm.foreign_names();
        for name in ["i8", "u32", "f64", "int", "float", "clone", "len", "str", "range", "print", "input", "error"] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }
    }

    #[test]
    fn test_conversions_wrap() {
        let (vm, _) = vm_with_capture();
        assert_eq!(call(&vm, "u8", &[Value::int(300)]), Value::Number(Number::U8(44)));
        assert_eq!(call(&vm, "i8", &[Value::int(200)]), Value::Number(Number::I8(-56)));
        assert_eq!(call(&vm, "int", &[Value::str(" 42 ")]), Value::int(42));
        assert_eq!(call(&vm, "float", &[Value::str("1.5")]), Value::float(1.5));
        assert!(call(&vm, "int", &[Value::str("abc")]).is_error());
        assert!(call(&vm, "int", &[]).is_error());
    }

    #[test]
    fn test_len_and_str() {
        let (vm, _) = vm_with_capture();
        assert_eq!(call(&vm, "len", &[Value::str("héllo")]), Value::int(5));
        assert_eq!(call(&vm, "str", &[Value::int(7)]), Value::str("7"));
        assert!(call(&vm, "len", &[Value::int(7)]).is_error());
    }

    #[test]
    fn test_range_forms() {
        let (vm, _) = vm_with_capture();
        let Value::Range(r) = call(&vm, "range", &[Value::int(3)]) else {
            panic!("expected range");
        };
        assert_eq!(r.start, Number::I32(0));
        assert_eq!(r.end, Number::I32(3));
        assert_eq!(r.step, Number::I32(1));

        let items: Vec<_> = call(&vm, "range", &[Value::int(5), Value::int(1), Value::int(-1)])
            .iter()
            .unwrap()
            .collect();
        assert_eq!(items, vec![Value::int(5), Value::int(4), Value::int(3), Value::int(2)]);
        assert!(call(&vm, "range", &[Value::str("x")]).is_error());
    }

    #[test]
    fn test_print_captures() {
        let (vm, buffer) = vm_with_capture();
        call(&vm, "print", &[Value::str("a"), Value::int(1)]);
        assert_eq!(*buffer.borrow(), vec!["a 1".to_string()]);
    }

    #[test]
    fn test_input_requests_suspension() {
        let (vm, buffer) = vm_with_capture();
        let handler = vm_handler(&vm, "input");
        let heap = Heap::new();
        let mut ctx = CallContext::new(&heap);
        handler(&mut ctx, &[Value::str("name? ")]);
        assert!(ctx.input_requested());
        assert_eq!(*buffer.borrow(), vec!["name? ".to_string()]);
    }

    #[test]
    fn test_error_builds_error_value() {
        let (vm, _) = vm_with_capture();
        let err = call(&vm, "error", &[Value::str("bad")]);
        assert_eq!(err.as_error().unwrap().message, "bad");
    }
}
