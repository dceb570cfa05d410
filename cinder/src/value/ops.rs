//! Binary and unary operators over values

use super::{ArithOp, BitOp, Value};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Pow => "**",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Rem,
            "**" => BinOp::Pow,
            "&" => BinOp::BitAnd,
            "|" => BinOp::BitOr,
            "^" => BinOp::BitXor,
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "and" => BinOp::And,
            "or" => BinOp::Or,
            _ => return None,
        })
    }

    fn arith(self) -> Option<ArithOp> {
        Some(match self {
            BinOp::Add => ArithOp::Add,
            BinOp::Sub => ArithOp::Sub,
            BinOp::Mul => ArithOp::Mul,
            BinOp::Div => ArithOp::Div,
            BinOp::Rem => ArithOp::Rem,
            BinOp::Pow => ArithOp::Pow,
            _ => return None,
        })
    }

    fn bitwise(self) -> Option<BitOp> {
        Some(match self {
            BinOp::BitAnd => BitOp::And,
            BinOp::BitOr => BitOp::Or,
            BinOp::BitXor => BitOp::Xor,
            BinOp::Shl => BitOp::Shl,
            BinOp::Shr => BitOp::Shr,
            _ => return None,
        })
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "not",
            UnOp::BitNot => "~",
        }
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

fn unsupported(op: &str, lhs: &Value, rhs: &Value) -> Value {
    Value::error(format!(
        "unsupported operand types for {op}: {} and {}",
        lhs.type_name(),
        rhs.type_name()
    ))
}

impl Value {
    pub fn binary(&self, op: BinOp, rhs: &Value) -> Value {
        // Errors never compare equal to anything but themselves
        match op {
            BinOp::Eq => return Value::Bool(self.equals(rhs)),
            BinOp::Ne => return Value::Bool(!self.equals(rhs)),
            _ => {}
        }
        if self.is_error() {
            return self.clone();
        }
        if rhs.is_error() {
            return rhs.clone();
        }

        match op {
            BinOp::And => return Value::Bool(self.is_truthy() && rhs.is_truthy()),
            BinOp::Or => return Value::Bool(self.is_truthy() || rhs.is_truthy()),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => return self.ordering(op, rhs),
            _ => {}
        }

        if let (BinOp::Add, Value::Str(s)) = (op, self) {
            return Value::str(format!("{s}{rhs}"));
        }

        let (Value::Number(a), Value::Number(b)) = (self, rhs) else {
            return unsupported(op.symbol(), self, rhs);
        };
        let result = match (op.arith(), op.bitwise()) {
            (Some(arith), _) => a.arith(arith, *b),
            (_, Some(bit)) => a.bitwise(bit, *b),
            _ => return unsupported(op.symbol(), self, rhs),
        };
        match result {
            Ok(n) => Value::Number(n),
            Err(e) => Value::error(e.to_string()),
        }
    }

    fn ordering(&self, op: BinOp, rhs: &Value) -> Value {
        let ordering = match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => a.compare(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => return unsupported(op.symbol(), self, rhs),
        };
        let Some(ordering) = ordering else {
            // NaN is unordered
            return Value::Bool(false);
        };
        Value::Bool(match op {
            BinOp::Lt => ordering == Ordering::Less,
            BinOp::Le => ordering != Ordering::Greater,
            BinOp::Gt => ordering == Ordering::Greater,
            _ => ordering != Ordering::Less,
        })
    }

    pub fn unary(&self, op: UnOp) -> Value {
        if self.is_error() {
            return self.clone();
        }
        match (op, self) {
            (UnOp::Not, v) => Value::Bool(!v.is_truthy()),
            (UnOp::Neg, Value::Number(n)) => Value::Number(n.neg()),
            (UnOp::BitNot, Value::Number(n)) => match n.bit_not() {
                Ok(n) => Value::Number(n),
                Err(e) => Value::error(e.to_string()),
            },
            (op, v) => Value::error(format!(
                "unsupported operand type for {}: {}",
                op.symbol(),
                v.type_name()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Heap, Number};

    fn msg(v: &Value) -> &str {
        &v.as_error().expect("expected an error").message
    }

    #[test]
    fn test_add_keeps_left_width() {
        let r = Value::Number(Number::U8(250)).binary(BinOp::Add, &Value::int(10));
        assert!(matches!(r, Value::Number(Number::U8(4))));
    }

    #[test]
    fn test_division_by_zero_is_error() {
        let r = Value::int(1).binary(BinOp::Div, &Value::int(0));
        assert_eq!(msg(&r), "division by zero");
        let r = Value::float(1.0).binary(BinOp::Rem, &Value::float(0.0));
        assert_eq!(msg(&r), "division by zero");
    }

    #[test]
    fn test_string_concatenation() {
        let r = Value::str("n=").binary(BinOp::Add, &Value::int(3));
        assert_eq!(r, Value::str("n=3"));
        let r = Value::int(3).binary(BinOp::Add, &Value::str("x"));
        assert!(r.is_error());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(Value::int(1).binary(BinOp::Lt, &Value::float(1.5)), Value::Bool(true));
        assert_eq!(Value::int(2).binary(BinOp::Ge, &Value::int(2)), Value::Bool(true));
        assert_eq!(Value::str("a").binary(BinOp::Lt, &Value::str("b")), Value::Bool(true));
        assert_eq!(Value::int(1).binary(BinOp::Eq, &Value::float(1.0)), Value::Bool(true));
        assert_eq!(
            Value::float(f64::NAN).binary(BinOp::Lt, &Value::int(1)),
            Value::Bool(false)
        );
        assert!(Value::Nil.binary(BinOp::Lt, &Value::int(1)).is_error());
    }

    #[test]
    fn test_error_absorption() {
        let e = Value::error("boom");
        for op in [BinOp::Add, BinOp::Mul, BinOp::Shl, BinOp::Lt, BinOp::And] {
            assert!(e.binary(op, &Value::int(1)).equals(&e));
            assert!(Value::int(1).binary(op, &e).equals(&e));
        }
        assert!(e.unary(UnOp::Neg).equals(&e));
        assert!(e.unary(UnOp::Not).equals(&e));
    }

    #[test]
    fn test_left_error_wins() {
        let left = Value::error("left");
        let right = Value::error("right");
        assert!(left.binary(BinOp::Sub, &right).equals(&left));
    }

    #[test]
    fn test_error_equality() {
        let e = Value::error("boom");
        let v = Value::int(1);
        assert_eq!(e.binary(BinOp::Eq, &v), Value::Bool(false));
        assert_eq!(e.binary(BinOp::Ne, &v), Value::Bool(true));
        assert_eq!(e.binary(BinOp::Eq, &e), Value::Bool(true));
    }

    #[test]
    fn test_logical_ops() {
        assert_eq!(Value::int(0).binary(BinOp::And, &Value::Nil), Value::Bool(false));
        assert_eq!(Value::Nil.binary(BinOp::Or, &Value::str("")), Value::Bool(true));
        assert_eq!(Value::Nil.unary(UnOp::Not), Value::Bool(true));
    }

    #[test]
    fn test_bitwise_on_float_is_error() {
        let r = Value::float(1.0).binary(BinOp::BitAnd, &Value::int(1));
        assert_eq!(msg(&r), "bitwise operation requires integer operands");
        assert!(Value::float(1.0).unary(UnOp::BitNot).is_error());
    }

    #[test]
    fn test_structural_equality() {
        let heap = Heap::new();
        let a = heap.new_list(vec![Value::int(1), Value::str("x")]);
        let b = heap.new_list(vec![Value::int(1), Value::str("x")]);
        assert_eq!(a.binary(BinOp::Eq, &b), Value::Bool(true));
        let t = Value::tuple(vec![Value::int(1)]);
        assert_eq!(t.binary(BinOp::Ne, &Value::tuple(vec![Value::int(2)])), Value::Bool(true));
    }

    #[test]
    fn test_unsupported_message() {
        let r = Value::Nil.binary(BinOp::Mul, &Value::Bool(true));
        assert_eq!(msg(&r), "unsupported operand types for *: nil and bool");
        let r = Value::str("x").unary(UnOp::Neg);
        assert_eq!(msg(&r), "unsupported operand type for -: string");
    }

    #[test]
    fn test_binop_symbols_round_trip() {
        assert_eq!(BinOp::from_symbol("**"), Some(BinOp::Pow));
        assert_eq!(BinOp::from_symbol("and"), Some(BinOp::And));
        assert_eq!(BinOp::from_symbol("=>"), None);
    }
}
