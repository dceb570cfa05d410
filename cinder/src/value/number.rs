//! Fixed-width numeric scalars
//!
//! Every arithmetic result is narrowed back to the left operand's width.
//! Integer kinds wrap with two's complement semantics.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Width tag of a [`Number`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl NumKind {
    pub fn is_integer(self) -> bool {
        !matches!(self, NumKind::F32 | NumKind::F64)
    }

    pub fn bits(self) -> u32 {
        match self {
            NumKind::I8 | NumKind::U8 => 8,
            NumKind::I16 | NumKind::U16 => 16,
            NumKind::I32 | NumKind::U32 | NumKind::F32 => 32,
            NumKind::F64 => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumKind::I8 => "i8",
            NumKind::U8 => "u8",
            NumKind::I16 => "i16",
            NumKind::U16 => "u16",
            NumKind::I32 => "i32",
            NumKind::U32 => "u32",
            NumKind::F32 => "f32",
            NumKind::F64 => "f64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "i8" => NumKind::I8,
            "u8" => NumKind::U8,
            "i16" => NumKind::I16,
            "u16" => NumKind::U16,
            "i32" => NumKind::I32,
            "u32" => NumKind::U32,
            "f32" => NumKind::F32,
            "f64" => NumKind::F64,
            _ => return None,
        })
    }
}

/// Numeric operations that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumError {
    DivisionByZero,
    NotInteger,
}

impl fmt::Display for NumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumError::DivisionByZero => write!(f, "division by zero"),
            NumError::NotInteger => write!(f, "bitwise operation requires integer operands"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// A number tagged with its storage width
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Number {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
}

impl Number {
    pub fn kind(&self) -> NumKind {
        match self {
            Number::I8(_) => NumKind::I8,
            Number::U8(_) => NumKind::U8,
            Number::I16(_) => NumKind::I16,
            Number::U16(_) => NumKind::U16,
            Number::I32(_) => NumKind::I32,
            Number::U32(_) => NumKind::U32,
            Number::F32(_) => NumKind::F32,
            Number::F64(_) => NumKind::F64,
        }
    }

    /// Narrow an integer into `kind`, wrapping for integer kinds
    pub fn from_i64(kind: NumKind, v: i64) -> Self {
        match kind {
            NumKind::I8 => Number::I8(v as i8),
            NumKind::U8 => Number::U8(v as u8),
            NumKind::I16 => Number::I16(v as i16),
            NumKind::U16 => Number::U16(v as u16),
            NumKind::I32 => Number::I32(v as i32),
            NumKind::U32 => Number::U32(v as u32),
            NumKind::F32 => Number::F32(v as f32),
            NumKind::F64 => Number::F64(v as f64),
        }
    }

    /// Convert a float into `kind`; integer kinds truncate toward zero, then wrap
    pub fn from_f64(kind: NumKind, v: f64) -> Self {
        match kind {
            NumKind::F32 => Number::F32(v as f32),
            NumKind::F64 => Number::F64(v),
            _ => Number::from_i64(kind, v.trunc() as i64),
        }
    }

    pub fn cast(self, kind: NumKind) -> Self {
        if self.kind().is_integer() {
            Number::from_i64(kind, self.as_i64())
        } else {
            Number::from_f64(kind, self.as_f64())
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::I8(v) => v as f64,
            Number::U8(v) => v as f64,
            Number::I16(v) => v as f64,
            Number::U16(v) => v as f64,
            Number::I32(v) => v as f64,
            Number::U32(v) => v as f64,
            Number::F32(v) => v as f64,
            Number::F64(v) => v,
        }
    }

    /// Integer view; floats truncate toward zero
    pub fn as_i64(&self) -> i64 {
        match *self {
            Number::I8(v) => v as i64,
            Number::U8(v) => v as i64,
            Number::I16(v) => v as i64,
            Number::U16(v) => v as i64,
            Number::I32(v) => v as i64,
            Number::U32(v) => v as i64,
            Number::F32(v) => v.trunc() as i64,
            Number::F64(v) => v.trunc() as i64,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_f64() == 0.0
    }

    /// The exact integer value, if this number has one
    pub fn as_index(&self) -> Option<i64> {
        if self.kind().is_integer() {
            return Some(self.as_i64());
        }
        let v = self.as_f64();
        (v.fract() == 0.0 && v.is_finite()).then_some(v as i64)
    }

    pub fn arith(self, op: ArithOp, rhs: Number) -> Result<Number, NumError> {
        if matches!(op, ArithOp::Div | ArithOp::Rem) && rhs.is_zero() {
            return Err(NumError::DivisionByZero);
        }
        let kind = self.kind();
        if kind.is_integer() && rhs.kind().is_integer() {
            let (a, b) = (self.as_i64(), rhs.as_i64());
            let v = match op {
                ArithOp::Add => a.wrapping_add(b),
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Mul => a.wrapping_mul(b),
                ArithOp::Div => a.wrapping_div(b),
                ArithOp::Rem => a.wrapping_rem(b),
                ArithOp::Pow if b >= 0 => a.wrapping_pow(b.min(u32::MAX as i64) as u32),
                ArithOp::Pow => return Ok(Number::from_f64(kind, (a as f64).powf(b as f64))),
            };
            return Ok(Number::from_i64(kind, v));
        }
        let (a, b) = (self.as_f64(), rhs.as_f64());
        let v = match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Rem => a % b,
            ArithOp::Pow => a.powf(b),
        };
        Ok(Number::from_f64(kind, v))
    }

    pub fn bitwise(self, op: BitOp, rhs: Number) -> Result<Number, NumError> {
        let kind = self.kind();
        if !kind.is_integer() || !rhs.kind().is_integer() {
            return Err(NumError::NotInteger);
        }
        let (a, b) = (self.as_i64(), rhs.as_i64());
        let amount = (b as u32) % kind.bits();
        let v = match op {
            BitOp::And => a & b,
            BitOp::Or => a | b,
            BitOp::Xor => a ^ b,
            BitOp::Shl => a << amount,
            // `a` is sign-extended for signed kinds and zero-extended otherwise,
            // so this is arithmetic or logical as the width demands
            BitOp::Shr => a >> amount,
        };
        Ok(Number::from_i64(kind, v))
    }

    pub fn neg(self) -> Number {
        match self {
            Number::F32(v) => Number::F32(-v),
            Number::F64(v) => Number::F64(-v),
            other => Number::from_i64(other.kind(), other.as_i64().wrapping_neg()),
        }
    }

    pub fn bit_not(self) -> Result<Number, NumError> {
        if !self.kind().is_integer() {
            return Err(NumError::NotInteger);
        }
        Ok(Number::from_i64(self.kind(), !self.as_i64()))
    }

    pub fn compare(&self, other: &Number) -> Option<Ordering> {
        if self.kind().is_integer() && other.kind().is_integer() {
            Some(self.as_i64().cmp(&other.as_i64()))
        } else {
            self.as_f64().partial_cmp(&other.as_f64())
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::I8(v) => write!(f, "{v}"),
            Number::U8(v) => write!(f, "{v}"),
            Number::I16(v) => write!(f, "{v}"),
            Number::U16(v) => write!(f, "{v}"),
            Number::I32(v) => write!(f, "{v}"),
            Number::U32(v) => write!(f, "{v}"),
            Number::F32(v) => write!(f, "{v}"),
            Number::F64(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [NumKind; 8] = [
        NumKind::I8,
        NumKind::U8,
        NumKind::I16,
        NumKind::U16,
        NumKind::I32,
        NumKind::U32,
        NumKind::F32,
        NumKind::F64,
    ];

    #[test]
    fn test_result_keeps_left_width() {
        for left in ALL_KINDS {
            for right in ALL_KINDS {
                let a = Number::from_i64(left, 7);
                let b = Number::from_i64(right, 3);
                for op in [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Rem, ArithOp::Pow] {
                    let result = a.arith(op, b).unwrap();
                    assert_eq!(result.kind(), left, "{op:?} {left:?} {right:?}");
                }
            }
        }
    }

    #[test]
    fn test_integer_wraparound() {
        assert!(matches!(Number::I8(127).arith(ArithOp::Add, Number::I8(1)), Ok(Number::I8(-128))));
        assert!(matches!(Number::U8(0).arith(ArithOp::Sub, Number::U8(1)), Ok(Number::U8(255))));
        assert!(matches!(Number::U16(300).arith(ArithOp::Mul, Number::U16(300)), Ok(Number::U16(24464))));
        assert!(matches!(Number::I32(i32::MAX).arith(ArithOp::Add, Number::I32(1)), Ok(Number::I32(i32::MIN))));
    }

    #[test]
    fn test_division_by_zero() {
        for kind in ALL_KINDS {
            let zero = Number::from_i64(kind, 0);
            assert_eq!(Number::F64(1.0).arith(ArithOp::Div, zero), Err(NumError::DivisionByZero));
            assert_eq!(Number::I32(1).arith(ArithOp::Rem, zero), Err(NumError::DivisionByZero));
        }
    }

    #[test]
    fn test_integer_division_truncates() {
        assert!(matches!(Number::I32(7).arith(ArithOp::Div, Number::I32(2)), Ok(Number::I32(3))));
        assert!(matches!(Number::I32(-7).arith(ArithOp::Div, Number::I32(2)), Ok(Number::I32(-3))));
        // Float divisor, integer left operand keeps the integer tag
        assert!(matches!(Number::I32(7).arith(ArithOp::Div, Number::F64(2.0)), Ok(Number::I32(3))));
        assert!(matches!(Number::F64(7.0).arith(ArithOp::Div, Number::I32(2)), Ok(Number::F64(v)) if v == 3.5));
    }

    #[test]
    fn test_pow() {
        assert!(matches!(Number::I32(2).arith(ArithOp::Pow, Number::I32(10)), Ok(Number::I32(1024))));
        assert!(matches!(Number::U8(2).arith(ArithOp::Pow, Number::U8(8)), Ok(Number::U8(0))));
        assert!(matches!(Number::F64(4.0).arith(ArithOp::Pow, Number::F64(0.5)), Ok(Number::F64(v)) if v == 2.0));
        assert!(matches!(Number::I32(2).arith(ArithOp::Pow, Number::I32(-1)), Ok(Number::I32(0))));
    }

    #[test]
    fn test_bitwise_uses_width() {
        assert!(matches!(Number::U8(0b1000_0001).bitwise(BitOp::Shl, Number::U8(1)), Ok(Number::U8(2))));
        assert!(matches!(Number::I8(-128).bitwise(BitOp::Shr, Number::I8(1)), Ok(Number::I8(-64))));
        assert!(matches!(Number::U8(0x80).bitwise(BitOp::Shr, Number::U8(1)), Ok(Number::U8(0x40))));
        assert!(matches!(Number::U8(5).bit_not(), Ok(Number::U8(250))));
        assert!(matches!(Number::I32(6).bitwise(BitOp::Xor, Number::I32(3)), Ok(Number::I32(5))));
        assert!(matches!(Number::I32(1).bitwise(BitOp::Shl, Number::I32(33)), Ok(Number::I32(2))));
    }

    #[test]
    fn test_bitwise_rejects_floats() {
        assert_eq!(Number::F64(1.0).bitwise(BitOp::And, Number::I32(1)), Err(NumError::NotInteger));
        assert_eq!(Number::I32(1).bitwise(BitOp::Or, Number::F32(1.0)), Err(NumError::NotInteger));
        assert_eq!(Number::F32(1.0).bit_not(), Err(NumError::NotInteger));
    }

    #[test]
    fn test_cross_kind_equality() {
        assert_eq!(Number::I32(1), Number::F64(1.0));
        assert_eq!(Number::U8(200), Number::I16(200));
        assert_ne!(Number::I32(1), Number::F64(1.5));
        assert_eq!(Number::I8(-1).compare(&Number::U8(255)), Some(Ordering::Less));
    }

    #[test]
    fn test_float_to_int_conversion() {
        assert!(matches!(Number::from_f64(NumKind::I32, -2.9), Number::I32(-2)));
        assert!(matches!(Number::from_f64(NumKind::U8, 256.5), Number::U8(0)));
        assert!(matches!(Number::F64(300.0).cast(NumKind::U8), Number::U8(44)));
    }

    #[test]
    fn test_neg_wraps() {
        assert!(matches!(Number::I8(-128).neg(), Number::I8(-128)));
        assert!(matches!(Number::U8(1).neg(), Number::U8(255)));
        assert!(matches!(Number::F64(2.5).neg(), Number::F64(v) if v == -2.5));
    }

    #[test]
    fn test_display() {
        assert_eq!(Number::I32(-4).to_string(), "-4");
        assert_eq!(Number::F64(1.0).to_string(), "1");
        assert_eq!(Number::F64(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_as_index() {
        assert_eq!(Number::F64(3.0).as_index(), Some(3));
        assert_eq!(Number::F64(3.5).as_index(), None);
        assert_eq!(Number::U8(9).as_index(), Some(9));
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in ALL_KINDS {
            assert_eq!(NumKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(NumKind::from_name("i64"), None);
    }
}
