//! Runtime value representation for decoded snapshot elements and scalar
//! arguments.
//!
//! [`Value`] is the dynamic counterpart of [`ScalarType`]: snapshot bytes are
//! decoded into `Value`s before predicates look at them, and scalar
//! parameters (such as a multiply factor) are passed to candidates as
//! `Value`s. Encoding uses native byte order, matching how the C subject
//! would lay the same values out in memory.

use calico_core::types::ScalarType;
use serde::{Deserialize, Serialize};

/// A scalar value at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Return value of a `void` function.
    Unit,
}

/// Bytes could not be split into whole elements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{len} bytes is not a whole number of {ty} elements")]
pub struct DecodeError {
    pub len: usize,
    pub ty: ScalarType,
}

impl Value {
    /// The scalar type of this value, `None` for `Unit`.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        Some(match self {
            Value::I8(_) => ScalarType::I8,
            Value::U8(_) => ScalarType::U8,
            Value::I16(_) => ScalarType::I16,
            Value::U16(_) => ScalarType::U16,
            Value::I32(_) => ScalarType::I32,
            Value::U32(_) => ScalarType::U32,
            Value::I64(_) => ScalarType::I64,
            Value::U64(_) => ScalarType::U64,
            Value::F32(_) => ScalarType::F32,
            Value::F64(_) => ScalarType::F64,
            Value::Unit => return None,
        })
    }

    /// Returns a human-readable description of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::I8(_) => "I8",
            Value::U8(_) => "U8",
            Value::I16(_) => "I16",
            Value::U16(_) => "U16",
            Value::I32(_) => "I32",
            Value::U32(_) => "U32",
            Value::I64(_) => "I64",
            Value::U64(_) => "U64",
            Value::F32(_) => "F32",
            Value::F64(_) => "F64",
            Value::Unit => "Unit",
        }
    }

    /// Integer view, truncating floats toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::U8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::U64(v) => Some(v as i64),
            Value::F32(v) => Some(v as i64),
            Value::F64(v) => Some(v as i64),
            Value::Unit => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            Value::Unit => None,
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Converts to `ty` with C cast semantics (wrapping for integers,
    /// truncation for float-to-int). `Unit` converts to zero.
    pub fn cast(&self, ty: ScalarType) -> Value {
        let int = self.as_i64().unwrap_or(0);
        match ty {
            ScalarType::I8 => Value::I8(int as i8),
            ScalarType::U8 => Value::U8(int as u8),
            ScalarType::I16 => Value::I16(int as i16),
            ScalarType::U16 => Value::U16(int as u16),
            ScalarType::I32 => Value::I32(int as i32),
            ScalarType::U32 => Value::U32(int as u32),
            ScalarType::I64 => Value::I64(int),
            ScalarType::U64 => Value::U64(int as u64),
            ScalarType::F32 => Value::F32(self.as_f64().unwrap_or(0.0) as f32),
            ScalarType::F64 => Value::F64(self.as_f64().unwrap_or(0.0)),
        }
    }

    /// Two's-complement negation for integers, sign flip for floats.
    pub fn negated(&self) -> Value {
        match *self {
            Value::I8(v) => Value::I8(v.wrapping_neg()),
            Value::U8(v) => Value::U8(v.wrapping_neg()),
            Value::I16(v) => Value::I16(v.wrapping_neg()),
            Value::U16(v) => Value::U16(v.wrapping_neg()),
            Value::I32(v) => Value::I32(v.wrapping_neg()),
            Value::U32(v) => Value::U32(v.wrapping_neg()),
            Value::I64(v) => Value::I64(v.wrapping_neg()),
            Value::U64(v) => Value::U64(v.wrapping_neg()),
            Value::F32(v) => Value::F32(-v),
            Value::F64(v) => Value::F64(-v),
            Value::Unit => Value::Unit,
        }
    }

    /// -1, 0 or 1. NaN and `Unit` count as 0.
    pub fn signum(&self) -> i8 {
        match *self {
            Value::F32(v) => float_sign(v as f64),
            Value::F64(v) => float_sign(v),
            Value::U8(v) => (v > 0) as i8,
            Value::U16(v) => (v > 0) as i8,
            Value::U32(v) => (v > 0) as i8,
            Value::U64(v) => (v > 0) as i8,
            Value::Unit => 0,
            other => other.as_i64().map_or(0, |v| v.signum() as i8),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.signum() == 0 && !self.is_nan()
    }

    fn is_nan(&self) -> bool {
        match *self {
            Value::F32(v) => v.is_nan(),
            Value::F64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// `self * rhs` in `self`'s type, wrapping on integer overflow.
    pub fn mul(&self, rhs: Value) -> Value {
        self.arith(rhs, i64::wrapping_mul, |a, b| a * b)
    }

    /// `self + rhs` in `self`'s type, wrapping on integer overflow.
    pub fn add(&self, rhs: Value) -> Value {
        self.arith(rhs, i64::wrapping_add, |a, b| a + b)
    }

    fn arith(&self, rhs: Value, int: fn(i64, i64) -> i64, float: fn(f64, f64) -> f64) -> Value {
        let Some(ty) = self.scalar_type() else {
            return Value::Unit;
        };
        match ty {
            ScalarType::F32 => {
                let a = self.as_f64().unwrap_or(0.0);
                let b = rhs.as_f64().unwrap_or(0.0);
                Value::F32(float(a, b) as f32)
            }
            ScalarType::F64 => {
                let a = self.as_f64().unwrap_or(0.0);
                let b = rhs.as_f64().unwrap_or(0.0);
                Value::F64(float(a, b))
            }
            // Unsigned types go through i64 bit patterns; wrapping add/mul agree.
            _ => {
                let a = self.as_i64().unwrap_or(0);
                let b = rhs.cast(ty).as_i64().unwrap_or(0);
                Value::I64(int(a, b)).cast(ty)
            }
        }
    }

    /// Native-endian bytes of this value; empty for `Unit`.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        match *self {
            Value::I8(v) => v.to_ne_bytes().to_vec(),
            Value::U8(v) => v.to_ne_bytes().to_vec(),
            Value::I16(v) => v.to_ne_bytes().to_vec(),
            Value::U16(v) => v.to_ne_bytes().to_vec(),
            Value::I32(v) => v.to_ne_bytes().to_vec(),
            Value::U32(v) => v.to_ne_bytes().to_vec(),
            Value::I64(v) => v.to_ne_bytes().to_vec(),
            Value::U64(v) => v.to_ne_bytes().to_vec(),
            Value::F32(v) => v.to_ne_bytes().to_vec(),
            Value::F64(v) => v.to_ne_bytes().to_vec(),
            Value::Unit => Vec::new(),
        }
    }

    /// Reads a JSON number as a value of type `ty`.
    pub fn from_json(ty: ScalarType, json: &serde_json::Value) -> Option<Value> {
        if ty.is_float() {
            return json.as_f64().map(|v| Value::F64(v).cast(ty));
        }
        if let Some(v) = json.as_i64() {
            return Some(Value::I64(v).cast(ty));
        }
        json.as_u64().map(|v| Value::U64(v).cast(ty))
    }
}

fn float_sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Splits `bytes` into elements of type `ty`.
pub fn decode_elements(bytes: &[u8], ty: ScalarType) -> Result<Vec<Value>, DecodeError> {
    let size = ty.size();
    if bytes.len() % size != 0 {
        return Err(DecodeError {
            len: bytes.len(),
            ty,
        });
    }
    Ok(bytes.chunks_exact(size).map(|c| decode_one(c, ty)).collect())
}

fn decode_one(chunk: &[u8], ty: ScalarType) -> Value {
    // `chunk` always has exactly `ty.size()` bytes here.
    let mut buf = [0u8; 8];
    buf[..chunk.len()].copy_from_slice(chunk);
    match ty {
        ScalarType::I8 => Value::I8(i8::from_ne_bytes([buf[0]])),
        ScalarType::U8 => Value::U8(buf[0]),
        ScalarType::I16 => Value::I16(i16::from_ne_bytes([buf[0], buf[1]])),
        ScalarType::U16 => Value::U16(u16::from_ne_bytes([buf[0], buf[1]])),
        ScalarType::I32 => Value::I32(i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]])),
        ScalarType::U32 => Value::U32(u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]])),
        ScalarType::F32 => Value::F32(f32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]])),
        ScalarType::I64 => Value::I64(i64::from_ne_bytes(buf)),
        ScalarType::U64 => Value::U64(u64::from_ne_bytes(buf)),
        ScalarType::F64 => Value::F64(f64::from_ne_bytes(buf)),
    }
}

/// Concatenates the native-endian bytes of `values`.
pub fn encode_elements(values: &[Value]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_int_elements() {
        let bytes = encode_elements(&[Value::I32(5), Value::I32(-7)]);
        assert_eq!(bytes.len(), 8);
        let values = decode_elements(&bytes, ScalarType::I32).unwrap();
        assert_eq!(values, vec![Value::I32(5), Value::I32(-7)]);
    }

    #[test]
    fn decode_rejects_partial_elements() {
        let err = decode_elements(&[0, 1, 2], ScalarType::I32).unwrap_err();
        assert_eq!(err.len, 3);
        assert_eq!(err.ty, ScalarType::I32);
    }

    #[test]
    fn decode_doubles() {
        let bytes = encode_elements(&[Value::F64(1.5), Value::F64(-0.25)]);
        assert_eq!(
            decode_elements(&bytes, ScalarType::F64).unwrap(),
            vec![Value::F64(1.5), Value::F64(-0.25)]
        );
    }

    #[test]
    fn negation_wraps_at_min() {
        assert_eq!(Value::I32(5).negated(), Value::I32(-5));
        assert_eq!(Value::I32(i32::MIN).negated(), Value::I32(i32::MIN));
        assert_eq!(Value::F64(2.0).negated(), Value::F64(-2.0));
    }

    #[test]
    fn signum_handles_all_kinds() {
        assert_eq!(Value::I32(-3).signum(), -1);
        assert_eq!(Value::I32(0).signum(), 0);
        assert_eq!(Value::U32(9).signum(), 1);
        assert_eq!(Value::F64(-0.5).signum(), -1);
        assert_eq!(Value::F64(f64::NAN).signum(), 0);
        assert!(!Value::F64(f64::NAN).is_zero());
        assert!(Value::F32(0.0).is_zero());
    }

    #[test]
    fn arithmetic_stays_in_left_type() {
        assert_eq!(Value::I32(6).mul(Value::I32(-2)), Value::I32(-12));
        assert_eq!(Value::I32(i32::MAX).mul(Value::I32(2)), Value::I32(-2));
        assert_eq!(Value::I32(6).add(Value::I64(1)), Value::I32(7));
        assert_eq!(Value::F64(1.5).mul(Value::F64(2.0)), Value::F64(3.0));
        assert_eq!(Value::F32(1.5).add(Value::I32(1)), Value::F32(2.5));
        assert_eq!(Value::U64(u64::MAX).add(Value::U64(1)), Value::U64(0));
    }

    #[test]
    fn cast_follows_c_rules() {
        assert_eq!(Value::F64(3.9).cast(ScalarType::I32), Value::I32(3));
        assert_eq!(Value::I64(300).cast(ScalarType::U8), Value::U8(44));
        assert_eq!(Value::I32(2).cast(ScalarType::F64), Value::F64(2.0));
    }

    #[test]
    fn from_json_numbers() {
        let json: serde_json::Value = serde_json::json!(3);
        assert_eq!(Value::from_json(ScalarType::I32, &json), Some(Value::I32(3)));
        assert_eq!(Value::from_json(ScalarType::F64, &json), Some(Value::F64(3.0)));
        let json: serde_json::Value = serde_json::json!("three");
        assert_eq!(Value::from_json(ScalarType::I32, &json), None);
    }

    #[test]
    fn unit_has_no_bytes_or_type() {
        assert!(Value::Unit.to_ne_bytes().is_empty());
        assert_eq!(Value::Unit.scalar_type(), None);
        assert_eq!(Value::Unit.type_name(), "Unit");
    }
}
