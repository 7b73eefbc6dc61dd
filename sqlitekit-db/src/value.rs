//! Parameter and column value types for the safe `SQLite` wrapper.

use crate::coerce;

/// Fundamental storage class of a value, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit IEEE float.
    Float,
    /// Text.
    Text,
    /// Binary blob.
    Blob,
    /// SQL NULL.
    Null,
}

/// A value that can be bound to a prepared statement parameter or read from
/// a result column.
///
/// Values are owned snapshots: they stay valid after the statement that
/// produced them is reset or dropped. The `get_*` accessors apply the
/// engine's coercion rules (see [`crate::coerce`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Binary blob.
    Blob(Vec<u8>),
    /// SQL NULL.
    Null,
}

impl Value {
    /// Storage class of this value.
    #[must_use]
    pub const fn get_type(&self) -> Type {
        match self {
            Self::Integer(_) => Type::Integer,
            Self::Float(_) => Type::Float,
            Self::Text(_) => Type::Text,
            Self::Blob(_) => Type::Blob,
            Self::Null => Type::Null,
        }
    }

    /// Returns `true` for SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value as a 32-bit integer (the 64-bit coercion, truncated).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_int(&self) -> i32 {
        coerce::to_int64(self) as i32
    }

    /// The value as a 64-bit integer.
    #[must_use]
    pub fn get_int64(&self) -> i64 {
        coerce::to_int64(self)
    }

    /// The value as an unsigned 32-bit integer. Negative values wrap.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn get_uint(&self) -> u32 {
        coerce::to_int64(self) as u32
    }

    /// The value as a double.
    #[must_use]
    pub fn get_double(&self) -> f64 {
        coerce::to_double(self)
    }

    /// The value as text.
    #[must_use]
    pub fn get_text(&self) -> String {
        coerce::to_text(self)
    }

    /// The value as UTF-16 code units.
    #[must_use]
    pub fn get_wide_text(&self) -> Vec<u16> {
        coerce::to_text(self).encode_utf16().collect()
    }

    /// The value as raw bytes.
    #[must_use]
    pub fn get_blob(&self) -> Vec<u8> {
        coerce::to_blob(self)
    }

    /// Length in bytes of the value's blob or text representation.
    #[must_use]
    pub fn get_bytes(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Blob(b) => b.len(),
            Self::Null => 0,
            Self::Integer(_) | Self::Float(_) => coerce::to_text(self).len(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Conversion from a column [`Value`] into a Rust type.
///
/// Conversions never fail: mismatched storage classes are coerced, and
/// `Option<T>` maps NULL to `None`.
pub trait FromValue: Sized {
    /// Converts `value`.
    fn from_value(value: Value) -> Self;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Self {
        value
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Self {
        value.get_int()
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Self {
        value.get_uint()
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Self {
        value.get_int64()
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Self {
        value.get_int64() != 0
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Self {
        value.get_double()
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Text(s) => s,
            other => other.get_text(),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Blob(b) => b,
            other => other.get_blob(),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Self {
        if value.is_null() {
            None
        } else {
            Some(T::from_value(value))
        }
    }
}

/// Convenience macro for building parameter lists.
///
/// Usage: `params![1_i64, blob.as_slice(), "text"]`
#[macro_export]
macro_rules! params {
    ($($val:expr),* $(,)?) => {
        &[$($crate::Value::from($val)),*][..]
    };
}
