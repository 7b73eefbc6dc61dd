//! JSON rendering of result rows.

use serde::ser::{Serialize, SerializeMap, Serializer};
use sqlitekit_db::Value;

/// One result row serialized as a JSON object, keys in column order.
///
/// Blobs are written as lowercase hex strings. Non-finite floats become
/// `null`.
pub struct RowObject<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RowObject<'a> {
    pub const fn new(columns: &'a [String], values: &'a [Value]) -> Self {
        Self { columns, values }
    }
}

struct Cell<'a>(&'a Value);

impl Serialize for Cell<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) | Value::Null => serializer.serialize_none(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_str(&hex::encode(b)),
        }
    }
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, &Cell(value))?;
        }
        map.end()
    }
}
