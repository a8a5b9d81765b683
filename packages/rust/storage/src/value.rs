//! Typed field values and their JSON encoding inside a stored record.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::schema::{FieldKind, TableSchema};

/// Field name -> value. Ordered so encoded records are stable.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A typed record field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    /// Structured blob, stored as serialized JSON text.
    Json(Value),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Human-readable rendering used by `leadqual status`.
    pub fn display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => format!("{n}"),
            Self::Date(d) => d.format(DATE_FORMAT).to_string(),
            Self::Json(v) => v.to_string(),
        }
    }
}

/// Stored date format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Encode a field map into the JSON object stored in `records.fields_json`.
pub(crate) fn encode(fields: &FieldMap) -> Value {
    let object = fields
        .iter()
        .map(|(name, value)| {
            let encoded = match value {
                FieldValue::Text(s) => Value::String(s.clone()),
                FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                FieldValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
                FieldValue::Json(v) => Value::String(v.to_string()),
            };
            (name.clone(), encoded)
        })
        .collect();
    Value::Object(object)
}

/// Decode a stored JSON object back into typed fields using the table schema.
pub(crate) fn decode(schema: &TableSchema, stored: &Value) -> FieldMap {
    let Some(object) = stored.as_object() else {
        return FieldMap::new();
    };

    object
        .iter()
        .filter_map(|(name, raw)| {
            let value = match (schema.field(name).map(|f| &f.kind), raw) {
                (_, Value::Null) => return None,
                (Some(FieldKind::Number { .. }), Value::Number(n)) => {
                    FieldValue::Number(n.as_f64()?)
                }
                (Some(FieldKind::Date), Value::String(s)) => {
                    FieldValue::Date(NaiveDate::parse_from_str(s, DATE_FORMAT).ok()?)
                }
                (Some(FieldKind::Json), Value::String(s)) => {
                    FieldValue::Json(serde_json::from_str(s).unwrap_or(Value::String(s.clone())))
                }
                (_, Value::String(s)) => FieldValue::Text(s.clone()),
                (_, Value::Number(n)) => FieldValue::Number(n.as_f64()?),
                (_, other) => FieldValue::Json(other.clone()),
            };
            Some((name.clone(), value))
        })
        .collect()
}
