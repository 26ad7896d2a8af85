//! Dynamic field values.
//!
//! Field values are heterogeneous but always typed: the schema's declared
//! field type selects the discriminant, and every value entering the store
//! is coerced through [`FieldValue::from_json`] first.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean.
    Boolean,
    /// Timestamp with timezone, RFC 3339 on the wire.
    DateTime,
    /// Arbitrary JSON document.
    Json,
}

impl FieldType {
    /// Wire name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Json => "json",
        }
    }
}

/// A typed field value.
///
/// The WAL serializes values in self-describing form (`{"type", "value"}`)
/// so recovery does not depend on schema state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    /// Explicit null (nullable fields).
    Null,
    /// Text value.
    String(String),
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// Timestamp value.
    DateTime(DateTime<Utc>),
    /// Raw JSON document.
    Json(serde_json::Value),
}

impl FieldValue {
    /// Coerces a JSON value into a typed value per the declared field type.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedData`] when the JSON value does not
    /// fit the declared type.
    pub fn from_json(field_type: FieldType, raw: &serde_json::Value) -> EngineResult<Self> {
        use serde_json::Value as Json;

        if raw.is_null() {
            return Ok(Self::Null);
        }

        match field_type {
            FieldType::String => match raw {
                Json::String(s) => Ok(Self::String(s.clone())),
                other => Err(type_mismatch("string", other)),
            },
            FieldType::Integer => match raw.as_i64() {
                Some(n) => Ok(Self::Integer(n)),
                None => Err(type_mismatch("integer", raw)),
            },
            FieldType::Float => match raw.as_f64() {
                Some(f) => Ok(Self::Float(f)),
                None => Err(type_mismatch("float", raw)),
            },
            FieldType::Boolean => match raw {
                Json::Bool(b) => Ok(Self::Boolean(*b)),
                other => Err(type_mismatch("boolean", other)),
            },
            FieldType::DateTime => match raw {
                Json::String(s) => DateTime::parse_from_rfc3339(s)
                    .map(|dt| Self::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|e| {
                        EngineError::malformed(format!("invalid datetime '{s}': {e}"))
                    }),
                other => Err(type_mismatch("datetime", other)),
            },
            FieldType::Json => Ok(Self::Json(raw.clone())),
        }
    }

    /// Renders the value back as plain JSON for the wire.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::DateTime(dt) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            Self::Json(v) => v.clone(),
        }
    }

    /// Whether this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value as a string slice, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, if it is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Canonical index key for this value.
    ///
    /// Index maps are keyed by this string; a one-byte tag keeps values of
    /// different discriminants from colliding. Null values are never
    /// indexed, so no key exists for them.
    #[must_use]
    pub fn index_key(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::String(s) => Some(format!("s:{s}")),
            Self::Integer(n) => Some(format!("i:{n}")),
            Self::Float(f) => Some(format!("f:{f}")),
            Self::Boolean(b) => Some(format!("b:{b}")),
            Self::DateTime(dt) => Some(format!(
                "d:{}",
                dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
            )),
            Self::Json(v) => Some(format!("j:{v}")),
        }
    }

    /// Orders two values of compatible discriminants.
    ///
    /// Integers and floats compare numerically across discriminants. Null
    /// sorts before everything. JSON documents are not ordered.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) => Some(Ordering::Less),
            (_, Self::Null) => Some(Ordering::Greater),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Loose equality across numeric discriminants, used by joins.
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

fn type_mismatch(expected: &str, got: &serde_json::Value) -> EngineError {
    EngineError::malformed(format!("expected {expected}, got {got}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_by_declared_type() {
        let v = FieldValue::from_json(FieldType::String, &json!("hello")).unwrap();
        assert_eq!(v, FieldValue::String("hello".into()));

        let v = FieldValue::from_json(FieldType::Integer, &json!(42)).unwrap();
        assert_eq!(v, FieldValue::Integer(42));

        let v = FieldValue::from_json(FieldType::Float, &json!(2.5)).unwrap();
        assert_eq!(v, FieldValue::Float(2.5));

        let v = FieldValue::from_json(FieldType::Boolean, &json!(true)).unwrap();
        assert_eq!(v, FieldValue::Boolean(true));
    }

    #[test]
    fn integer_accepts_whole_json_numbers_only() {
        assert!(FieldValue::from_json(FieldType::Integer, &json!(1.5)).is_err());
        assert!(FieldValue::from_json(FieldType::Integer, &json!("1")).is_err());
    }

    #[test]
    fn float_accepts_integers() {
        let v = FieldValue::from_json(FieldType::Float, &json!(3)).unwrap();
        assert_eq!(v, FieldValue::Float(3.0));
    }

    #[test]
    fn null_coerces_for_any_type() {
        for ty in [
            FieldType::String,
            FieldType::Integer,
            FieldType::Float,
            FieldType::Boolean,
            FieldType::DateTime,
            FieldType::Json,
        ] {
            let v = FieldValue::from_json(ty, &serde_json::Value::Null).unwrap();
            assert!(v.is_null());
        }
    }

    #[test]
    fn datetime_roundtrip() {
        let v =
            FieldValue::from_json(FieldType::DateTime, &json!("2024-06-01T12:30:00Z")).unwrap();
        let back = v.to_json();
        let reparsed = FieldValue::from_json(FieldType::DateTime, &back).unwrap();
        assert_eq!(v, reparsed);
    }

    #[test]
    fn datetime_rejects_garbage() {
        assert!(FieldValue::from_json(FieldType::DateTime, &json!("yesterday")).is_err());
    }

    #[test]
    fn json_passes_through() {
        let doc = json!({"nested": [1, 2, 3]});
        let v = FieldValue::from_json(FieldType::Json, &doc).unwrap();
        assert_eq!(v.to_json(), doc);
    }

    #[test]
    fn index_keys_do_not_collide_across_types() {
        let s = FieldValue::String("true".into()).index_key().unwrap();
        let b = FieldValue::Boolean(true).index_key().unwrap();
        assert_ne!(s, b);

        let i = FieldValue::Integer(1).index_key().unwrap();
        let f = FieldValue::Float(1.0).index_key().unwrap();
        assert_ne!(i, f);
    }

    #[test]
    fn null_has_no_index_key() {
        assert!(FieldValue::Null.index_key().is_none());
    }

    #[test]
    fn numeric_cross_comparison() {
        let i = FieldValue::Integer(2);
        let f = FieldValue::Float(2.5);
        assert_eq!(i.compare(&f), Some(Ordering::Less));
        assert!(FieldValue::Integer(3).loose_eq(&FieldValue::Float(3.0)));
    }

    #[test]
    fn json_is_unordered() {
        let a = FieldValue::Json(json!({"a": 1}));
        let b = FieldValue::Json(json!({"a": 2}));
        assert_eq!(a.compare(&b), None);
    }

    #[test]
    fn wal_serialization_is_self_describing() {
        let v = FieldValue::DateTime(Utc::now());
        let encoded = serde_json::to_string(&v).unwrap();
        let decoded: FieldValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(v, decoded);
    }
}
