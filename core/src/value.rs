//! Dynamically typed scalar values.
//!
//! [`Value`] is the cell type of every [`Row`](crate::row::Row), every filter
//! operand and every aggregate result. Values compare across `Int`/`Float`;
//! `Null` is unordered and never satisfies a range comparison.

use core::cmp::Ordering;
use core::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, Utc};
use neuronek_db_types::ScalarType;
use serde::{Serialize, Serializer};

use crate::error::{QueryError, Result};

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl Value {
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "Boolean",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Compares two non-null values of compatible types.
    ///
    /// Returns `None` when either side is `Null` or the types are unrelated.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                Some(a.total_cmp(&b))
            }
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Checks that this value fits a field of type `ty`, converting where lossless.
    ///
    /// `Int` widens to `Float`; RFC 3339 strings parse into `DateTime`.
    pub fn coerce(self, ty: ScalarType, nullable: bool, field: &str) -> Result<Self> {
        let mismatch = |v: &Value| {
            QueryError::validation(format!(
                "Field `{field}` expects {ty}, got {}",
                v.type_name()
            ))
        };
        match (ty, self) {
            (_, Self::Null) if nullable => Ok(Self::Null),
            (_, Self::Null) => Err(QueryError::validation(format!(
                "Field `{field}` is required and cannot be null"
            ))),
            (ScalarType::String, v @ Self::String(_)) => Ok(v),
            (ScalarType::Int, v @ Self::Int(_)) => Ok(v),
            (ScalarType::Float, v @ Self::Float(_)) => Ok(v),
            (ScalarType::Float, Self::Int(i)) => Ok(Self::Float(i as f64)),
            (ScalarType::Boolean, v @ Self::Bool(_)) => Ok(v),
            (ScalarType::DateTime, v @ Self::DateTime(_)) => Ok(v),
            (ScalarType::DateTime, Self::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Self::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| {
                    QueryError::validation(format!(
                        "Field `{field}` expects an RFC 3339 DateTime: {e}"
                    ))
                }),
            (_, v) => Err(mismatch(&v)),
        }
    }

    /// Reads a JSON scalar without type information.
    ///
    /// Objects and arrays are rejected; numbers become `Int` when integral.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n
                    .as_f64()
                    .map(Self::Float)
                    .ok_or_else(|| QueryError::validation(format!("Unsupported number {n}"))),
            },
            serde_json::Value::String(s) => Ok(Self::String(s.clone())),
            other => Err(QueryError::validation(format!(
                "Expected a scalar value, got {other}"
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::DateTime(dt) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

// Floats compare by value with NaN equal to itself, so values can key hash maps.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => {
                let canonical = if *f == 0.0 {
                    0.0f64
                } else if f.is_nan() {
                    f64::NAN
                } else {
                    *f
                };
                canonical.to_bits().hash(state);
            }
            Self::String(s) => s.hash(state),
            Self::DateTime(dt) => dt.hash(state),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn int_and_float_compare_numerically() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Float(3.0).compare(&Value::Int(3)), Some(Ordering::Equal));
    }

    #[test]
    fn null_is_unordered() {
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).compare(&Value::Null), None);
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
    }

    #[test]
    fn coerce_widens_and_parses() {
        let v = Value::Int(4).coerce(ScalarType::Float, false, "weight").unwrap();
        assert_eq!(v, Value::Float(4.0));

        let dt = Value::from("2024-01-02T03:04:05Z")
            .coerce(ScalarType::DateTime, true, "date")
            .unwrap();
        assert!(matches!(dt, Value::DateTime(_)));

        let err = Value::from("x").coerce(ScalarType::Int, false, "from").unwrap_err();
        assert!(err.to_string().contains("expects Int"));

        let err = Value::Null.coerce(ScalarType::String, false, "name").unwrap_err();
        assert!(err.to_string().contains("cannot be null"));
    }

    #[test]
    fn floats_hash_consistently() {
        let mut set = HashSet::new();
        set.insert(Value::Float(0.0));
        set.insert(Value::Float(-0.0));
        set.insert(Value::Float(f64::NAN));
        set.insert(Value::Float(f64::NAN));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn datetime_renders_rfc3339() {
        let dt = Value::from("2024-05-01T10:00:00Z")
            .coerce(ScalarType::DateTime, false, "date")
            .unwrap();
        assert_eq!(dt.to_json(), serde_json::json!("2024-05-01T10:00:00.000Z"));
    }
}
