//! Dynamic claim values decoded from a verified credential's JSON payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A weakly-typed claim value, mirroring arbitrary JSON.
///
/// Identity accessors pattern-match on this type rather than leaking a raw
/// `serde_json::Value` contract, while (de)serializing exactly like JSON on
/// the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number, kept as `f64` (claims are rarely integers wider than
    /// that can represent losslessly; exact integer claims like `exp`/`iat`
    /// are read directly from the raw JSON by the validator, not through
    /// this type).
    Number(f64),
    /// JSON string.
    String(String),
    /// JSON array.
    Array(Vec<ClaimValue>),
    /// JSON object.
    Object(HashMap<String, ClaimValue>),
}

impl ClaimValue {
    /// Borrow as a string, if this value is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow as an array, if this value is an `Array`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[ClaimValue]> {
        match self {
            ClaimValue::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl From<Value> for ClaimValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => ClaimValue::Null,
            Value::Bool(b) => ClaimValue::Bool(b),
            Value::Number(n) => ClaimValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => ClaimValue::String(s),
            Value::Array(a) => ClaimValue::Array(a.into_iter().map(ClaimValue::from).collect()),
            Value::Object(o) => {
                ClaimValue::Object(o.into_iter().map(|(k, v)| (k, ClaimValue::from(v))).collect())
            }
        }
    }
}

impl From<ClaimValue> for Value {
    fn from(v: ClaimValue) -> Self {
        match v {
            ClaimValue::Null => Value::Null,
            ClaimValue::Bool(b) => Value::Bool(b),
            ClaimValue::Number(n) => {
                serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
            }
            ClaimValue::String(s) => Value::String(s),
            ClaimValue::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            ClaimValue::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A claims map: string keys to dynamic values.
pub type Claims = HashMap<String, ClaimValue>;

/// Convert a decoded JWT payload (a JSON object) into a [`Claims`] map.
///
/// Non-object payloads (which should not occur for a valid JWT) yield an
/// empty map rather than failing — claim mapping already degrades silently
/// on malformed input.
#[must_use]
pub fn claims_from_json(value: Value) -> Claims {
    match value {
        Value::Object(map) => map.into_iter().map(|(k, v)| (k, ClaimValue::from(v))).collect(),
        _ => Claims::new(),
    }
}
