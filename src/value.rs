use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A flag's evaluated value as delivered by the flag service.
///
/// The set of variants is closed: anything that does not fit (JSON `null`,
/// numbers outside `f64`) is rejected when raw payloads are converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<FlagValue>),
    Dictionary(BTreeMap<String, FlagValue>),
}

impl FlagValue {
    /// Converts a raw JSON value into the flag value model.
    ///
    /// Returns `None` for `null`, and for arrays or objects that contain a
    /// `null` anywhere inside them.
    pub fn from_json(raw: &Value) -> Option<FlagValue> {
        match raw {
            Value::Null => None,
            Value::Bool(b) => Some(FlagValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(FlagValue::Int(i)),
                None => n.as_f64().map(FlagValue::Double),
            },
            Value::String(s) => Some(FlagValue::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(FlagValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(FlagValue::Array),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| FlagValue::from_json(v).map(|v| (k.clone(), v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(FlagValue::Dictionary),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FlagValue::Bool(b) => Value::Bool(*b),
            FlagValue::Int(i) => Value::from(*i),
            // non-finite doubles have no JSON form
            FlagValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FlagValue::String(s) => Value::String(s.clone()),
            FlagValue::Array(items) => {
                Value::Array(items.iter().map(FlagValue::to_json).collect())
            }
            FlagValue::Dictionary(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Short name of the variant, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FlagValue::Bool(_) => "bool",
            FlagValue::Int(_) => "int",
            FlagValue::Double(_) => "double",
            FlagValue::String(_) => "string",
            FlagValue::Array(_) => "array",
            FlagValue::Dictionary(_) => "dictionary",
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{b}"),
            FlagValue::Int(i) => write!(f, "{i}"),
            FlagValue::Double(d) => write!(f, "{d}"),
            FlagValue::String(s) => write!(f, "{s}"),
            FlagValue::Array(_) | FlagValue::Dictionary(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        FlagValue::Bool(b)
    }
}

impl From<i64> for FlagValue {
    fn from(i: i64) -> Self {
        FlagValue::Int(i)
    }
}

impl From<f64> for FlagValue {
    fn from(d: f64) -> Self {
        FlagValue::Double(d)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        FlagValue::String(s.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(s: String) -> Self {
        FlagValue::String(s)
    }
}

impl<T: Into<FlagValue>> From<Vec<T>> for FlagValue {
    fn from(items: Vec<T>) -> Self {
        FlagValue::Array(items.into_iter().map(Into::into).collect())
    }
}
