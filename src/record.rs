use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FlagStoreError, Result};
use crate::value::FlagValue;

pub const VALUE_KEY: &str = "value";
pub const VERSION_KEY: &str = "version";

/// One flag's known state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub value: FlagValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Flag key to record mapping held by the store.
pub type FlagCollection = HashMap<String, FlagRecord>;

impl FlagRecord {
    pub fn new(value: impl Into<FlagValue>, version: Option<u64>) -> Self {
        Self {
            value: value.into(),
            version,
        }
    }

    /// Builds a record from a raw value of a bulk flag set.
    ///
    /// An object whose keys are exactly `value` or `value` + `version` is read
    /// as an encoded record. Anything else is taken as the flag value itself,
    /// with no version. `None` when the value is outside the value model.
    pub fn from_raw(raw: &Value) -> Option<FlagRecord> {
        if let Some(record) = raw.as_object().and_then(encoded_record) {
            return Some(record);
        }
        FlagValue::from_json(raw).map(|value| FlagRecord {
            value,
            version: None,
        })
    }
}

fn encoded_record(obj: &Map<String, Value>) -> Option<FlagRecord> {
    let value = obj.get(VALUE_KEY)?;
    let version = match (obj.len(), obj.get(VERSION_KEY)) {
        (1, None) => None,
        (2, Some(v)) => Some(v.as_u64()?),
        _ => return None,
    };
    Some(FlagRecord {
        value: FlagValue::from_json(value)?,
        version,
    })
}

/// Converts a raw bulk flag set into a [`FlagCollection`].
///
/// `None` means no flags. Entries that cannot be represented are dropped.
pub fn flag_collection(raw: Option<&Map<String, Value>>) -> FlagCollection {
    let Some(raw) = raw else {
        return FlagCollection::new();
    };
    raw.iter()
        .filter_map(|(key, value)| match FlagRecord::from_raw(value) {
            Some(record) => Some((key.clone(), record)),
            None => {
                tracing::debug!(key = %key, "dropping flag with unrepresentable value");
                None
            }
        })
        .collect()
}

/// Parses a JSON document that must be an object, as used for bulk flag sets
/// and update payloads.
pub fn parse_object(content: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(content)? {
        Value::Object(map) => Ok(map),
        Value::Null => Err(FlagStoreError::NotAnObject("null")),
        Value::Bool(_) => Err(FlagStoreError::NotAnObject("a boolean")),
        Value::Number(_) => Err(FlagStoreError::NotAnObject("a number")),
        Value::String(_) => Err(FlagStoreError::NotAnObject("a string")),
        Value::Array(_) => Err(FlagStoreError::NotAnObject("an array")),
    }
}
