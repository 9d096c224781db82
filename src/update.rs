use core::fmt;

use serde_json::{Map, Value};

use crate::record::{FlagRecord, VALUE_KEY, VERSION_KEY};
use crate::value::FlagValue;

pub const FLAG_KEY: &str = "key";

/// A single-flag change that passed the shape check.
///
/// Payloads have the form:
///
/// ```text
/// { "key": <flag-key>, "value": <new-flag-value>, "version": <new-flag-version> }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FlagUpdate {
    pub key: String,
    pub value: FlagValue,
    pub version: u64,
}

/// Why an update was dropped. Only ever logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    KeySet,
    KeyType,
    ValueType,
    VersionType,
    Stale { existing: u64, offered: u64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::KeySet => write!(f, "payload must have exactly key, value and version"),
            RejectReason::KeyType => write!(f, "key is not a string"),
            RejectReason::ValueType => write!(f, "value is outside the flag value model"),
            RejectReason::VersionType => write!(f, "version is not a non-negative integer"),
            RejectReason::Stale { existing, offered } => {
                write!(f, "version {offered} is not newer than {existing}")
            }
        }
    }
}

impl FlagUpdate {
    pub fn parse(payload: &Map<String, Value>) -> Result<FlagUpdate, RejectReason> {
        if payload.len() != 3 {
            return Err(RejectReason::KeySet);
        }
        let (Some(key), Some(value), Some(version)) = (
            payload.get(FLAG_KEY),
            payload.get(VALUE_KEY),
            payload.get(VERSION_KEY),
        ) else {
            return Err(RejectReason::KeySet);
        };
        let key = key.as_str().ok_or(RejectReason::KeyType)?;
        let version = version.as_u64().ok_or(RejectReason::VersionType)?;
        let value = FlagValue::from_json(value).ok_or(RejectReason::ValueType)?;
        Ok(FlagUpdate {
            key: key.to_string(),
            value,
            version,
        })
    }

    /// Applies the version gate against whatever is currently stored for the key.
    pub fn check_version(&self, existing: Option<&FlagRecord>) -> Result<(), RejectReason> {
        match existing.and_then(|record| record.version) {
            Some(existing) if !accepts(Some(existing), self.version) => Err(RejectReason::Stale {
                existing,
                offered: self.version,
            }),
            _ => Ok(()),
        }
    }

    pub fn into_record(self) -> (String, FlagRecord) {
        (
            self.key,
            FlagRecord {
                value: self.value,
                version: Some(self.version),
            },
        )
    }
}

/// New flags and flags without a recorded version take any update; otherwise
/// the offered version must be strictly newer.
pub fn accepts(existing: Option<u64>, offered: u64) -> bool {
    match existing {
        None => true,
        Some(existing) => offered > existing,
    }
}
