use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::value::FlagValue;

/// Types a stored flag value can be read back as.
///
/// Extraction succeeds only when the stored value can be read as `Self`
/// without loss. Integers and doubles are both numbers and convert into each
/// other when exact. A mismatch yields `None` and the caller's fallback is used
/// instead; nothing else is coerced (no string to number, no number to bool).
pub trait FromFlagValue: Sized {
    fn from_flag_value(value: &FlagValue) -> Option<Self>;
}

impl FromFlagValue for FlagValue {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromFlagValue for bool {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        match value {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// 2^63, the first double past `i64::MAX` (which itself has no exact `f64` form).
const I64_END: f64 = 9_223_372_036_854_775_808.0;

/// A double with no fractional part inside `[min, max)`.
fn whole_double(d: f64, min: f64, max: f64) -> bool {
    d.fract() == 0.0 && d >= min && d < max
}

impl FromFlagValue for i64 {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        match value {
            FlagValue::Int(i) => Some(*i),
            FlagValue::Double(d) if whole_double(*d, i64::MIN as f64, I64_END) => Some(*d as i64),
            _ => None,
        }
    }
}

impl FromFlagValue for i32 {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        match value {
            FlagValue::Int(i) => i32::try_from(*i).ok(),
            FlagValue::Double(d) if whole_double(*d, i32::MIN as f64, i32::MAX as f64 + 1.0) => {
                Some(*d as i32)
            }
            _ => None,
        }
    }
}

/// Largest magnitude below which every integer has an exact `f64` form.
const F64_EXACT_INT: u64 = 1 << 53;

impl FromFlagValue for f64 {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        match value {
            FlagValue::Double(d) => Some(*d),
            FlagValue::Int(i) if i.unsigned_abs() <= F64_EXACT_INT => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromFlagValue for String {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        match value {
            FlagValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromFlagValue for Value {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        Some(value.to_json())
    }
}

impl<T: FromFlagValue> FromFlagValue for Vec<T> {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        match value {
            FlagValue::Array(items) => items.iter().map(T::from_flag_value).collect(),
            _ => None,
        }
    }
}

impl<T: FromFlagValue> FromFlagValue for BTreeMap<String, T> {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        match value {
            FlagValue::Dictionary(map) => map
                .iter()
                .map(|(k, v)| T::from_flag_value(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => None,
        }
    }
}

impl<T: FromFlagValue> FromFlagValue for HashMap<String, T> {
    fn from_flag_value(value: &FlagValue) -> Option<Self> {
        match value {
            FlagValue::Dictionary(map) => map
                .iter()
                .map(|(k, v)| T::from_flag_value(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => None,
        }
    }
}
