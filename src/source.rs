use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FlagStoreError;

/// Where a returned flag value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagValueSource {
    /// The caller-supplied default; the store had no usable value.
    #[default]
    Fallback,
    /// A previously persisted or bootstrapped flag set.
    Cache,
    /// A live update from the flag service.
    Server,
}

impl FlagValueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagValueSource::Fallback => "fallback",
            FlagValueSource::Cache => "cache",
            FlagValueSource::Server => "server",
        }
    }
}

impl fmt::Display for FlagValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagValueSource {
    type Err = FlagStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fallback" => Ok(FlagValueSource::Fallback),
            "cache" => Ok(FlagValueSource::Cache),
            "server" => Ok(FlagValueSource::Server),
            other => Err(FlagStoreError::InvalidSource(other.to_string())),
        }
    }
}
