use std::env;
use std::io::ErrorKind;

use serde::Deserialize;

use crate::dispatch::DEFAULT_DISPATCHER_LABEL;
use crate::error::{FlagStoreError, Result};
use crate::source::FlagValueSource;

pub const DEFAULT_QUEUE_LABEL: &str = "flagstore.flag-queue";

/// Store settings, read from a TOML file such as:
///
/// ```toml
/// queue_label = "flagstore.flag-queue"
/// dispatcher_label = "flagstore.completions"
/// initial_source = "cache"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name of the thread that applies mutations.
    pub queue_label: String,
    /// Name of the default completion thread.
    pub dispatcher_label: String,
    /// Provenance reported for the flags the store is seeded with.
    pub initial_source: FlagValueSource,
}

fn default_queue_label() -> String {
    DEFAULT_QUEUE_LABEL.to_string()
}

fn default_dispatcher_label() -> String {
    DEFAULT_DISPATCHER_LABEL.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            queue_label: default_queue_label(),
            dispatcher_label: default_dispatcher_label(),
            initial_source: FlagValueSource::default(),
        }
    }
}

impl StoreConfig {
    /// Loads configuration from a TOML file. A missing file yields defaults;
    /// an unreadable or malformed one is an error.
    pub fn load(path: &str) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(FlagStoreError::Io {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `FLAGSTORE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, val) in vars {
            match key.as_str() {
                "FLAGSTORE_QUEUE_LABEL" if !val.trim().is_empty() => {
                    self.queue_label = val.trim().to_string();
                }
                "FLAGSTORE_DISPATCHER_LABEL" if !val.trim().is_empty() => {
                    self.dispatcher_label = val.trim().to_string();
                }
                "FLAGSTORE_INITIAL_SOURCE" => match val.parse() {
                    Ok(source) => self.initial_source = source,
                    Err(e) => tracing::warn!(error = %e, "ignoring FLAGSTORE_INITIAL_SOURCE"),
                },
                _ => {}
            }
        }
    }
}
