use thiserror::Error;

/// Errors from the fallible edges around the store: loading configuration and
/// reading raw flag documents. The store's own operations never fail.
#[derive(Debug, Error)]
pub enum FlagStoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("unknown flag value source '{0}' (expected fallback, cache or server)")]
    InvalidSource(String),
}

pub type Result<T, E = FlagStoreError> = std::result::Result<T, E>;
