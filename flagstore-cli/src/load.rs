use std::collections::BTreeMap;

use flagstore::{
    parse_object, FlagMaintainer, FlagStore, FlagStoreError, FlagValue, FlagValueSource,
};
use serde_json::Value;

async fn read_file(path: &str) -> Result<String, FlagStoreError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| FlagStoreError::Io {
            path: path.to_string(),
            source: e,
        })
}

/// Replace the store's flags with the JSON object in `path`.
pub async fn load_flags(
    store: &FlagStore,
    path: &str,
    source: FlagValueSource,
) -> Result<usize, FlagStoreError> {
    let flags = parse_object(&read_file(path).await?)?;
    let count = flags.len();
    store.replace_store(Some(flags), source, None);
    Ok(count)
}

/// Submit every line of a JSON-lines file as an update payload.
///
/// Lines that are not JSON objects are skipped with a warning; payloads the
/// store rejects are dropped by the store itself.
pub async fn apply_updates(
    store: &FlagStore,
    path: &str,
    source: FlagValueSource,
) -> Result<usize, FlagStoreError> {
    let content = read_file(path).await?;
    Ok(submit_update_lines(store, &content, source))
}

pub fn submit_update_lines(store: &FlagStore, content: &str, source: FlagValueSource) -> usize {
    let mut submitted = 0;
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_object(line) {
            Ok(payload) => {
                store.update_store(payload, source, None);
                submitted += 1;
            }
            Err(e) => tracing::warn!(line = n + 1, error = %e, "skipping update line"),
        }
    }
    submitted
}

/// Resolve `key` as the same kind of value as `fallback`.
///
/// Without a fallback any stored value is accepted.
pub fn resolve(
    store: &FlagStore,
    key: &str,
    fallback: Option<FlagValue>,
) -> (Option<FlagValue>, FlagValueSource) {
    let Some(fallback) = fallback else {
        let snapshot = store.feature_flags();
        return match snapshot.flags.get(key) {
            Some(record) => (Some(record.value.clone()), snapshot.source),
            None => (None, FlagValueSource::Fallback),
        };
    };
    let (value, source) = match fallback {
        FlagValue::Bool(b) => {
            let (v, s) = store.variation_and_source(key, b);
            (FlagValue::Bool(v), s)
        }
        FlagValue::Int(i) => {
            let (v, s) = store.variation_and_source(key, i);
            (FlagValue::Int(v), s)
        }
        FlagValue::Double(d) => {
            let (v, s) = store.variation_and_source(key, d);
            (FlagValue::Double(v), s)
        }
        FlagValue::String(text) => {
            let (v, s) = store.variation_and_source(key, text);
            (FlagValue::String(v), s)
        }
        FlagValue::Array(items) => {
            let (v, s) = store.variation_and_source::<Vec<FlagValue>>(key, items);
            (FlagValue::Array(v), s)
        }
        FlagValue::Dictionary(map) => {
            let (v, s) = store.variation_and_source::<BTreeMap<String, FlagValue>>(key, map);
            (FlagValue::Dictionary(v), s)
        }
    };
    (Some(value), source)
}

/// The store's flags as a JSON object of `{value, version}` records.
pub fn dump(store: &FlagStore) -> Result<Value, serde_json::Error> {
    let snapshot = store.feature_flags();
    Ok(serde_json::json!({
        "source": snapshot.source,
        "flags": serde_json::to_value(&snapshot.flags)?,
    }))
}
