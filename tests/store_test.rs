use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use flagstore::{
    Completion, FlagMaintainer, FlagRecord, FlagStore, FlagValue, FlagValueSource,
    TokioDispatcher,
};
use serde_json::{json, Map, Value};

const WAIT: Duration = Duration::from_secs(5);

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// A completion that reports on `rx` when it runs.
fn signal() -> (Completion, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel();
    (Box::new(move || tx.send(()).unwrap()), rx)
}

fn replaced(flags: Value, source: FlagValueSource) -> FlagStore {
    let store = FlagStore::new().unwrap();
    let (done, rx) = signal();
    store.replace_store(flags.as_object().cloned(), source, Some(done));
    rx.recv_timeout(WAIT).unwrap();
    store
}

fn update(store: &FlagStore, payload: Value) {
    let (done, rx) = signal();
    store.update_store(object(payload), FlagValueSource::Server, Some(done));
    rx.recv_timeout(WAIT).unwrap();
}

#[test]
fn test_replace_installs_every_flag() {
    let store = replaced(
        json!({
            "bool-flag": true,
            "int-flag": 5000,
            "double-flag": 0.25,
            "string-flag": "dark",
            "array-flag": [1, 2, 3],
            "dict-flag": {"region": "eu"},
        }),
        FlagValueSource::Server,
    );

    assert_eq!(
        store.variation_and_source("bool-flag", false),
        (true, FlagValueSource::Server)
    );
    assert_eq!(store.variation("int-flag", 0i64), 5000);
    assert_eq!(store.variation("double-flag", 1.0), 0.25);
    assert_eq!(store.variation("string-flag", String::from("light")), "dark");
    assert_eq!(store.variation("array-flag", Vec::<i64>::new()), vec![1, 2, 3]);
    let dict: HashMap<String, String> = store.variation("dict-flag", HashMap::new());
    assert_eq!(dict["region"], "eu");
    assert_eq!(
        store.variation_and_source("unknown", 7i64),
        (7, FlagValueSource::Fallback)
    );
}

#[test]
fn test_replace_discards_previous_flags_and_versions() {
    let store = replaced(
        json!({"a": {"value": 1, "version": 10}, "b": true}),
        FlagValueSource::Server,
    );
    let (done, rx) = signal();
    store.replace_store(
        Some(object(json!({"a": {"value": 2, "version": 3}}))),
        FlagValueSource::Cache,
        Some(done),
    );
    rx.recv_timeout(WAIT).unwrap();

    let snapshot = store.feature_flags();
    assert_eq!(snapshot.source, FlagValueSource::Cache);
    assert_eq!(snapshot.flags.len(), 1);
    assert_eq!(snapshot.flags["a"], FlagRecord::new(2i64, Some(3)));
    assert_eq!(store.variation_and_source("b", false), (false, FlagValueSource::Fallback));
}

#[test]
fn test_replace_with_none_clears_state() {
    let store = replaced(json!({"a": true}), FlagValueSource::Cache);
    let (done, rx) = signal();
    store.replace_store(None, FlagValueSource::Server, Some(done));
    rx.recv_timeout(WAIT).unwrap();

    assert!(store.feature_flags().flags.is_empty());
    assert_eq!(store.variation_and_source("a", false), (false, FlagValueSource::Fallback));
    assert_eq!(store.flag_value_source(), FlagValueSource::Server);
}

#[test]
fn test_update_with_newer_version_is_accepted() {
    let store = replaced(json!({"k": {"value": "old", "version": 5}}), FlagValueSource::Server);
    update(&store, json!({"key": "k", "value": "new", "version": 6}));
    assert_eq!(store.variation("k", String::new()), "new");
    assert_eq!(store.feature_flags().flags["k"].version, Some(6));
}

#[test]
fn test_update_with_same_or_older_version_is_rejected() {
    let store = replaced(json!({"k": {"value": "old", "version": 5}}), FlagValueSource::Server);
    update(&store, json!({"key": "k", "value": "same", "version": 5}));
    update(&store, json!({"key": "k", "value": "older", "version": 4}));
    assert_eq!(store.feature_flags().flags["k"], FlagRecord::new("old", Some(5)));
}

#[test]
fn test_update_for_new_key_ignores_version() {
    let store = FlagStore::new().unwrap();
    update(&store, json!({"key": "k", "value": 1, "version": 0}));
    assert_eq!(store.feature_flags().flags["k"], FlagRecord::new(1i64, Some(0)));
}

#[test]
fn test_update_for_unversioned_flag_is_accepted() {
    let store = replaced(json!({"k": "cached"}), FlagValueSource::Cache);
    update(&store, json!({"key": "k", "value": "live", "version": 1}));
    assert_eq!(store.variation("k", String::new()), "live");
}

#[test]
fn test_malformed_update_is_a_no_op_but_completes() {
    let store = replaced(json!({"k": {"value": 1, "version": 1}}), FlagValueSource::Server);
    let before = store.feature_flags();

    for payload in [
        json!({"key": "k", "value": 9}),
        json!({"key": "k", "value": 9, "version": "2"}),
        json!({"key": "k", "value": 9, "version": 2, "extra": true}),
        json!({"key": 1, "value": 9, "version": 2}),
        json!({"key": "k", "value": null, "version": 2}),
    ] {
        update(&store, payload);
    }
    assert_eq!(*store.feature_flags(), *before);
}

#[test]
fn test_type_mismatch_returns_fallback() {
    let store = replaced(json!({"k": "hello"}), FlagValueSource::Server);
    assert_eq!(store.variation_and_source("k", 42i64), (42, FlagValueSource::Fallback));
    // the stored value is untouched by the failed read
    assert_eq!(store.variation("k", String::new()), "hello");
}

#[test]
fn test_numbers_convert_between_int_and_double_when_exact() {
    let store = replaced(
        json!({"whole": 3.0, "int": 3, "half": 3.5}),
        FlagValueSource::Server,
    );
    assert_eq!(store.variation_and_source("whole", 0i64), (3, FlagValueSource::Server));
    assert_eq!(store.variation_and_source("whole", 0i32), (3, FlagValueSource::Server));
    assert_eq!(store.variation_and_source("int", 0.0), (3.0, FlagValueSource::Server));
    assert_eq!(store.variation_and_source("half", 0i64), (0, FlagValueSource::Fallback));
    assert_eq!(store.variation_and_source("half", 0.0), (3.5, FlagValueSource::Server));
}

#[test]
fn test_delete_is_inert_and_completes_once() {
    let store = replaced(json!({"k": {"value": true, "version": 2}}), FlagValueSource::Server);
    let before = store.feature_flags();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    store.delete_flag(
        "k",
        Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
    );
    store.flush_blocking();
    let (done, rx) = signal();
    store.delete_flag("other", Some(done));
    rx.recv_timeout(WAIT).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*store.feature_flags(), *before);
}

#[test]
fn test_ordered_updates_from_two_threads() {
    let store = FlagStore::new().unwrap();
    update(&store, json!({"key": "k", "value": "v1", "version": 1}));

    let (submitted_tx, submitted_rx) = mpsc::channel();
    let first = {
        let store = store.clone();
        thread::spawn(move || {
            store.update_store(
                object(json!({"key": "k", "value": "v2", "version": 2})),
                FlagValueSource::Server,
                None,
            );
            submitted_tx.send(()).unwrap();
        })
    };
    let second = {
        let store = store.clone();
        thread::spawn(move || {
            submitted_rx.recv().unwrap();
            store.update_store(
                object(json!({"key": "k", "value": "v3", "version": 3})),
                FlagValueSource::Server,
                None,
            );
        })
    };
    first.join().unwrap();
    second.join().unwrap();
    store.flush_blocking();

    assert_eq!(store.feature_flags().flags["k"], FlagRecord::new("v3", Some(3)));
}

#[test]
fn test_concurrent_updates_keep_highest_version() {
    let store = FlagStore::new().unwrap();
    let threads = 8;
    let per_thread = 50u64;
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads as u64)
        .map(|t| {
            let store = store.clone();
            let start = start.clone();
            thread::spawn(move || {
                start.wait();
                for i in 0..per_thread {
                    // interleave versions across threads
                    let version = i * threads as u64 + t + 1;
                    store.update_store(
                        object(json!({"key": "k", "value": version, "version": version})),
                        FlagValueSource::Server,
                        None,
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    store.flush_blocking();

    let max = per_thread * threads as u64;
    assert_eq!(store.variation("k", 0i64), max as i64);
    assert_eq!(store.feature_flags().flags["k"].version, Some(max));
}

#[test]
fn test_readers_never_see_a_torn_snapshot() {
    let store = FlagStore::new().unwrap();
    let rounds = 200i64;

    let reader = {
        let store = store.clone();
        thread::spawn(move || {
            for _ in 0..2_000 {
                let snapshot = store.feature_flags();
                let a = snapshot.flags.get("a").map(|r| r.value.clone());
                let b = snapshot.flags.get("b").map(|r| r.value.clone());
                assert_eq!(a, b);
                if let Some(FlagValue::Int(n)) = a {
                    let expected = if n % 2 == 0 {
                        FlagValueSource::Cache
                    } else {
                        FlagValueSource::Server
                    };
                    assert_eq!(snapshot.source, expected);
                }
            }
        })
    };

    for n in 0..rounds {
        let source = if n % 2 == 0 {
            FlagValueSource::Cache
        } else {
            FlagValueSource::Server
        };
        store.replace_store(Some(object(json!({"a": n, "b": n}))), source, None);
    }
    reader.join().unwrap();
    store.flush_blocking();
    assert_eq!(store.variation("a", -1i64), rounds - 1);
}

#[test]
fn test_update_does_not_change_store_source() {
    // Incremental updates keep the provenance of the last full replacement.
    let store = replaced(json!({"a": 1}), FlagValueSource::Cache);
    update(&store, json!({"key": "b", "value": 2, "version": 1}));
    assert_eq!(store.flag_value_source(), FlagValueSource::Cache);
    assert_eq!(store.variation_and_source("b", 0i64), (2, FlagValueSource::Cache));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_and_tokio_completions() {
    let store = FlagStore::builder()
        .dispatcher(TokioDispatcher::current())
        .build()
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    store.replace_store(
        Some(object(json!({"rollout": 0.5}))),
        FlagValueSource::Server,
        Some(Box::new(move || {
            let _ = tx.send(());
        })),
    );
    rx.await.unwrap();
    assert_eq!(store.variation("rollout", 0.0), 0.5);

    store.update_store(
        object(json!({"key": "rollout", "value": 0.75, "version": 2})),
        FlagValueSource::Server,
        None,
    );
    store.flush().await;
    assert_eq!(store.variation("rollout", 0.0), 0.75);
}
