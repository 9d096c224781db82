use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

use crate::config::StoreConfig;
use crate::convert::FromFlagValue;
use crate::dispatch::{Dispatcher, Job, ThreadDispatcher};
use crate::error::{FlagStoreError, Result};
use crate::record::{flag_collection, FlagCollection};
use crate::source::FlagValueSource;
use crate::update::FlagUpdate;

/// Signals that a mutation has been processed (accepted or not).
pub type Completion = Job;

/// The flag mapping together with the provenance it was published under.
///
/// Snapshots are immutable once published, so a reader always sees the flags
/// and source of the same generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSnapshot {
    pub flags: FlagCollection,
    pub source: FlagValueSource,
}

impl FlagSnapshot {
    /// Resolves `key` as `T`, or returns `fallback` with source `Fallback`
    /// when the flag is missing or holds a different kind of value.
    pub fn lookup<T: FromFlagValue>(&self, key: &str, fallback: T) -> (T, FlagValueSource) {
        match self.flags.get(key) {
            Some(record) => match T::from_flag_value(&record.value) {
                Some(value) => (value, self.source),
                None => {
                    tracing::trace!(
                        key,
                        stored = record.value.kind(),
                        requested = std::any::type_name::<T>(),
                        "flag value does not match requested type, using fallback"
                    );
                    (fallback, FlagValueSource::Fallback)
                }
            },
            None => (fallback, FlagValueSource::Fallback),
        }
    }
}

/// The operations every flag cache offers. [`FlagStore`] is the real one;
/// collaborators can depend on this trait and substitute their own.
pub trait FlagMaintainer: Send + Sync {
    /// Current flags and their provenance.
    fn feature_flags(&self) -> Arc<FlagSnapshot>;

    fn flag_value_source(&self) -> FlagValueSource {
        self.feature_flags().source
    }

    /// Replaces all flags with `new_flags`. `None` resets to an empty store.
    fn replace_store(
        &self,
        new_flags: Option<Map<String, Value>>,
        source: FlagValueSource,
        completion: Option<Completion>,
    );

    /// Applies a `{key, value, version}` payload if it is well formed and
    /// newer than what is stored.
    fn update_store(
        &self,
        payload: Map<String, Value>,
        source: FlagValueSource,
        completion: Option<Completion>,
    );

    /// Does not remove anything yet; only signals `completion`.
    fn delete_flag(&self, key: &str, completion: Option<Completion>);

    fn variation<T: FromFlagValue>(&self, key: &str, fallback: T) -> T
    where
        Self: Sized,
    {
        self.variation_and_source(key, fallback).0
    }

    fn variation_and_source<T: FromFlagValue>(
        &self,
        key: &str,
        fallback: T,
    ) -> (T, FlagValueSource)
    where
        Self: Sized,
    {
        self.feature_flags().lookup(key, fallback)
    }
}

enum Mutation {
    Replace {
        flags: Option<Map<String, Value>>,
        source: FlagValueSource,
        completion: Option<Completion>,
    },
    Update {
        payload: Map<String, Value>,
        source: FlagValueSource,
        completion: Option<Completion>,
    },
    // Removal is not supported by the flag service yet.
    Delete {
        key: String,
        completion: Option<Completion>,
    },
    Barrier(oneshot::Sender<()>),
}

/// In-process cache of feature flag values.
///
/// Mutations are queued to a single writer thread and applied in submission
/// order. Lookups read the latest published [`FlagSnapshot`] directly and never
/// wait on the queue, so they may briefly see a state that a queued mutation
/// is about to replace.
///
/// Cloning yields another handle to the same store. The writer thread exits
/// once every handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct FlagStore {
    current: Arc<ArcSwap<FlagSnapshot>>,
    queue: mpsc::UnboundedSender<Mutation>,
}

pub struct FlagStoreBuilder {
    flags: FlagCollection,
    // `None` until `source()` is called; the config's initial source applies then.
    source: Option<FlagValueSource>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    config: StoreConfig,
}

impl FlagStoreBuilder {
    /// Seeds the store from a raw bulk flag set.
    pub fn flags(mut self, raw: Option<&Map<String, Value>>) -> Self {
        self.flags = flag_collection(raw);
        self
    }

    pub fn records(mut self, flags: FlagCollection) -> Self {
        self.flags = flags;
        self
    }

    /// Provenance of the seeded flags. Takes precedence over the config's
    /// `initial_source` regardless of call order.
    pub fn source(mut self, source: FlagValueSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Where completions run. Defaults to a [`ThreadDispatcher`].
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    pub fn config(mut self, config: &StoreConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn build(self) -> Result<FlagStore> {
        let dispatcher: Arc<dyn Dispatcher> = match self.dispatcher {
            Some(d) => d,
            None => Arc::new(ThreadDispatcher::with_label(&self.config.dispatcher_label)?),
        };
        let current = Arc::new(ArcSwap::from_pointee(FlagSnapshot {
            flags: self.flags,
            source: self.source.unwrap_or(self.config.initial_source),
        }));
        let (queue, rx) = mpsc::unbounded_channel();
        let worker = FlagQueue {
            current: current.clone(),
            dispatcher,
            rx,
        };
        thread::Builder::new()
            .name(self.config.queue_label.clone())
            .spawn(move || worker.run())
            .map_err(FlagStoreError::Spawn)?;
        Ok(FlagStore { current, queue })
    }
}

impl FlagStore {
    /// An empty store reporting source `Fallback`.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> FlagStoreBuilder {
        FlagStoreBuilder {
            flags: FlagCollection::new(),
            source: None,
            dispatcher: None,
            config: StoreConfig::default(),
        }
    }

    /// Resolves once every mutation submitted before this call has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(Mutation::Barrier(tx));
        let _ = rx.await;
    }

    /// Blocking form of [`flush`](Self::flush). Must not be called from
    /// within an async context.
    pub fn flush_blocking(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(Mutation::Barrier(tx));
        let _ = rx.blocking_recv();
    }

    fn submit(&self, mutation: Mutation) {
        if self.queue.send(mutation).is_err() {
            tracing::warn!("flag queue has stopped, dropping mutation");
        }
    }
}

impl FlagMaintainer for FlagStore {
    fn feature_flags(&self) -> Arc<FlagSnapshot> {
        self.current.load_full()
    }

    fn flag_value_source(&self) -> FlagValueSource {
        self.current.load().source
    }

    fn replace_store(
        &self,
        new_flags: Option<Map<String, Value>>,
        source: FlagValueSource,
        completion: Option<Completion>,
    ) {
        self.submit(Mutation::Replace {
            flags: new_flags,
            source,
            completion,
        });
    }

    fn update_store(
        &self,
        payload: Map<String, Value>,
        source: FlagValueSource,
        completion: Option<Completion>,
    ) {
        self.submit(Mutation::Update {
            payload,
            source,
            completion,
        });
    }

    fn delete_flag(&self, key: &str, completion: Option<Completion>) {
        self.submit(Mutation::Delete {
            key: key.to_string(),
            completion,
        });
    }

    fn variation_and_source<T: FromFlagValue>(
        &self,
        key: &str,
        fallback: T,
    ) -> (T, FlagValueSource) {
        self.current.load().lookup(key, fallback)
    }
}

/// The single writer. Owns the receiving end of the mutation queue.
struct FlagQueue {
    current: Arc<ArcSwap<FlagSnapshot>>,
    dispatcher: Arc<dyn Dispatcher>,
    rx: mpsc::UnboundedReceiver<Mutation>,
}

impl FlagQueue {
    fn run(mut self) {
        while let Some(mutation) = self.rx.blocking_recv() {
            let completion = match mutation {
                Mutation::Replace {
                    flags,
                    source,
                    completion,
                } => {
                    self.replace(flags.as_ref(), source);
                    completion
                }
                Mutation::Update {
                    payload,
                    source,
                    completion,
                } => {
                    self.update(&payload, source);
                    completion
                }
                Mutation::Delete { key, completion } => {
                    tracing::debug!(key = %key, "flag deletion is not supported, ignoring");
                    completion
                }
                Mutation::Barrier(tx) => {
                    let _ = tx.send(());
                    None
                }
            };
            if let Some(completion) = completion {
                self.dispatcher.dispatch(completion);
            }
        }
        tracing::trace!("flag queue stopped");
    }

    fn replace(&self, raw: Option<&Map<String, Value>>, source: FlagValueSource) {
        let flags = flag_collection(raw);
        tracing::debug!(count = flags.len(), source = %source, "replacing flag store");
        self.current.store(Arc::new(FlagSnapshot { flags, source }));
    }

    // The store-wide source is left as is: only a replacement changes it.
    fn update(&self, payload: &Map<String, Value>, source: FlagValueSource) {
        let update = match FlagUpdate::parse(payload) {
            Ok(update) => update,
            Err(reason) => {
                tracing::debug!(reason = %reason, "ignoring malformed flag update");
                return;
            }
        };
        let current = self.current.load_full();
        if let Err(reason) = update.check_version(current.flags.get(&update.key)) {
            tracing::debug!(key = %update.key, reason = %reason, "ignoring stale flag update");
            return;
        }
        tracing::debug!(
            key = %update.key,
            version = update.version,
            source = %source,
            "applying flag update"
        );
        // Copy-on-write: O(n) per accepted update, cheap at flag-set sizes.
        let mut flags = current.flags.clone();
        let (key, record) = update.into_record();
        flags.insert(key, record);
        self.current.store(Arc::new(FlagSnapshot {
            flags,
            source: current.source,
        }));
    }
}
