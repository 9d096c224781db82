//! In-process cache of feature flag values delivered by a remote flag service.
//!
//! A [`FlagStore`] holds the current value and version of every known flag,
//! plus the provenance ([`FlagValueSource`]) of the flag set as a whole.
//! Mutations go through a single writer queue; reads never wait on it.
//!
//! ```no_run
//! use flagstore::{FlagMaintainer, FlagStore, FlagValueSource};
//! use serde_json::json;
//!
//! let store = FlagStore::new()?;
//! store.replace_store(
//!     json!({"dark-mode": true}).as_object().cloned(),
//!     FlagValueSource::Cache,
//!     None,
//! );
//! store.flush_blocking();
//!
//! let (enabled, source) = store.variation_and_source("dark-mode", false);
//! assert!(enabled);
//! assert_eq!(source, FlagValueSource::Cache);
//! # Ok::<(), flagstore::FlagStoreError>(())
//! ```

pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod record;
pub mod source;
pub mod store;
pub mod update;
pub mod value;

pub use config::StoreConfig;
pub use convert::FromFlagValue;
pub use dispatch::{Dispatcher, Job, ThreadDispatcher, TokioDispatcher};
pub use error::{FlagStoreError, Result};
pub use record::{flag_collection, parse_object, FlagCollection, FlagRecord};
pub use source::FlagValueSource;
pub use store::{Completion, FlagMaintainer, FlagSnapshot, FlagStore, FlagStoreBuilder};
pub use update::FlagUpdate;
pub use value::FlagValue;
