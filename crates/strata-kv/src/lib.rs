//! Versioned key-value storage for Strata.
//!
//! This crate defines the storage seam the tenant registry and the follower
//! protocol are written against:
//!
//! - [`VersionedStore`]: ordered multi-version storage with optimistic commits,
//!   a retained mutation log and compaction.
//! - [`Transaction`]: read-your-writes transaction that records read conflict
//!   ranges and commits through the store.
//! - [`VersionedMap`]: in-memory multi-version map used for time-travel reads.
//! - [`ChangeSink`]: receiver of a follower's snapshot and change stream.
//! - [`MemoryVersionedStore`]: deterministic in-process implementation.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! use strata_kv::{MemoryVersionedStore, Transaction};
//!
//! let store = MemoryVersionedStore::new();
//! let mut tx = Transaction::begin(&*store).await.unwrap();
//! tx.set(b"greeting", b"hello").unwrap();
//! let version = tx.commit().await.unwrap();
//!
//! let mut tx = Transaction::begin(&*store).await.unwrap();
//! assert_eq!(tx.read_version(), version);
//! assert_eq!(tx.get(b"greeting").await.unwrap(), Some(b"hello".to_vec()));
//! # });
//! ```

mod error;
mod memory;
mod store;
mod transaction;
mod types;
pub mod validation;
mod versioned_map;

pub use error::StoreError;
pub use memory::MemoryVersionedStore;
pub use store::ChangeBatch;
pub use store::ChangeSink;
pub use store::CommitRequest;
pub use store::VersionedStore;
pub use transaction::Transaction;
pub use types::KeyRange;
pub use types::KeyValue;
pub use types::Mutation;
pub use types::Version;
pub use types::VersionedMutations;
pub use versioned_map::VersionedMap;
