//! The storage seam and the change-sink seam.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::KeyRange;
use crate::types::KeyValue;
use crate::types::Mutation;
use crate::types::Version;
use crate::types::VersionedMutations;

/// Write set and conflict ranges of one optimistic transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRequest {
    /// Version the transaction read at.
    pub read_version: Version,
    /// Ranges whose contents the transaction depends on.
    pub read_conflicts: Vec<KeyRange>,
    /// Writes, applied in order.
    pub mutations: Vec<Mutation>,
}

/// A bounded slice of the mutation log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Committed versions after the requested one, in version order.
    pub changes: Vec<VersionedMutations>,
    /// Latest committed version when the batch was read.
    pub latest_version: Version,
    /// True when versions after the last returned one were left out.
    pub more: bool,
}

/// Ordered, multi-version key-value storage with optimistic commits and a
/// retained mutation log.
///
/// Reads below [`compacted_version`](VersionedStore::compacted_version) fail
/// with [`StoreError::VersionTooOld`].
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Latest committed version.
    async fn read_version(&self) -> Result<Version, StoreError>;

    /// Value of `key` as of `version`.
    async fn get(&self, key: &[u8], version: Version) -> Result<Option<Vec<u8>>, StoreError>;

    /// Key-values in `range` as of `version`, in key order, at most `limit`.
    async fn get_range(&self, range: &KeyRange, version: Version, limit: u32) -> Result<Vec<KeyValue>, StoreError>;

    /// Apply `request` atomically at a new version if none of its read
    /// conflict ranges changed after its read version.
    async fn commit(&self, request: CommitRequest) -> Result<Version, StoreError>;

    /// Committed mutation batches with versions greater than `version`.
    async fn changes_since(&self, version: Version, limit: u32) -> Result<ChangeBatch, StoreError>;

    /// Discard history and log entries older than `version`. Idempotent and
    /// monotonic; returns the resulting compacted version.
    async fn compact(&self, version: Version) -> Result<Version, StoreError>;

    /// Oldest version still readable.
    async fn compacted_version(&self) -> Result<Version, StoreError>;
}

#[async_trait]
impl<T: VersionedStore + ?Sized> VersionedStore for std::sync::Arc<T> {
    async fn read_version(&self) -> Result<Version, StoreError> {
        (**self).read_version().await
    }

    async fn get(&self, key: &[u8], version: Version) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key, version).await
    }

    async fn get_range(&self, range: &KeyRange, version: Version, limit: u32) -> Result<Vec<KeyValue>, StoreError> {
        (**self).get_range(range, version, limit).await
    }

    async fn commit(&self, request: CommitRequest) -> Result<Version, StoreError> {
        (**self).commit(request).await
    }

    async fn changes_since(&self, version: Version, limit: u32) -> Result<ChangeBatch, StoreError> {
        (**self).changes_since(version, limit).await
    }

    async fn compact(&self, version: Version) -> Result<Version, StoreError> {
        (**self).compact(version).await
    }

    async fn compacted_version(&self) -> Result<Version, StoreError> {
        (**self).compacted_version().await
    }
}

/// Receiver of a follower's snapshot and change stream.
///
/// Sinks see a snapshot first, then change batches in strictly increasing
/// version order. A new snapshot replaces everything the sink held.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Replace the sink's contents with `snapshot` as of `version`.
    async fn apply_snapshot(&self, version: Version, snapshot: &BTreeMap<Vec<u8>, Vec<u8>>);

    /// Apply mutation batches, already sorted by version.
    async fn apply_changes(&self, changes: &[VersionedMutations]);

    /// History below `version` will never be requested again.
    async fn forget_before(&self, _version: Version) {}
}

#[async_trait]
impl<T: ChangeSink + ?Sized> ChangeSink for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn apply_snapshot(&self, version: Version, snapshot: &BTreeMap<Vec<u8>, Vec<u8>>) {
        (**self).apply_snapshot(version, snapshot).await
    }

    async fn apply_changes(&self, changes: &[VersionedMutations]) {
        (**self).apply_changes(changes).await
    }

    async fn forget_before(&self, version: Version) {
        (**self).forget_before(version).await
    }
}
