//! In-memory reference implementation of [`VersionedStore`].

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use strata_constants::MAX_RANGE_RESULTS;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::store::ChangeBatch;
use crate::store::CommitRequest;
use crate::store::VersionedStore;
use crate::types::KeyRange;
use crate::types::KeyValue;
use crate::types::Mutation;
use crate::types::Version;
use crate::types::VersionedMutations;
use crate::validation::validate_commit;
use crate::versioned_map::VersionedMap;

struct StoreState {
    data: VersionedMap<Vec<u8>, Vec<u8>>,
    /// Commits after `data.oldest_version()`, in version order.
    log: VecDeque<VersionedMutations>,
}

/// A deterministic in-memory versioned store.
///
/// Every commit gets the next integer version. A commit conflicts when any
/// mutation logged after its read version touches one of its read conflict
/// ranges.
pub struct MemoryVersionedStore {
    state: RwLock<StoreState>,
}

impl Default for MemoryVersionedStore {
    fn default() -> Self {
        Self::new_inner()
    }
}

impl MemoryVersionedStore {
    /// Create a new empty store wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::new_inner())
    }

    fn new_inner() -> Self {
        Self {
            state: RwLock::new(StoreState {
                data: VersionedMap::new(),
                log: VecDeque::new(),
            }),
        }
    }
}

#[async_trait]
impl VersionedStore for MemoryVersionedStore {
    async fn read_version(&self) -> Result<Version, StoreError> {
        Ok(self.state.read().await.data.latest_version())
    }

    async fn get(&self, key: &[u8], version: Version) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.state.read().await;
        Ok(state.data.read_at(version, &key.to_vec())?.cloned())
    }

    async fn get_range(&self, range: &KeyRange, version: Version, limit: u32) -> Result<Vec<KeyValue>, StoreError> {
        if range.end < range.begin {
            return Err(StoreError::InvalidRange);
        }
        let limit = limit.min(MAX_RANGE_RESULTS) as usize;
        let state = self.state.read().await;
        let entries = state.data.range_at(version, range.begin.clone()..range.end.clone(), limit)?;
        Ok(entries.into_iter().map(|(key, value)| KeyValue { key, value }).collect())
    }

    async fn commit(&self, request: CommitRequest) -> Result<Version, StoreError> {
        validate_commit(&request)?;
        let mut state = self.state.write().await;
        let latest = state.data.latest_version();

        if request.read_version > latest {
            return Err(StoreError::FutureVersion {
                version: request.read_version,
                latest,
            });
        }
        if request.read_version < state.data.oldest_version() {
            return Err(StoreError::VersionTooOld {
                version: request.read_version,
                oldest: state.data.oldest_version(),
            });
        }

        let conflicted = state.log.iter().filter(|entry| entry.version > request.read_version).any(|entry| {
            entry
                .mutations
                .iter()
                .any(|m| request.read_conflicts.iter().any(|range| range.contains(m.key())))
        });
        if conflicted {
            debug!(read_version = request.read_version, latest, "commit conflict");
            return Err(StoreError::Conflict {
                read_version: request.read_version,
                committed_version: latest,
            });
        }

        if request.mutations.is_empty() {
            return Ok(latest);
        }

        let version = latest + 1;
        state.data.create_new_version(version)?;
        for mutation in &request.mutations {
            match mutation {
                Mutation::Set { key, value } => state.data.insert(key.clone(), value.clone()),
                Mutation::Clear { key } => state.data.erase(key),
            }
        }
        state.log.push_back(VersionedMutations {
            version,
            mutations: request.mutations,
        });
        debug!(version, "committed");
        Ok(version)
    }

    async fn changes_since(&self, version: Version, limit: u32) -> Result<ChangeBatch, StoreError> {
        let state = self.state.read().await;
        let oldest = state.data.oldest_version();
        if version < oldest {
            return Err(StoreError::VersionTooOld { version, oldest });
        }
        let mut newer = state.log.iter().filter(|entry| entry.version > version);
        let changes: Vec<VersionedMutations> = newer.by_ref().take(limit as usize).cloned().collect();
        let more = newer.next().is_some();
        Ok(ChangeBatch {
            changes,
            latest_version: state.data.latest_version(),
            more,
        })
    }

    async fn compact(&self, version: Version) -> Result<Version, StoreError> {
        let mut state = self.state.write().await;
        let before = state.data.oldest_version();
        state.data.forget_versions_before(version);
        let floor = state.data.oldest_version();
        while state.log.front().is_some_and(|entry| entry.version <= floor) {
            state.log.pop_front();
        }
        if floor > before {
            debug!(from = before, to = floor, "compacted store");
        }
        Ok(floor)
    }

    async fn compacted_version(&self) -> Result<Version, StoreError> {
        Ok(self.state.read().await.data.oldest_version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &[u8], value: &[u8]) -> Mutation {
        Mutation::Set {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    async fn commit_writes(store: &MemoryVersionedStore, mutations: Vec<Mutation>) -> Version {
        let read_version = store.read_version().await.unwrap();
        store
            .commit(CommitRequest {
                read_version,
                read_conflicts: vec![],
                mutations,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_versions_increase() {
        let store = MemoryVersionedStore::new();
        assert_eq!(store.read_version().await.unwrap(), 0);
        assert_eq!(commit_writes(&store, vec![set(b"a", b"1")]).await, 1);
        assert_eq!(commit_writes(&store, vec![set(b"a", b"2")]).await, 2);
        assert_eq!(store.get(b"a", 1).await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"a", 2).await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_read_only_commit_keeps_version() {
        let store = MemoryVersionedStore::new();
        commit_writes(&store, vec![set(b"a", b"1")]).await;
        assert_eq!(commit_writes(&store, vec![]).await, 1);
    }

    #[tokio::test]
    async fn test_conflict_detected() {
        let store = MemoryVersionedStore::new();
        commit_writes(&store, vec![set(b"counter", b"0")]).await;
        let stale = store.read_version().await.unwrap();
        commit_writes(&store, vec![set(b"counter", b"1")]).await;

        let err = store
            .commit(CommitRequest {
                read_version: stale,
                read_conflicts: vec![KeyRange::single(b"counter")],
                mutations: vec![set(b"counter", b"2")],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { read_version: 1, .. }));
    }

    #[tokio::test]
    async fn test_disjoint_writes_do_not_conflict() {
        let store = MemoryVersionedStore::new();
        let stale = store.read_version().await.unwrap();
        commit_writes(&store, vec![set(b"other", b"x")]).await;
        let version = store
            .commit(CommitRequest {
                read_version: stale,
                read_conflicts: vec![KeyRange::single(b"mine")],
                mutations: vec![set(b"mine", b"y")],
            })
            .await
            .unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn test_get_range_with_limit() {
        let store = MemoryVersionedStore::new();
        commit_writes(&store, vec![set(b"k1", b"1"), set(b"k2", b"2"), set(b"k3", b"3"), set(b"z", b"z")]).await;
        let range = KeyRange::prefix(b"k");
        let all = store.get_range(&range, 1, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        let two = store.get_range(&range, 1, 2).await.unwrap();
        assert_eq!(two.iter().map(|kv| kv.key.clone()).collect::<Vec<_>>(), vec![b"k1".to_vec(), b"k2".to_vec()]);
    }

    #[tokio::test]
    async fn test_changes_since_and_more() {
        let store = MemoryVersionedStore::new();
        for i in 0..5u8 {
            commit_writes(&store, vec![set(&[i], &[i])]).await;
        }
        let batch = store.changes_since(1, 2).await.unwrap();
        assert_eq!(batch.changes.iter().map(|c| c.version).collect::<Vec<_>>(), vec![2, 3]);
        assert!(batch.more);
        assert_eq!(batch.latest_version, 5);

        let tail = store.changes_since(3, 10).await.unwrap();
        assert_eq!(tail.changes.len(), 2);
        assert!(!tail.more);
    }

    #[tokio::test]
    async fn test_compaction_floor() {
        let store = MemoryVersionedStore::new();
        for i in 0..5u8 {
            commit_writes(&store, vec![set(b"k", &[i])]).await;
        }
        assert_eq!(store.compact(3).await.unwrap(), 3);
        // Idempotent and monotonic.
        assert_eq!(store.compact(3).await.unwrap(), 3);
        assert_eq!(store.compact(1).await.unwrap(), 3);

        assert_eq!(store.get(b"k", 3).await.unwrap(), Some(vec![2]));
        assert!(matches!(store.get(b"k", 2).await, Err(StoreError::VersionTooOld { version: 2, oldest: 3 })));
        assert!(matches!(store.changes_since(2, 10).await, Err(StoreError::VersionTooOld { .. })));

        let batch = store.changes_since(3, 10).await.unwrap();
        assert_eq!(batch.changes.iter().map(|c| c.version).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_commit_below_floor_rejected() {
        let store = MemoryVersionedStore::new();
        for i in 0..3u8 {
            commit_writes(&store, vec![set(b"k", &[i])]).await;
        }
        store.compact(2).await.unwrap();
        let err = store
            .commit(CommitRequest {
                read_version: 1,
                read_conflicts: vec![],
                mutations: vec![set(b"k", b"late")],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionTooOld { version: 1, oldest: 2 }));
    }
}
