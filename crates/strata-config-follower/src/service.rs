//! Responder side of the follower protocol.
//!
//! [`ConfigFollowerService`] answers the three follower calls from a
//! [`VersionedStore`]: snapshots are read at the store's compaction floor and
//! shipped with every later batch, change tails come straight from the store's
//! mutation log, and compaction forwards to the store subject to the
//! [`CompactionPolicy`].

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use strata_constants::MAX_RANGE_RESULTS;
use strata_constants::follower::DEFAULT_CHANGES_PER_REPLY;
use strata_constants::follower::DEFAULT_FOLLOWER_LEASE_MS;
use strata_constants::follower::MAX_CHANGES_PER_REPLY;
use strata_constants::follower::MAX_SNAPSHOT_ATTEMPTS;
use strata_constants::follower::MAX_SNAPSHOT_CHANGES;
use strata_constants::follower::MAX_SNAPSHOT_KEYS;
use strata_constants::follower::MAX_TRACKED_CONSUMERS;
use strata_constants::follower::SNAPSHOT_END_KEY;
use strata_kv::KeyRange;
use strata_kv::StoreError;
use strata_kv::Version;
use strata_kv::VersionedMutations;
use strata_kv::VersionedStore;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;
use uuid::Uuid;

use crate::error::FollowerError;
use crate::knobs::filter_changes;
use crate::knobs::filter_snapshot;
use crate::protocol::CompactReply;
use crate::protocol::CompactRequest;
use crate::protocol::FollowerRequest;
use crate::protocol::FollowerResponse;
use crate::protocol::GetChangesReply;
use crate::protocol::GetChangesRequest;
use crate::protocol::GetSnapshotAndChangesReply;
use crate::protocol::GetSnapshotAndChangesRequest;
use crate::transport::FollowerHandler;

/// How `compact` treats followers that have not caught up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionPolicy {
    /// Never compact past the cursor of a consumer seen within the lease.
    #[default]
    HoldForActiveFollowers,
    /// Compact as requested; laggards re-snapshot.
    ForceResnapshot,
}

/// Responder configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Batches per `get_changes` reply, capped at `MAX_CHANGES_PER_REPLY`.
    pub max_changes_per_reply: u32,
    /// A consumer not heard from for this long stops holding back compaction.
    pub follower_lease: Duration,
    pub compaction_policy: CompactionPolicy,
    /// Largest snapshot served, capped at `MAX_SNAPSHOT_KEYS`. Larger
    /// snapshots fail with `SnapshotTooLarge`.
    pub max_snapshot_keys: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_changes_per_reply: DEFAULT_CHANGES_PER_REPLY,
            follower_lease: Duration::from_millis(DEFAULT_FOLLOWER_LEASE_MS),
            compaction_policy: CompactionPolicy::default(),
            max_snapshot_keys: MAX_SNAPSHOT_KEYS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ConsumerCursor {
    /// Oldest version the consumer may still ask changes after.
    version: Version,
    last_seen: Instant,
}

/// Serves snapshots, change tails and compaction from a versioned store.
pub struct ConfigFollowerService<S: VersionedStore + ?Sized> {
    store: Arc<S>,
    config: ServiceConfig,
    cursors: Mutex<HashMap<Uuid, ConsumerCursor>>,
}

impl<S: VersionedStore + ?Sized> ConfigFollowerService<S> {
    pub fn new(store: Arc<S>, config: ServiceConfig) -> Self {
        Self {
            store,
            config,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Number of consumers currently tracked.
    pub async fn tracked_consumers(&self) -> usize {
        self.cursors.lock().await.len()
    }

    /// Full snapshot plus every later batch.
    ///
    /// The snapshot is read at the compaction floor. When more than
    /// `MAX_SNAPSHOT_CHANGES` batches follow it, the snapshot is read at the
    /// latest version instead and no batches are sent.
    #[instrument(skip(self, request), fields(consumer_id = %request.consumer_id))]
    pub async fn get_snapshot_and_changes(
        &self,
        request: GetSnapshotAndChangesRequest,
    ) -> Result<GetSnapshotAndChangesReply, FollowerError> {
        let classes = request.config_classes.as_ref();
        let mut attempt = 0;
        let mut reply = loop {
            attempt += 1;
            match self.read_snapshot_and_changes().await {
                Ok(reply) => break reply,
                // Compaction moved the floor between our reads.
                Err(FollowerError::VersionTooOld { .. }) if attempt < MAX_SNAPSHOT_ATTEMPTS => {
                    debug!(attempt, "snapshot raced compaction, retrying");
                }
                Err(e) => return Err(e),
            }
        };
        filter_snapshot(classes, &mut reply.snapshot);
        filter_changes(classes, &mut reply.changes);

        self.touch(request.consumer_id, reply.end_version()).await;
        debug!(
            snapshot_version = reply.snapshot_version,
            keys = reply.snapshot.len(),
            changes = reply.changes.len(),
            most_recent_version = reply.most_recent_version,
            "served snapshot"
        );
        Ok(reply)
    }

    async fn read_snapshot_and_changes(&self) -> Result<GetSnapshotAndChangesReply, FollowerError> {
        let floor = self.store.compacted_version().await?;
        let batch = self.store.changes_since(floor, MAX_SNAPSHOT_CHANGES).await?;
        if batch.more {
            let latest = batch.latest_version;
            warn!(floor, latest, "change backlog too long, snapshotting at latest version");
            let snapshot = self.read_snapshot(latest).await?;
            return Ok(GetSnapshotAndChangesReply {
                snapshot_version: latest,
                snapshot,
                changes: Vec::new(),
                most_recent_version: latest,
            });
        }
        let snapshot = self.read_snapshot(floor).await?;
        Ok(GetSnapshotAndChangesReply {
            snapshot_version: floor,
            snapshot,
            changes: batch.changes,
            most_recent_version: batch.latest_version,
        })
    }

    /// Every key below `SNAPSHOT_END_KEY` at `version`. Never truncated: a
    /// snapshot over the key limit fails instead.
    async fn read_snapshot(&self, version: Version) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, FollowerError> {
        let max = self.config.max_snapshot_keys.min(MAX_SNAPSHOT_KEYS) as usize;
        let mut snapshot = BTreeMap::new();
        let mut range = KeyRange::new(Vec::new(), SNAPSHOT_END_KEY);
        loop {
            // One key past the limit is enough to know it is exceeded.
            let limit = (max - snapshot.len() + 1).min(MAX_RANGE_RESULTS as usize) as u32;
            let page = self.store.get_range(&range, version, limit).await?;
            let full = page.len() as u32 == limit;
            let Some(last) = page.last() else { break };
            let mut next = last.key.clone();
            next.push(0);
            for kv in page {
                snapshot.insert(kv.key, kv.value);
            }
            if snapshot.len() > max {
                warn!(version, max, "snapshot exceeds key limit");
                return Err(FollowerError::SnapshotTooLarge { version, max });
            }
            if !full {
                break;
            }
            range.begin = next;
        }
        Ok(snapshot)
    }

    /// Batches after `last_seen_version`, at most `max_changes_per_reply`.
    #[instrument(skip(self, request), fields(consumer_id = %request.consumer_id, last_seen_version = request.last_seen_version))]
    pub async fn get_changes(&self, request: GetChangesRequest) -> Result<GetChangesReply, FollowerError> {
        let limit = self.config.max_changes_per_reply.clamp(1, MAX_CHANGES_PER_REPLY);
        let batch = match self.store.changes_since(request.last_seen_version, limit).await {
            Ok(batch) => batch,
            Err(StoreError::VersionTooOld { version, oldest }) => {
                warn!(version, oldest, "follower fell behind compaction");
                return Err(FollowerError::VersionTooOld { version, oldest });
            }
            Err(e) => return Err(e.into()),
        };
        let mut changes: Vec<VersionedMutations> = batch.changes;
        filter_changes(request.config_classes.as_ref(), &mut changes);
        let reply = GetChangesReply {
            changes,
            most_recent_version: batch.latest_version,
            more: batch.more,
        };
        self.touch(request.consumer_id, reply.end_version(request.last_seen_version)).await;
        debug!(changes = reply.changes.len(), more = reply.more, "served changes");
        Ok(reply)
    }

    /// Discard history at or before `version`, subject to the policy.
    /// Idempotent and monotonic: the floor never moves back.
    #[instrument(skip(self))]
    pub async fn compact(&self, request: CompactRequest) -> Result<CompactReply, FollowerError> {
        let target = match self.config.compaction_policy {
            CompactionPolicy::ForceResnapshot => request.version,
            CompactionPolicy::HoldForActiveFollowers => match self.min_active_cursor().await {
                Some(held) if held < request.version => {
                    debug!(requested = request.version, held, "compaction held for active follower");
                    held
                }
                _ => request.version,
            },
        };
        let before = self.store.compacted_version().await?;
        let compacted_version = self.store.compact(target).await?;
        if compacted_version > before {
            info!(from = before, to = compacted_version, "compacted follower history");
        }
        Ok(CompactReply { compacted_version })
    }

    async fn min_active_cursor(&self) -> Option<Version> {
        let mut cursors = self.cursors.lock().await;
        let lease = self.config.follower_lease;
        cursors.retain(|id, cursor| {
            let live = cursor.last_seen.elapsed() <= lease;
            if !live {
                debug!(consumer_id = %id, version = cursor.version, "follower lease expired");
            }
            live
        });
        cursors.values().map(|cursor| cursor.version).min()
    }

    async fn touch(&self, consumer_id: Uuid, version: Version) {
        let mut cursors = self.cursors.lock().await;
        let now = Instant::now();
        if !cursors.contains_key(&consumer_id) && cursors.len() >= MAX_TRACKED_CONSUMERS as usize {
            let stalest = cursors.iter().min_by_key(|(_, cursor)| cursor.last_seen).map(|(id, _)| *id);
            if let Some(evicted) = stalest {
                cursors.remove(&evicted);
                warn!(consumer_id = %evicted, "consumer table full, evicted stalest follower");
            }
        }
        cursors.insert(consumer_id, ConsumerCursor {
            version,
            last_seen: now,
        });
    }
}

#[async_trait]
impl<S: VersionedStore + ?Sized + 'static> FollowerHandler for ConfigFollowerService<S> {
    async fn handle(&self, request: FollowerRequest) -> Result<FollowerResponse, FollowerError> {
        match request {
            FollowerRequest::GetSnapshotAndChanges(req) => {
                self.get_snapshot_and_changes(req).await.map(FollowerResponse::GetSnapshotAndChanges)
            }
            FollowerRequest::GetChanges(req) => self.get_changes(req).await.map(FollowerResponse::GetChanges),
            FollowerRequest::Compact(req) => self.compact(req).await.map(FollowerResponse::Compact),
        }
    }
}
