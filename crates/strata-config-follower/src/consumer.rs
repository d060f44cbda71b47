//! Follower client.
//!
//! A [`ConfigConsumer`] bootstraps from a snapshot, then tails the change
//! stream, forwarding everything to its registered [`ChangeSink`]s in version
//! order.
//!
//! ```text
//! Uninitialized ──snapshot──> Synced(v) ──get_changes──> Synced(v')
//!       ^                          │
//!       └──── VersionTooOld ───────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use strata_constants::follower::DEFAULT_COMPACTION_INTERVAL_MS;
use strata_constants::follower::DEFAULT_POLL_INTERVAL_MS;
use strata_constants::follower::MAX_SYNC_PAGES;
use strata_kv::ChangeSink;
use strata_kv::Version;
use strata_kv::VersionedMutations;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::class_set::ConfigClassSet;
use crate::error::FollowerError;
use crate::interface::ConfigFollowerInterface;
use crate::protocol::CompactRequest;
use crate::protocol::GetChangesRequest;
use crate::protocol::GetSnapshotAndChangesRequest;
use crate::transport::FollowerTransport;

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub poll_interval: Duration,
    pub compaction_interval: Duration,
    /// Restrict class-scoped knobs to these classes. `None` receives all.
    pub config_classes: Option<ConfigClassSet>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            compaction_interval: Duration::from_millis(DEFAULT_COMPACTION_INTERVAL_MS),
            config_classes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Uninitialized,
    Synced { version: Version },
}

/// Follows one responder through its interface.
pub struct ConfigConsumer<T: FollowerTransport + ?Sized> {
    id: Uuid,
    interface: ConfigFollowerInterface,
    transport: Arc<T>,
    config: ConsumerConfig,
    sinks: Vec<Arc<dyn ChangeSink>>,
    state: ConsumerState,
}

impl<T: FollowerTransport + ?Sized> ConfigConsumer<T> {
    pub fn new(interface: ConfigFollowerInterface, transport: Arc<T>, config: ConsumerConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            interface,
            transport,
            config,
            sinks: Vec::new(),
            state: ConsumerState::Uninitialized,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Last version applied to the sinks.
    pub fn version(&self) -> Option<Version> {
        match self.state {
            ConsumerState::Uninitialized => None,
            ConsumerState::Synced { version } => Some(version),
        }
    }

    /// Add a sink. It receives a snapshot on the next sync.
    pub fn add_sink(&mut self, sink: Arc<dyn ChangeSink>) {
        self.sinks.push(sink);
        self.state = ConsumerState::Uninitialized;
    }

    /// Snapshot when uninitialized, otherwise drain pending changes.
    ///
    /// A `VersionTooOld` reply resets to uninitialized and snapshots again.
    pub async fn sync_once(&mut self) -> Result<Version, FollowerError> {
        let ConsumerState::Synced { version } = self.state else {
            return self.snapshot().await;
        };
        match self.tail(version).await {
            Err(FollowerError::VersionTooOld { version, oldest }) => {
                warn!(consumer_id = %self.id, version, oldest, "fell behind compaction, resnapshotting");
                self.state = ConsumerState::Uninitialized;
                self.snapshot().await
            }
            other => other,
        }
    }

    async fn snapshot(&mut self) -> Result<Version, FollowerError> {
        let request = GetSnapshotAndChangesRequest {
            consumer_id: self.id,
            config_classes: self.config.config_classes.clone(),
        };
        let reply = self.interface.get_snapshot_and_changes.get_reply(&*self.transport, request).await?;
        let snapshot_version = reply.snapshot_version;
        for sink in &self.sinks {
            sink.apply_snapshot(snapshot_version, &reply.snapshot).await;
        }
        self.state = ConsumerState::Synced {
            version: snapshot_version,
        };
        let changes = ordered_after(reply.changes, snapshot_version);
        let version = self.apply(changes).await;
        info!(
            consumer_id = %self.id,
            snapshot_version,
            version,
            most_recent_version = reply.most_recent_version,
            "follower synced from snapshot"
        );
        Ok(version)
    }

    async fn tail(&mut self, mut version: Version) -> Result<Version, FollowerError> {
        for _ in 0..MAX_SYNC_PAGES {
            let request = GetChangesRequest {
                consumer_id: self.id,
                last_seen_version: version,
                config_classes: self.config.config_classes.clone(),
            };
            let reply = self.interface.get_changes.get_reply(&*self.transport, request).await?;
            let changes = ordered_after(reply.changes, version);
            version = self.apply(changes).await;
            debug!(consumer_id = %self.id, version, most_recent_version = reply.most_recent_version, "tailed changes");
            if !reply.more {
                break;
            }
        }
        Ok(version)
    }

    /// Forward batches to every sink and advance the cursor.
    async fn apply(&mut self, changes: Vec<VersionedMutations>) -> Version {
        let current = self.version().unwrap_or_default();
        let Some(last) = changes.last().map(|batch| batch.version) else {
            return current;
        };
        for sink in &self.sinks {
            sink.apply_changes(&changes).await;
        }
        self.state = ConsumerState::Synced { version: last };
        last
    }

    /// Let the responder discard history up to the last applied version.
    /// Returns the responder's floor, or `None` before the first sync.
    pub async fn compact(&mut self) -> Result<Option<Version>, FollowerError> {
        let Some(version) = self.version() else {
            return Ok(None);
        };
        let reply = self.interface.compact.get_reply(&*self.transport, CompactRequest { version }).await?;
        let floor = reply.compacted_version.min(version);
        for sink in &self.sinks {
            sink.forget_before(floor).await;
        }
        debug!(consumer_id = %self.id, requested = version, compacted_version = reply.compacted_version, "compaction requested");
        Ok(Some(reply.compacted_version))
    }

    /// Poll and compact on the configured intervals until `shutdown` fires.
    ///
    /// Errors are logged and retried on the next tick.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut compaction = tokio::time::interval(self.config.compaction_interval);
        compaction.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; do not compact before syncing.
        compaction.tick().await;

        info!(consumer_id = %self.id, "config consumer started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = poll.tick() => {
                    if let Err(e) = self.sync_once().await {
                        warn!(consumer_id = %self.id, error = %e, "follower sync failed");
                    }
                }
                _ = compaction.tick() => {
                    if let Err(e) = self.compact().await {
                        warn!(consumer_id = %self.id, error = %e, "follower compaction failed");
                    }
                }
            }
        }
        info!(consumer_id = %self.id, version = ?self.version(), "config consumer stopped");
    }
}

/// Sort by version and drop batches at or below `version` and duplicates.
fn ordered_after(mut changes: Vec<VersionedMutations>, version: Version) -> Vec<VersionedMutations> {
    changes.retain(|batch| batch.version > version);
    changes.sort_by_key(|batch| batch.version);
    changes.dedup_by_key(|batch| batch.version);
    changes
}
