//! Configuration follower protocol constants.

/// Knob subspace inside the shared keyspace (`\xff/knobs/`).
pub const KNOB_SUBSPACE: &[u8] = b"\xff/knobs/";

/// Maximum number of versioned mutation batches in one `get_changes` reply.
pub const MAX_CHANGES_PER_REPLY: u32 = 10_000;

/// Default number of batches per `get_changes` reply.
pub const DEFAULT_CHANGES_PER_REPLY: u32 = 1_000;

/// Maximum trailing batches shipped with a snapshot.
///
/// Beyond this the responder snapshots at the latest version instead.
pub const MAX_SNAPSHOT_CHANGES: u32 = 10_000;

/// Maximum number of keys in one snapshot reply.
pub const MAX_SNAPSHOT_KEYS: u32 = 1_000_000;

/// Maximum number of consumer cursors tracked by a responder.
pub const MAX_TRACKED_CONSUMERS: u32 = 1_024;

/// Maximum number of configuration classes in a `ConfigClassSet`.
pub const MAX_CONFIG_CLASSES: u32 = 256;

/// Default follower poll interval (1 second).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default follower compaction interval (60 seconds).
pub const DEFAULT_COMPACTION_INTERVAL_MS: u64 = 60_000;

/// Default lease after which an idle consumer no longer holds back compaction.
pub const DEFAULT_FOLLOWER_LEASE_MS: u64 = 5 * 60_000;

/// Maximum size of an encoded follower frame (64 MB).
pub const MAX_FOLLOWER_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Exclusive upper bound of snapshot reads. Stores reject keys at or above
/// it, so a snapshot covers every stored key.
pub const SNAPSHOT_END_KEY: &[u8] = crate::api::RESERVED_KEY_PREFIX;

/// Attempts at reading a consistent snapshot while compaction races it.
pub const MAX_SNAPSHOT_ATTEMPTS: u32 = 8;

/// Maximum `get_changes` pages a consumer drains in one sync.
pub const MAX_SYNC_PAGES: u32 = 64;
