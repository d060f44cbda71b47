//! Compile-time constant assertions.

use super::api::*;
use super::follower::*;
use super::tenant::*;

// ============================================================================
// Size Limits
// ============================================================================

const _: () = assert!(MAX_KEY_SIZE > 0);
const _: () = assert!(MAX_KEY_SIZE < MAX_VALUE_SIZE);
const _: () = assert!(MAX_MUTATIONS_PER_COMMIT > 0);
const _: () = assert!(DEFAULT_RANGE_LIMIT > 0);
const _: () = assert!(DEFAULT_RANGE_LIMIT <= MAX_RANGE_RESULTS);
const _: () = assert!(MAX_READ_CONFLICT_RANGES > 0);
const _: () = assert!(!RESERVED_KEY_PREFIX.is_empty());

// ============================================================================
// Tenant Registry
// ============================================================================

// Tenant prefix is a big-endian i64.
const _: () = assert!(TENANT_PREFIX_SIZE == 8);
const _: () = assert!(MAX_TENANT_NAME_SIZE < MAX_KEY_SIZE);
const _: () = assert!(MAX_TENANT_LIST_RESULTS <= MAX_RANGE_RESULTS);
const _: () = assert!(TRANSACTION_RETRY_INITIAL_BACKOFF_MS <= TRANSACTION_RETRY_MAX_BACKOFF_MS);
const _: () = assert!(MAX_TRANSACTION_RETRIES > 0);

// ============================================================================
// Follower Protocol
// ============================================================================

const _: () = assert!(DEFAULT_CHANGES_PER_REPLY > 0);
const _: () = assert!(DEFAULT_CHANGES_PER_REPLY <= MAX_CHANGES_PER_REPLY);
const _: () = assert!(DEFAULT_POLL_INTERVAL_MS > 0);
const _: () = assert!(DEFAULT_POLL_INTERVAL_MS < DEFAULT_COMPACTION_INTERVAL_MS);
const _: () = assert!(DEFAULT_COMPACTION_INTERVAL_MS < DEFAULT_FOLLOWER_LEASE_MS);
const _: () = assert!(MAX_TRACKED_CONSUMERS > 0);
const _: () = assert!(MAX_SNAPSHOT_ATTEMPTS > 0);
const _: () = assert!(MAX_SYNC_PAGES > 0);
const _: () = assert!(MAX_SNAPSHOT_CHANGES <= MAX_CHANGES_PER_REPLY);
