//! Tenant registry constants.
//!
//! The keyspace literals are part of the persisted layout and must never
//! change between releases.

/// Size in bytes of the id-derived tenant prefix.
pub const TENANT_PREFIX_SIZE: usize = 8;

/// Default root subspace of the tenant registry (`\xff/`).
pub const DEFAULT_REGISTRY_ROOT: &[u8] = b"\xff/";

/// Suffix of the name -> entry map.
pub const TENANT_MAP_SUFFIX: &[u8] = b"tenantMap/";

/// Key (relative to the root) of the last allocated tenant id.
pub const TENANT_LAST_ID_SUFFIX: &[u8] = b"tenantLastId";

/// Suffix of the (group, name) secondary index.
pub const TENANT_GROUP_INDEX_SUFFIX: &[u8] = b"tenant/tenantGroup/tenantIndex/";

/// Suffix of the retired-id tombstone set.
pub const TENANT_TOMBSTONES_SUFFIX: &[u8] = b"/tenant/tombstones/";

/// Maximum size of a tenant or tenant group name in bytes.
pub const MAX_TENANT_NAME_SIZE: u32 = 1024;

/// Maximum number of tenants returned by a single list call.
pub const MAX_TENANT_LIST_RESULTS: u32 = 10_000;

/// Maximum number of tombstoned ids skipped by one allocation.
///
/// The counter only moves forward, so a tombstone at the next candidate
/// indicates a restored or corrupted counter.
pub const MAX_TOMBSTONE_SKIPS: u32 = 1_000;

// ============================================================================
// Transaction Retry Policy
// ============================================================================

/// Maximum commit attempts for one tenant management operation.
pub const MAX_TRANSACTION_RETRIES: u32 = 100;

/// Initial backoff after a commit conflict.
pub const TRANSACTION_RETRY_INITIAL_BACKOFF_MS: u64 = 1;

/// Upper bound for the conflict backoff.
pub const TRANSACTION_RETRY_MAX_BACKOFF_MS: u64 = 128;
