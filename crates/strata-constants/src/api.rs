//! Storage API bounds.
//!
//! Tiger Style: Constants are fixed and immutable, enforced at compile time.

// ============================================================================
// Key-Value Size Limits
// ============================================================================

/// Maximum size of a single key in bytes (10 KB).
///
/// Applied to every mutation before it reaches the store.
pub const MAX_KEY_SIZE: u32 = 10 * 1024;

/// Maximum size of a single value in bytes (100 KB).
pub const MAX_VALUE_SIZE: u32 = 100 * 1024;

/// Maximum number of mutations in a single commit.
///
/// Tiger Style: Bounds the size of one entry in the mutation log.
pub const MAX_MUTATIONS_PER_COMMIT: u32 = 10_000;

/// Maximum number of read conflict ranges recorded by one transaction.
pub const MAX_READ_CONFLICT_RANGES: u32 = 10_000;

/// Prefix no stored key may start with. Everything below it is replicated to
/// followers.
pub const RESERVED_KEY_PREFIX: &[u8] = b"\xff\xff";

// ============================================================================
// Range Reads
// ============================================================================

/// Maximum number of key-value pairs returned by a single range read.
pub const MAX_RANGE_RESULTS: u32 = 10_000;

/// Default range read limit when the caller does not specify one.
pub const DEFAULT_RANGE_LIMIT: u32 = 1_000;
