//! Storage errors.

use snafu::Snafu;

use crate::types::Version;

/// Errors returned by [`VersionedStore`](crate::VersionedStore) and
/// [`VersionedMap`](crate::VersionedMap) operations.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// A key in the read set was written after the transaction's read version.
    #[snafu(display("transaction conflict at read version {read_version} (committed through {committed_version})"))]
    Conflict {
        /// Read version of the failed transaction.
        read_version: Version,
        /// Latest committed version at the time of the check.
        committed_version: Version,
    },

    /// The requested version has been compacted away.
    #[snafu(display("version {version} is older than the oldest retained version {oldest}"))]
    VersionTooOld {
        /// Requested version.
        version: Version,
        /// Oldest version still readable.
        oldest: Version,
    },

    /// The requested version has not been committed yet.
    #[snafu(display("version {version} is newer than the latest version {latest}"))]
    FutureVersion {
        /// Requested version.
        version: Version,
        /// Latest committed version.
        latest: Version,
    },

    /// A new version must be strictly greater than the latest one.
    #[snafu(display("version {version} does not advance past latest version {latest}"))]
    NonMonotonicVersion {
        /// Rejected version.
        version: Version,
        /// Latest version.
        latest: Version,
    },

    /// Key exceeds the size limit.
    #[snafu(display("key size {size} exceeds maximum {max}"))]
    KeyTooLarge {
        /// Actual size in bytes.
        size: u32,
        /// Limit in bytes.
        max: u32,
    },

    /// Key falls in the reserved `\xff\xff` keyspace.
    #[snafu(display("key starts with the reserved prefix \\xff\\xff"))]
    ReservedKey,

    /// Value exceeds the size limit.
    #[snafu(display("value size {size} exceeds maximum {max}"))]
    ValueTooLarge {
        /// Actual size in bytes.
        size: u32,
        /// Limit in bytes.
        max: u32,
    },

    /// Commit carries more mutations than allowed.
    #[snafu(display("commit has {count} mutations, maximum is {max}"))]
    TooManyMutations {
        /// Mutations in the commit.
        count: u32,
        /// Limit.
        max: u32,
    },

    /// Commit carries more read conflict ranges than allowed.
    #[snafu(display("commit has {count} read conflict ranges, maximum is {max}"))]
    TooManyConflictRanges {
        /// Conflict ranges in the commit.
        count: u32,
        /// Limit.
        max: u32,
    },

    /// Range end sorts before its begin.
    #[snafu(display("invalid key range: end sorts before begin"))]
    InvalidRange,
}
