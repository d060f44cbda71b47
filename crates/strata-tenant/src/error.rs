//! Tenant errors.

use snafu::Snafu;
use strata_kv::StoreError;

use crate::state::TenantState;

/// Errors from tenant encoding, registry access and lifecycle operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TenantError {
    /// A tenant prefix is not exactly 8 bytes or decodes to a negative id.
    #[snafu(display("malformed tenant prefix: {reason}"))]
    MalformedPrefix { reason: String },

    /// A stored entry failed validation while decoding.
    #[snafu(display("corrupt tenant entry: {reason}"))]
    CorruptEntry { reason: String },

    /// A registry key could not be decoded.
    #[snafu(display("corrupt registry key: {reason}"))]
    CorruptKey { reason: String },

    /// An entry violates the prefix invariant and cannot be encoded.
    #[snafu(display("invalid tenant entry: {reason}"))]
    InvalidEntry { reason: String },

    /// Entry was written with a protocol version this build cannot read.
    #[snafu(display("unsupported tenant entry protocol version 0x{version:016X}"))]
    UnsupportedProtocolVersion { version: u64 },

    /// postcard failure on an entry or value body.
    #[snafu(display("serialization error: {source}"))]
    Serialization { source: postcard::Error },

    /// The tenant id has been retired.
    #[snafu(display("tenant id {id} has been removed"))]
    TenantRemoved { id: i64 },

    /// No tenant with this name (or id) exists.
    #[snafu(display("tenant '{name}' not found"))]
    TenantNotFound { name: String },

    /// A tenant with this name exists with a different configuration.
    #[snafu(display("tenant '{name}' already exists"))]
    TenantAlreadyExists { name: String },

    /// Keys remain under the tenant prefix.
    #[snafu(display("tenant '{name}' is not empty"))]
    TenantNotEmpty { name: String },

    /// Tenant or group name is empty, too long, or reserved.
    #[snafu(display("invalid tenant name '{name}': {reason}"))]
    InvalidTenantName { name: String, reason: String },

    /// Unknown canonical state name.
    #[snafu(display("invalid tenant state '{value}'"))]
    InvalidTenantState { value: String },

    /// Requested lifecycle transition is not allowed.
    #[snafu(display("tenant '{name}' cannot move from {from} to {to}"))]
    InvalidStateTransition {
        name: String,
        from: TenantState,
        to: TenantState,
    },

    /// Operation is not allowed in the tenant's current state.
    #[snafu(display("cannot {operation} tenant '{name}' in state {state}"))]
    InvalidTenantOperation {
        name: String,
        state: TenantState,
        operation: String,
    },

    /// The id counter cannot advance further.
    #[snafu(display("tenant id space exhausted after {last_id}"))]
    TenantIdExhausted { last_id: i64 },

    /// Commit conflicts persisted past the retry limit.
    #[snafu(display("max retries exceeded for {operation}: {attempts} attempts"))]
    MaxRetriesExceeded { operation: String, attempts: u32 },

    /// Underlying store failure.
    #[snafu(display("storage error: {source}"))]
    Storage { source: StoreError },
}

impl From<StoreError> for TenantError {
    fn from(source: StoreError) -> Self {
        TenantError::Storage { source }
    }
}

impl TenantError {
    /// True for commit conflicts, which succeed on a fresh read version.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TenantError::Storage {
            source: StoreError::Conflict { .. }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_retryable() {
        let err = TenantError::from(StoreError::Conflict {
            read_version: 3,
            committed_version: 4,
        });
        assert!(err.is_retryable());
        assert!(!TenantError::TenantRemoved { id: 1 }.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = TenantError::InvalidStateTransition {
            name: "alpha".to_string(),
            from: TenantState::Removing,
            to: TenantState::Ready,
        };
        assert_eq!(err.to_string(), "tenant 'alpha' cannot move from removing to ready");
        let err = TenantError::UnsupportedProtocolVersion { version: 1 };
        assert_eq!(err.to_string(), "unsupported tenant entry protocol version 0x0000000000000001");
    }
}
