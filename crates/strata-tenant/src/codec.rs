//! Tenant id to key prefix mapping.
//!
//! A tenant id is a non-negative `i64`. Its prefix is the 8-byte big-endian
//! encoding, so prefixes of non-negative ids sort in id order.

use std::fmt;

use strata_constants::TENANT_PREFIX_SIZE;

use crate::error::TenantError;

/// Tenant identifier. Valid ids are non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(pub i64);

impl TenantId {
    /// Sentinel id of an entry that has not been assigned one.
    pub const UNASSIGNED: TenantId = TenantId(-1);

    /// True for ids that can own a prefix.
    pub fn is_assigned(self) -> bool {
        self.0 >= 0
    }

    /// The id as a raw integer.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        TenantId(id)
    }
}

/// Encode an id as its 8-byte prefix.
pub fn id_to_prefix(id: TenantId) -> [u8; TENANT_PREFIX_SIZE] {
    id.0.to_be_bytes()
}

/// Decode an 8-byte prefix back into a tenant id.
pub fn prefix_to_id(prefix: &[u8]) -> Result<TenantId, TenantError> {
    let bytes: [u8; TENANT_PREFIX_SIZE] = prefix.try_into().map_err(|_| TenantError::MalformedPrefix {
        reason: format!("expected {TENANT_PREFIX_SIZE} bytes, got {}", prefix.len()),
    })?;
    let id = i64::from_be_bytes(bytes);
    if id < 0 {
        return Err(TenantError::MalformedPrefix {
            reason: format!("decoded negative id {id}"),
        });
    }
    Ok(TenantId(id))
}

/// Owning tenant of a key stored under `tenant_subspace ++ prefix ++ ...`.
pub fn key_prefix_to_id(tenant_subspace: &[u8], key: &[u8]) -> Result<TenantId, TenantError> {
    let rest = key.strip_prefix(tenant_subspace).ok_or_else(|| TenantError::MalformedPrefix {
        reason: "key is outside the tenant subspace".to_string(),
    })?;
    let prefix = rest.get(..TENANT_PREFIX_SIZE).ok_or_else(|| TenantError::MalformedPrefix {
        reason: format!("key has {} bytes after the tenant subspace", rest.len()),
    })?;
    prefix_to_id(prefix)
}

/// Value codec of the `last_tenant_id` counter: the same 8-byte encoding as
/// tenant prefixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantIdCodec;

impl TenantIdCodec {
    pub fn pack(id: TenantId) -> Vec<u8> {
        id_to_prefix(id).to_vec()
    }

    pub fn unpack(value: &[u8]) -> Result<TenantId, TenantError> {
        prefix_to_id(value)
    }
}
