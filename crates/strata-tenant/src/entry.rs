//! The stored record for one tenant.
//!
//! Wire format: an 8-byte little-endian protocol version followed by a
//! postcard body. Only the subspace part of the prefix is stored; the 8 id
//! bytes are rebuilt from `id` on decode.
//!
//! | Version | Body |
//! |---------|------|
//! | `PROTOCOL_VERSION_WITH_TENANTS` | `(id, subspace, state, assigned_cluster)` |
//! | `PROTOCOL_VERSION_WITH_TENANT_GROUPS` and later | `(id, subspace, tenant_group, state, assigned_cluster)` |

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use strata_constants::TENANT_PREFIX_SIZE;

use crate::codec::TenantId;
use crate::codec::id_to_prefix;
use crate::error::SerializationSnafu;
use crate::error::TenantError;
use crate::name::TenantGroupName;
use crate::state::TenantState;

/// First protocol version that stores tenant entries.
pub const PROTOCOL_VERSION_WITH_TENANTS: u64 = 0x0FDB_00B0_7101_0000;

/// First protocol version whose entries carry a tenant group.
pub const PROTOCOL_VERSION_WITH_TENANT_GROUPS: u64 = 0x0FDB_00B0_7200_0000;

const VERSION_HEADER_SIZE: usize = 8;

/// Metadata record for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantMapEntry {
    pub id: TenantId,
    /// `subspace ++ id_to_prefix(id)`, or empty while `id` is unassigned.
    pub prefix: Vec<u8>,
    pub tenant_group: Option<TenantGroupName>,
    pub tenant_state: TenantState,
    /// Placement hint; not part of the tenant's configuration.
    pub assigned_cluster: Option<Vec<u8>>,
}

impl Default for TenantMapEntry {
    fn default() -> Self {
        Self {
            id: TenantId::UNASSIGNED,
            prefix: Vec::new(),
            tenant_group: None,
            tenant_state: TenantState::Ready,
            assigned_cluster: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct EntryBody {
    id: i64,
    subspace: Vec<u8>,
    tenant_group: Option<Vec<u8>>,
    tenant_state: u8,
    assigned_cluster: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct EntryBodyWithoutGroup {
    id: i64,
    subspace: Vec<u8>,
    tenant_state: u8,
    assigned_cluster: Option<Vec<u8>>,
}

impl From<EntryBodyWithoutGroup> for EntryBody {
    fn from(body: EntryBodyWithoutGroup) -> Self {
        EntryBody {
            id: body.id,
            subspace: body.subspace,
            tenant_group: None,
            tenant_state: body.tenant_state,
            assigned_cluster: body.assigned_cluster,
        }
    }
}

impl TenantMapEntry {
    /// Entry for `id` whose prefix lives under `subspace`.
    pub fn new(id: TenantId, subspace: &[u8], tenant_state: TenantState) -> Self {
        Self::with_group(id, subspace, None, tenant_state)
    }

    /// Entry for `id` in an optional tenant group.
    pub fn with_group(
        id: TenantId,
        subspace: &[u8],
        tenant_group: Option<TenantGroupName>,
        tenant_state: TenantState,
    ) -> Self {
        let mut entry = Self {
            id,
            prefix: Vec::new(),
            tenant_group,
            tenant_state,
            assigned_cluster: None,
        };
        entry.set_subspace(subspace);
        entry
    }

    /// Rebuild the prefix as `subspace ++ id_to_prefix(id)`.
    pub fn set_subspace(&mut self, subspace: &[u8]) {
        let mut prefix = Vec::with_capacity(subspace.len() + TENANT_PREFIX_SIZE);
        prefix.extend_from_slice(subspace);
        prefix.extend_from_slice(&id_to_prefix(self.id));
        self.prefix = prefix;
    }

    /// The prefix without its trailing id bytes.
    pub fn subspace(&self) -> &[u8] {
        &self.prefix[..self.prefix.len().saturating_sub(TENANT_PREFIX_SIZE)]
    }

    /// True when the configurable fields match. Id, prefix, state and the
    /// assigned cluster are not configuration.
    pub fn matches_configuration(&self, other: &TenantMapEntry) -> bool {
        self.tenant_group == other.tenant_group
    }

    fn check_prefix(&self) -> Result<(), TenantError> {
        let valid = self.prefix.len() >= TENANT_PREFIX_SIZE || (self.prefix.is_empty() && self.id == TenantId::UNASSIGNED);
        if !valid {
            return Err(TenantError::InvalidEntry {
                reason: format!("prefix of {} bytes for tenant id {}", self.prefix.len(), self.id),
            });
        }
        Ok(())
    }

    /// Serialize with a version header.
    pub fn encode(&self) -> Result<Vec<u8>, TenantError> {
        self.check_prefix()?;
        let body = EntryBody {
            id: self.id.get(),
            subspace: self.subspace().to_vec(),
            tenant_group: self.tenant_group.clone(),
            tenant_state: self.tenant_state.as_u8(),
            assigned_cluster: self.assigned_cluster.clone(),
        };
        let payload = postcard::to_allocvec(&body).context(SerializationSnafu)?;
        let mut out = Vec::with_capacity(VERSION_HEADER_SIZE + payload.len());
        out.extend_from_slice(&PROTOCOL_VERSION_WITH_TENANT_GROUPS.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Deserialize a value written by [`encode`](Self::encode) or by an
    /// older writer.
    pub fn decode(value: &[u8]) -> Result<Self, TenantError> {
        let (header, payload) = value.split_at_checked(VERSION_HEADER_SIZE).ok_or_else(|| TenantError::CorruptEntry {
            reason: format!("value of {} bytes has no version header", value.len()),
        })?;
        let mut version_bytes = [0u8; VERSION_HEADER_SIZE];
        version_bytes.copy_from_slice(header);
        let version = u64::from_le_bytes(version_bytes);

        let body: EntryBody = if version >= PROTOCOL_VERSION_WITH_TENANT_GROUPS {
            postcard::from_bytes(payload).context(SerializationSnafu)?
        } else if version >= PROTOCOL_VERSION_WITH_TENANTS {
            postcard::from_bytes::<EntryBodyWithoutGroup>(payload).context(SerializationSnafu)?.into()
        } else {
            return Err(TenantError::UnsupportedProtocolVersion { version });
        };

        let mut entry = TenantMapEntry {
            id: TenantId(body.id),
            prefix: Vec::new(),
            tenant_group: body.tenant_group,
            tenant_state: TenantState::from_u8(body.tenant_state)?,
            assigned_cluster: body.assigned_cluster,
        };
        if entry.id.is_assigned() {
            entry.set_subspace(&body.subspace);
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn encode_body<T: Serialize>(version: u64, body: &T) -> Vec<u8> {
        let mut out = version.to_le_bytes().to_vec();
        out.extend(postcard::to_allocvec(body).unwrap());
        out
    }

    #[test]
    fn test_new_entry_prefix() {
        let entry = TenantMapEntry::new(TenantId(1), b"t/", TenantState::Registering);
        assert_eq!(entry.prefix, b"t/\x00\x00\x00\x00\x00\x00\x00\x01".to_vec());
        assert_eq!(entry.subspace(), b"t/");
    }

    #[test]
    fn test_default_entry_encodes() {
        let entry = TenantMapEntry::default();
        let decoded = TenantMapEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
        assert!(decoded.prefix.is_empty());
    }

    #[test]
    fn test_roundtrip_with_group_and_cluster() {
        let mut entry = TenantMapEntry::with_group(TenantId(7), b"", Some(b"g1".to_vec()), TenantState::Ready);
        entry.assigned_cluster = Some(b"cluster-a".to_vec());
        let bytes = entry.encode().unwrap();
        assert_eq!(&bytes[..8], &PROTOCOL_VERSION_WITH_TENANT_GROUPS.to_le_bytes());
        assert_eq!(TenantMapEntry::decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_short_prefix_rejected() {
        let mut entry = TenantMapEntry::new(TenantId(3), b"", TenantState::Ready);
        entry.prefix.truncate(4);
        assert!(matches!(entry.encode(), Err(TenantError::InvalidEntry { .. })));
    }

    #[test]
    fn test_corrupt_state_byte() {
        let body = EntryBody {
            id: 1,
            subspace: Vec::new(),
            tenant_group: None,
            tenant_state: 99,
            assigned_cluster: None,
        };
        let bytes = encode_body(PROTOCOL_VERSION_WITH_TENANT_GROUPS, &body);
        assert!(matches!(TenantMapEntry::decode(&bytes), Err(TenantError::CorruptEntry { .. })));
    }

    #[test]
    fn test_decode_without_group_field() {
        #[derive(Serialize)]
        struct Legacy {
            id: i64,
            subspace: Vec<u8>,
            tenant_state: u8,
            assigned_cluster: Option<Vec<u8>>,
        }
        let bytes = encode_body(PROTOCOL_VERSION_WITH_TENANTS, &Legacy {
            id: 5,
            subspace: b"s".to_vec(),
            tenant_state: TenantState::Removing.as_u8(),
            assigned_cluster: None,
        });
        let entry = TenantMapEntry::decode(&bytes).unwrap();
        assert_eq!(entry.id, TenantId(5));
        assert_eq!(entry.tenant_group, None);
        assert_eq!(entry.tenant_state, TenantState::Removing);
        assert_eq!(entry.subspace(), b"s");
    }

    #[test]
    fn test_old_protocol_version() {
        let bytes = encode_body(PROTOCOL_VERSION_WITH_TENANTS - 1, &0u8);
        assert!(matches!(
            TenantMapEntry::decode(&bytes),
            Err(TenantError::UnsupportedProtocolVersion { .. })
        ));
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(TenantMapEntry::decode(&[1, 2, 3]), Err(TenantError::CorruptEntry { .. })));
    }

    #[test]
    fn test_matches_configuration() {
        let a = TenantMapEntry::with_group(TenantId(1), b"", Some(b"g".to_vec()), TenantState::Ready);
        let b = TenantMapEntry::with_group(TenantId(2), b"x", Some(b"g".to_vec()), TenantState::Registering);
        let c = TenantMapEntry::with_group(TenantId(1), b"", Some(b"h".to_vec()), TenantState::Ready);
        assert!(a.matches_configuration(&b));
        assert!(!a.matches_configuration(&c));
    }

    fn arb_state() -> impl Strategy<Value = TenantState> {
        prop::sample::select(TenantState::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_entry_roundtrip(
            id in 0i64..=i64::MAX,
            subspace in prop::collection::vec(any::<u8>(), 0..16),
            group in prop::option::of(prop::collection::vec(any::<u8>(), 1..16)),
            state in arb_state(),
            cluster in prop::option::of(prop::collection::vec(any::<u8>(), 0..16)),
        ) {
            let mut entry = TenantMapEntry::with_group(TenantId(id), &subspace, group, state);
            entry.assigned_cluster = cluster;
            let decoded = TenantMapEntry::decode(&entry.encode().unwrap()).unwrap();
            prop_assert_eq!(&decoded.prefix, &entry.prefix);
            prop_assert!(decoded.prefix.len() >= TENANT_PREFIX_SIZE);
            prop_assert_eq!(decoded, entry);
        }
    }
}
