//! Keyspace layout of the tenant registry.
//!
//! Under a root subspace (default `\xff/`):
//!
//! | Container | Key | Value |
//! |-----------|-----|-------|
//! | `tenant_map` | `tenantMap/` ++ name | encoded [`TenantMapEntry`] |
//! | `last_tenant_id` | `tenantLastId` | 8-byte big-endian id |
//! | `tenant_group_tenant_index` | `tenant/tenantGroup/tenantIndex/` ++ tuple(group, name) | empty |
//! | `tenant_tombstones` | `/tenant/tombstones/` ++ tuple(id) | empty |
//!
//! The four containers are only ever written together, inside one transaction.

use strata_constants::tenant::DEFAULT_REGISTRY_ROOT;
use strata_constants::tenant::TENANT_GROUP_INDEX_SUFFIX;
use strata_constants::tenant::TENANT_LAST_ID_SUFFIX;
use strata_constants::tenant::TENANT_MAP_SUFFIX;
use strata_constants::tenant::TENANT_TOMBSTONES_SUFFIX;
use strata_kv::KeyRange;
use strata_layer::Subspace;
use strata_layer::Tuple;

use crate::codec::TenantIdCodec;
use crate::entry::TenantMapEntry;
use crate::error::TenantError;
use crate::key_backed::Int64Codec;
use crate::key_backed::KeyBackedObjectMap;
use crate::key_backed::KeyBackedProperty;
use crate::key_backed::KeyBackedSet;
use crate::key_backed::NullCodec;
use crate::key_backed::TenantEntryCodec;
use crate::key_backed::TupleCodec;
use crate::name::TenantGroupName;
use crate::name::TenantName;

/// Name to entry map.
pub type TenantMapContainer = KeyBackedObjectMap<NullCodec, TenantEntryCodec>;

/// The four registry containers bound to one root subspace.
#[derive(Debug, Clone)]
pub struct TenantMetadataSpecification {
    root: Subspace,
    pub tenant_map: TenantMapContainer,
    pub last_tenant_id: KeyBackedProperty<TenantIdCodec>,
    pub tenant_group_tenant_index: KeyBackedSet<TupleCodec>,
    pub tenant_tombstones: KeyBackedSet<Int64Codec>,
}

impl Default for TenantMetadataSpecification {
    fn default() -> Self {
        Self::new(Subspace::from_bytes(DEFAULT_REGISTRY_ROOT))
    }
}

impl TenantMetadataSpecification {
    /// Bind the registry under `root`.
    pub fn new(root: Subspace) -> Self {
        Self {
            tenant_map: KeyBackedObjectMap::new(root.with_suffix(TENANT_MAP_SUFFIX)),
            last_tenant_id: KeyBackedProperty::new(root.key(TENANT_LAST_ID_SUFFIX)),
            tenant_group_tenant_index: KeyBackedSet::new(root.with_suffix(TENANT_GROUP_INDEX_SUFFIX)),
            tenant_tombstones: KeyBackedSet::new(root.with_suffix(TENANT_TOMBSTONES_SUFFIX)),
            root,
        }
    }

    pub fn root(&self) -> &Subspace {
        &self.root
    }

    /// Index member for `(group, name)`.
    pub fn group_index_member(group: &TenantGroupName, name: &TenantName) -> Tuple {
        Tuple::new().push(group.clone()).push(name.clone())
    }

    /// Key range holding the index members of `group`.
    pub fn group_index_range(&self, group: &TenantGroupName) -> KeyRange {
        let group_space = self.tenant_group_tenant_index.subspace().subspace(&Tuple::new().push(group.clone()));
        let (begin, end) = group_space.range();
        KeyRange { begin, end }
    }

    /// Split an index member back into `(group, name)`.
    pub fn parse_group_index_member(member: &Tuple) -> Result<(TenantGroupName, TenantName), TenantError> {
        match (member.len(), member.get(0).and_then(|e| e.as_bytes()), member.get(1).and_then(|e| e.as_bytes())) {
            (2, Some(group), Some(name)) => Ok((group.to_vec(), name.to_vec())),
            _ => Err(TenantError::CorruptKey {
                reason: "group index member is not a (group, name) pair".to_string(),
            }),
        }
    }

    /// Whether `key` is a tenant map key.
    pub fn is_tenant_map_key(&self, key: &[u8]) -> bool {
        self.tenant_map.subspace().contains(key)
    }

    /// Whether `key` is a tombstone key.
    pub fn is_tombstone_key(&self, key: &[u8]) -> bool {
        self.tenant_tombstones.subspace().contains(key)
    }

    /// Decode a tenant map key-value pair.
    pub fn decode_tenant_map_kv(&self, key: &[u8], value: &[u8]) -> Result<(TenantName, TenantMapEntry), TenantError> {
        self.tenant_map.decode(key, value)
    }
}
