//! Follower-side time-travel view of the tenant registry.
//!
//! [`TenantCache`] is fed by the follower protocol (snapshot first, then
//! change batches) and keeps two versioned maps: name to entry, and tenant
//! prefix to name. Retired ids are tracked too, so prefix lookups for removed
//! tenants fail with `TenantRemoved` instead of looking like unknown keys.

use std::collections::BTreeMap;

use async_trait::async_trait;
use strata_kv::ChangeSink;
use strata_kv::Mutation;
use strata_kv::Version;
use strata_kv::VersionedMap;
use strata_kv::VersionedMutations;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::warn;

use crate::codec::id_to_prefix;
use crate::codec::key_prefix_to_id;
use crate::entry::TenantMapEntry;
use crate::error::TenantError;
use crate::layout::TenantMetadataSpecification;
use crate::name::TenantName;
use crate::name::printable;

/// Name to entry, by version.
pub type TenantMap = VersionedMap<TenantName, TenantMapEntry>;

/// Tenant prefix to name, by version.
pub type TenantPrefixIndex = VersionedMap<Vec<u8>, TenantName>;

struct CacheState {
    tenants: TenantMap,
    prefixes: TenantPrefixIndex,
    tombstones: VersionedMap<i64, ()>,
}

impl CacheState {
    fn at_version(version: Version) -> Self {
        Self {
            tenants: VersionedMap::at_version(version),
            prefixes: VersionedMap::at_version(version),
            tombstones: VersionedMap::at_version(version),
        }
    }
}

/// Versioned name and prefix lookups over a followed registry.
pub struct TenantCache {
    layout: TenantMetadataSpecification,
    tenant_subspace: Vec<u8>,
    state: RwLock<CacheState>,
}

impl TenantCache {
    /// Cache over the registry at `layout`, for tenants whose prefixes live
    /// under `tenant_subspace`.
    pub fn new(layout: TenantMetadataSpecification, tenant_subspace: Vec<u8>) -> Self {
        Self {
            layout,
            tenant_subspace,
            state: RwLock::new(CacheState::at_version(0)),
        }
    }

    /// Latest applied version.
    pub async fn latest_version(&self) -> Version {
        self.state.read().await.tenants.latest_version()
    }

    /// Oldest version still answerable.
    pub async fn oldest_version(&self) -> Version {
        self.state.read().await.tenants.oldest_version()
    }

    /// Entry for `name` as of `version`.
    pub async fn lookup_by_name_at(
        &self,
        version: Version,
        name: &[u8],
    ) -> Result<Option<TenantMapEntry>, TenantError> {
        let state = self.state.read().await;
        Ok(state.tenants.read_at(version, &name.to_vec())?.cloned())
    }

    /// Owning tenant of any tenant-owned `key` as of `version`.
    pub async fn lookup_by_prefix_at(
        &self,
        version: Version,
        key: &[u8],
    ) -> Result<(TenantName, TenantMapEntry), TenantError> {
        let id = key_prefix_to_id(&self.tenant_subspace, key)?;
        let mut prefix = self.tenant_subspace.clone();
        prefix.extend_from_slice(&id_to_prefix(id));

        let state = self.state.read().await;
        if state.tombstones.read_at(version, &id.get())?.is_some() {
            return Err(TenantError::TenantRemoved { id: id.get() });
        }
        let name = state.prefixes.read_at(version, &prefix)?.cloned().ok_or_else(|| TenantError::TenantNotFound {
            name: format!("prefix {}", printable(&prefix)),
        })?;
        let entry = state.tenants.read_at(version, &name)?.cloned().ok_or_else(|| TenantError::TenantNotFound {
            name: printable(&name),
        })?;
        Ok((name, entry))
    }

    /// All tenants as of `version`, in name order.
    pub async fn tenants_at(&self, version: Version) -> Result<Vec<(TenantName, TenantMapEntry)>, TenantError> {
        let state = self.state.read().await;
        Ok(state.tenants.range_at(version, .., usize::MAX)?)
    }

    fn apply_mutation(&self, state: &mut CacheState, mutation: &Mutation) {
        let key = mutation.key();
        if self.layout.is_tenant_map_key(key) {
            let name = match self.layout.tenant_map.subspace().strip(key) {
                Ok(name) => name.to_vec(),
                Err(_) => return,
            };
            if let Some(old) = state.tenants.get(&name).cloned() {
                state.prefixes.erase(&old.prefix);
            }
            match mutation {
                Mutation::Set { value, .. } => match TenantMapEntry::decode(value) {
                    Ok(entry) => {
                        state.prefixes.insert(entry.prefix.clone(), name.clone());
                        state.tenants.insert(name, entry);
                    }
                    Err(e) => {
                        warn!(tenant = %printable(&name), error = %e, "skipping undecodable tenant entry");
                        state.tenants.erase(&name);
                    }
                },
                Mutation::Clear { .. } => state.tenants.erase(&name),
            }
        } else if self.layout.is_tombstone_key(key) {
            match self.layout.tenant_tombstones.decode(key) {
                Ok(id) => match mutation {
                    Mutation::Set { .. } => state.tombstones.insert(id, ()),
                    Mutation::Clear { .. } => state.tombstones.erase(&id),
                },
                Err(e) => warn!(error = %e, "skipping undecodable tombstone key"),
            }
        }
    }
}

#[async_trait]
impl ChangeSink for TenantCache {
    fn name(&self) -> &str {
        "tenant-cache"
    }

    async fn apply_snapshot(&self, version: Version, snapshot: &BTreeMap<Vec<u8>, Vec<u8>>) {
        let mut fresh = CacheState::at_version(version);
        for (key, value) in snapshot {
            let mutation = Mutation::Set {
                key: key.clone(),
                value: value.clone(),
            };
            self.apply_mutation(&mut fresh, &mutation);
        }
        let tenants = fresh.tenants.tracked_keys();
        *self.state.write().await = fresh;
        debug!(version, tenants, "tenant cache loaded snapshot");
    }

    async fn apply_changes(&self, changes: &[VersionedMutations]) {
        let mut state = self.state.write().await;
        for batch in changes {
            if batch.version <= state.tenants.latest_version() {
                continue;
            }
            // All three maps share one version line, so these cannot fail.
            let advanced = state.tenants.create_new_version(batch.version).is_ok()
                && state.prefixes.create_new_version(batch.version).is_ok()
                && state.tombstones.create_new_version(batch.version).is_ok();
            if !advanced {
                warn!(version = batch.version, "tenant cache versions diverged");
                continue;
            }
            for mutation in &batch.mutations {
                self.apply_mutation(&mut state, mutation);
            }
        }
    }

    async fn forget_before(&self, version: Version) {
        let mut state = self.state.write().await;
        state.tenants.forget_versions_before(version);
        state.prefixes.forget_versions_before(version);
        state.tombstones.forget_versions_before(version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TenantId;
    use crate::state::TenantState;

    fn set_entry(layout: &TenantMetadataSpecification, name: &[u8], entry: &TenantMapEntry) -> Mutation {
        Mutation::Set {
            key: layout.tenant_map.key_for(&name.to_vec()).unwrap(),
            value: entry.encode().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_then_changes() {
        let layout = TenantMetadataSpecification::default();
        let cache = TenantCache::new(layout.clone(), Vec::new());
        let alpha = TenantMapEntry::new(TenantId(1), b"", TenantState::Ready);

        let mut snapshot = BTreeMap::new();
        snapshot.insert(layout.tenant_map.key_for(&b"alpha".to_vec()).unwrap(), alpha.encode().unwrap());
        snapshot.insert(b"unrelated".to_vec(), b"x".to_vec());
        cache.apply_snapshot(5, &snapshot).await;

        let beta = TenantMapEntry::new(TenantId(2), b"", TenantState::Registering);
        cache
            .apply_changes(&[VersionedMutations {
                version: 7,
                mutations: vec![set_entry(&layout, b"beta", &beta)],
            }])
            .await;

        assert_eq!(cache.lookup_by_name_at(5, b"alpha").await.unwrap(), Some(alpha));
        assert_eq!(cache.lookup_by_name_at(5, b"beta").await.unwrap(), None);
        assert_eq!(cache.lookup_by_name_at(7, b"beta").await.unwrap(), Some(beta.clone()));

        let mut key = beta.prefix.clone();
        key.extend_from_slice(b"/row/1");
        let (name, entry) = cache.lookup_by_prefix_at(7, &key).await.unwrap();
        assert_eq!(name, b"beta".to_vec());
        assert_eq!(entry, beta);
        assert!(matches!(cache.lookup_by_prefix_at(5, &key).await, Err(TenantError::TenantNotFound { .. })));
    }

    #[tokio::test]
    async fn test_removed_tenant_prefix_lookup() {
        let layout = TenantMetadataSpecification::default();
        let cache = TenantCache::new(layout.clone(), Vec::new());
        let alpha = TenantMapEntry::new(TenantId(1), b"", TenantState::Ready);
        cache
            .apply_changes(&[VersionedMutations {
                version: 1,
                mutations: vec![set_entry(&layout, b"alpha", &alpha)],
            }])
            .await;
        cache
            .apply_changes(&[VersionedMutations {
                version: 2,
                mutations: vec![
                    Mutation::Clear {
                        key: layout.tenant_map.key_for(&b"alpha".to_vec()).unwrap(),
                    },
                    Mutation::Set {
                        key: layout.tenant_tombstones.key_for(&1).unwrap(),
                        value: Vec::new(),
                    },
                ],
            }])
            .await;

        assert!(cache.lookup_by_prefix_at(1, &alpha.prefix).await.is_ok());
        let err = cache.lookup_by_prefix_at(2, &alpha.prefix).await.unwrap_err();
        assert!(matches!(err, TenantError::TenantRemoved { id: 1 }));
        assert_eq!(cache.lookup_by_name_at(2, b"alpha").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replayed_batches_are_ignored() {
        let layout = TenantMetadataSpecification::default();
        let cache = TenantCache::new(layout.clone(), Vec::new());
        let alpha = TenantMapEntry::new(TenantId(1), b"", TenantState::Ready);
        let batch = VersionedMutations {
            version: 3,
            mutations: vec![set_entry(&layout, b"alpha", &alpha)],
        };
        cache.apply_changes(std::slice::from_ref(&batch)).await;
        cache.apply_changes(std::slice::from_ref(&batch)).await;
        assert_eq!(cache.latest_version().await, 3);
        assert_eq!(cache.tenants_at(3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forget_before() {
        let layout = TenantMetadataSpecification::default();
        let cache = TenantCache::new(layout.clone(), Vec::new());
        let alpha = TenantMapEntry::new(TenantId(1), b"", TenantState::Ready);
        cache
            .apply_changes(&[
                VersionedMutations {
                    version: 1,
                    mutations: vec![set_entry(&layout, b"alpha", &alpha)],
                },
                VersionedMutations {
                    version: 2,
                    mutations: vec![],
                },
            ])
            .await;
        cache.forget_before(2).await;
        assert_eq!(cache.oldest_version().await, 2);
        assert!(matches!(cache.lookup_by_name_at(1, b"alpha").await, Err(TenantError::Storage { .. })));
        assert!(cache.lookup_by_name_at(2, b"alpha").await.unwrap().is_some());
    }
}
