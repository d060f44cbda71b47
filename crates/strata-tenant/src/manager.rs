//! Tenant lifecycle operations over the registry layout.
//!
//! Every operation runs in one transaction that reads what it needs, writes
//! all affected registry containers and commits. Commit conflicts are retried
//! on a fresh read version with exponential backoff; every other error is
//! returned as is.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use strata_constants::DEFAULT_RANGE_LIMIT;
use strata_constants::tenant::MAX_TENANT_LIST_RESULTS;
use strata_constants::tenant::MAX_TOMBSTONE_SKIPS;
use strata_constants::tenant::MAX_TRANSACTION_RETRIES;
use strata_constants::tenant::TRANSACTION_RETRY_INITIAL_BACKOFF_MS;
use strata_constants::tenant::TRANSACTION_RETRY_MAX_BACKOFF_MS;
use strata_kv::KeyRange;
use strata_kv::Transaction;
use strata_kv::VersionedStore;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::codec::TenantId;
use crate::consistency::ConsistencyReport;
use crate::consistency::check_registry;
use crate::entry::TenantMapEntry;
use crate::error::TenantError;
use crate::layout::TenantMetadataSpecification;
use crate::name::TenantGroupName;
use crate::name::TenantName;
use crate::name::printable;
use crate::name::validate_name;
use crate::state::TenantState;
use crate::verified::compute_backoff_with_jitter;
use crate::verified::is_valid_transition;
use crate::verified::next_tenant_id;

/// Drives tenant lifecycle transitions against a [`VersionedStore`].
pub struct TenantManager<S: VersionedStore + ?Sized> {
    store: Arc<S>,
    layout: TenantMetadataSpecification,
    /// Subspace that tenant prefixes are allocated under.
    tenant_subspace: Vec<u8>,
}

impl<S: VersionedStore + ?Sized> TenantManager<S> {
    /// Manager whose tenant prefixes are bare 8-byte ids.
    pub fn new(store: Arc<S>, layout: TenantMetadataSpecification) -> Self {
        Self::with_tenant_subspace(store, layout, Vec::new())
    }

    /// Manager allocating tenant prefixes under `tenant_subspace`.
    pub fn with_tenant_subspace(store: Arc<S>, layout: TenantMetadataSpecification, tenant_subspace: Vec<u8>) -> Self {
        Self {
            store,
            layout,
            tenant_subspace,
        }
    }

    pub fn layout(&self) -> &TenantMetadataSpecification {
        &self.layout
    }

    pub fn tenant_subspace(&self) -> &[u8] {
        &self.tenant_subspace
    }

    // =========================================================================
    // Registration and state transitions
    // =========================================================================

    /// Register `name` in state `Registering` with a freshly allocated id.
    ///
    /// Registering an existing name returns the existing entry when its
    /// configuration matches and fails with `TenantAlreadyExists` otherwise.
    pub async fn create_tenant(
        &self,
        name: &[u8],
        tenant_group: Option<&[u8]>,
    ) -> Result<TenantMapEntry, TenantError> {
        validate_name(name)?;
        if let Some(group) = tenant_group {
            validate_name(group)?;
        }
        let name = name.to_vec();
        let group = tenant_group.map(<[u8]>::to_vec);
        self.retry("create_tenant", || self.try_create_tenant(&name, &group)).await
    }

    async fn try_create_tenant(
        &self,
        name: &TenantName,
        group: &Option<TenantGroupName>,
    ) -> Result<TenantMapEntry, TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;

        if let Some(existing) = self.layout.tenant_map.get(&mut tx, name).await? {
            let requested = TenantMapEntry {
                tenant_group: group.clone(),
                ..TenantMapEntry::default()
            };
            if existing.matches_configuration(&requested) {
                debug!(tenant = %printable(name), id = %existing.id, "tenant already registered");
                return Ok(existing);
            }
            return Err(TenantError::TenantAlreadyExists { name: printable(name) });
        }

        let id = self.allocate_id(&mut tx).await?;
        let entry = TenantMapEntry::with_group(id, &self.tenant_subspace, group.clone(), TenantState::Registering);
        self.layout.tenant_map.set(&mut tx, name, &entry)?;
        if let Some(group) = group {
            let member = TenantMetadataSpecification::group_index_member(group, name);
            self.layout.tenant_group_tenant_index.insert(&mut tx, &member)?;
        }
        let version = tx.commit().await?;

        info!(tenant = %printable(name), id = %id, version, "tenant registered");
        Ok(entry)
    }

    /// Read-increment-write of `last_tenant_id`, skipping retired ids.
    async fn allocate_id(&self, tx: &mut Transaction<'_, S>) -> Result<TenantId, TenantError> {
        let last = self.layout.last_tenant_id.get(tx).await?;
        let mut candidate = next_tenant_id(last).ok_or(TenantError::TenantIdExhausted {
            last_id: last.map_or(0, TenantId::get),
        })?;

        let mut skipped = 0u32;
        while self.layout.tenant_tombstones.exists(tx, &candidate.get()).await? {
            warn!(id = %candidate, "skipping tombstoned tenant id");
            skipped += 1;
            if skipped >= MAX_TOMBSTONE_SKIPS {
                return Err(TenantError::TenantIdExhausted { last_id: candidate.get() });
            }
            candidate = next_tenant_id(Some(candidate)).ok_or(TenantError::TenantIdExhausted {
                last_id: candidate.get(),
            })?;
        }

        self.layout.last_tenant_id.set(tx, &candidate)?;
        Ok(candidate)
    }

    /// `Registering -> Ready`.
    pub async fn mark_ready(&self, name: &[u8]) -> Result<TenantMapEntry, TenantError> {
        self.transition(name, TenantState::Ready).await
    }

    /// `Registering | Ready -> Removing`.
    pub async fn begin_removal(&self, name: &[u8]) -> Result<TenantMapEntry, TenantError> {
        self.transition(name, TenantState::Removing).await
    }

    /// Any non-error state to `Error`.
    pub async fn mark_error(&self, name: &[u8]) -> Result<TenantMapEntry, TenantError> {
        self.transition(name, TenantState::Error).await
    }

    async fn transition(&self, name: &[u8], to: TenantState) -> Result<TenantMapEntry, TenantError> {
        let name = name.to_vec();
        self.retry("transition", || self.try_transition(&name, to)).await
    }

    async fn try_transition(&self, name: &TenantName, to: TenantState) -> Result<TenantMapEntry, TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;
        let mut entry = self.require_entry(&mut tx, name).await?;

        // Repeating a completed transition is a no-op.
        if entry.tenant_state == to {
            return Ok(entry);
        }
        if !is_valid_transition(entry.tenant_state, to) {
            return Err(TenantError::InvalidStateTransition {
                name: printable(name),
                from: entry.tenant_state,
                to,
            });
        }

        let from = entry.tenant_state;
        entry.tenant_state = to;
        self.layout.tenant_map.set(&mut tx, name, &entry)?;
        let version = tx.commit().await?;

        info!(tenant = %printable(name), id = %entry.id, %from, %to, version, "tenant state changed");
        Ok(entry)
    }

    /// Erase a `Removing` tenant: drop its entry and index pair and retire its id.
    ///
    /// Fails with `TenantNotEmpty` while any key remains under the prefix.
    pub async fn complete_removal(&self, name: &[u8]) -> Result<TenantId, TenantError> {
        let name = name.to_vec();
        self.retry("complete_removal", || self.try_complete_removal(&name)).await
    }

    async fn try_complete_removal(&self, name: &TenantName) -> Result<TenantId, TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;
        let entry = self.require_entry(&mut tx, name).await?;
        if entry.tenant_state != TenantState::Removing {
            return Err(TenantError::InvalidTenantOperation {
                name: printable(name),
                state: entry.tenant_state,
                operation: "complete removal of".to_string(),
            });
        }

        let data = tx.get_range(&KeyRange::prefix(&entry.prefix), 1).await?;
        if !data.is_empty() {
            return Err(TenantError::TenantNotEmpty { name: printable(name) });
        }

        self.layout.tenant_map.erase(&mut tx, name)?;
        self.layout.tenant_tombstones.insert(&mut tx, &entry.id.get())?;
        if let Some(group) = &entry.tenant_group {
            let member = TenantMetadataSpecification::group_index_member(group, name);
            self.layout.tenant_group_tenant_index.erase(&mut tx, &member)?;
        }
        let version = tx.commit().await?;

        info!(tenant = %printable(name), id = %entry.id, version, "tenant removed");
        Ok(entry.id)
    }

    /// Begin and complete removal.
    pub async fn delete_tenant(&self, name: &[u8]) -> Result<TenantId, TenantError> {
        self.begin_removal(name).await?;
        self.complete_removal(name).await
    }

    /// Move a tenant to another group (or out of any group).
    pub async fn configure_tenant_group(
        &self,
        name: &[u8],
        tenant_group: Option<&[u8]>,
    ) -> Result<TenantMapEntry, TenantError> {
        if let Some(group) = tenant_group {
            validate_name(group)?;
        }
        let name = name.to_vec();
        let group = tenant_group.map(<[u8]>::to_vec);
        self.retry("configure_tenant_group", || self.try_configure_tenant_group(&name, &group)).await
    }

    async fn try_configure_tenant_group(
        &self,
        name: &TenantName,
        group: &Option<TenantGroupName>,
    ) -> Result<TenantMapEntry, TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;
        let mut entry = self.require_entry(&mut tx, name).await?;
        if !matches!(entry.tenant_state, TenantState::Registering | TenantState::Ready) {
            return Err(TenantError::InvalidTenantOperation {
                name: printable(name),
                state: entry.tenant_state,
                operation: "configure".to_string(),
            });
        }
        if &entry.tenant_group == group {
            return Ok(entry);
        }

        if let Some(old) = &entry.tenant_group {
            let member = TenantMetadataSpecification::group_index_member(old, name);
            self.layout.tenant_group_tenant_index.erase(&mut tx, &member)?;
        }
        if let Some(new) = group {
            let member = TenantMetadataSpecification::group_index_member(new, name);
            self.layout.tenant_group_tenant_index.insert(&mut tx, &member)?;
        }
        entry.tenant_group = group.clone();
        self.layout.tenant_map.set(&mut tx, name, &entry)?;
        let version = tx.commit().await?;

        info!(
            tenant = %printable(name),
            group = ?group.as_deref().map(printable),
            version,
            "tenant group changed"
        );
        Ok(entry)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Entry for `name`.
    pub async fn get_tenant(&self, name: &[u8]) -> Result<TenantMapEntry, TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;
        self.require_entry(&mut tx, &name.to_vec()).await
    }

    /// Up to `limit` tenants in name order, starting at `begin`.
    pub async fn list_tenants(
        &self,
        begin: Option<&[u8]>,
        limit: u32,
    ) -> Result<Vec<(TenantName, TenantMapEntry)>, TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;
        let begin = begin.map(<[u8]>::to_vec);
        self.layout.tenant_map.get_range(&mut tx, begin.as_ref(), limit.min(MAX_TENANT_LIST_RESULTS)).await
    }

    /// Names of the tenants in `group`, in name order.
    pub async fn list_group_members(&self, group: &[u8]) -> Result<Vec<TenantName>, TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;
        let range = self.layout.group_index_range(&group.to_vec());
        let members = self
            .layout
            .tenant_group_tenant_index
            .get_all(&mut tx, Some(range), DEFAULT_RANGE_LIMIT)
            .await?;
        members
            .iter()
            .map(|member| TenantMetadataSpecification::parse_group_index_member(member).map(|(_, name)| name))
            .collect()
    }

    /// Tenant owning `id`. Retired ids fail with `TenantRemoved`.
    pub async fn get_tenant_by_id(&self, id: TenantId) -> Result<(TenantName, TenantMapEntry), TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;
        if self.layout.tenant_tombstones.exists(&mut tx, &id.get()).await? {
            return Err(TenantError::TenantRemoved { id: id.get() });
        }
        self.scan_entries(&mut tx)
            .await?
            .into_iter()
            .find(|(_, entry)| entry.id == id)
            .ok_or_else(|| TenantError::TenantNotFound {
                name: format!("id {id}"),
            })
    }

    /// Tenants left in a transient state by an unfinished operation.
    pub async fn recovery_scan(&self) -> Result<Vec<(TenantName, TenantMapEntry)>, TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;
        let stuck: Vec<_> = self
            .scan_entries(&mut tx)
            .await?
            .into_iter()
            .filter(|(_, entry)| entry.tenant_state.is_transient())
            .collect();
        if !stuck.is_empty() {
            warn!(count = stuck.len(), "tenants found in transient states");
        }
        Ok(stuck)
    }

    /// Cross-check the four registry containers.
    pub async fn check_consistency(&self) -> Result<ConsistencyReport, TenantError> {
        let mut tx = Transaction::begin(&*self.store).await?;
        check_registry(&self.layout, &mut tx).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn require_entry(&self, tx: &mut Transaction<'_, S>, name: &TenantName) -> Result<TenantMapEntry, TenantError> {
        self.layout
            .tenant_map
            .get(tx, name)
            .await?
            .ok_or_else(|| TenantError::TenantNotFound { name: printable(name) })
    }

    /// Every entry in the tenant map, however many pages it spans.
    async fn scan_entries(&self, tx: &mut Transaction<'_, S>) -> Result<Vec<(TenantName, TenantMapEntry)>, TenantError> {
        self.layout.tenant_map.get_all(tx, DEFAULT_RANGE_LIMIT).await
    }

    async fn retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, TenantError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TenantError>>,
    {
        let mut attempts = 0u32;
        let mut backoff_ms = TRANSACTION_RETRY_INITIAL_BACKOFF_MS;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() => {
                    attempts += 1;
                    if attempts >= MAX_TRANSACTION_RETRIES {
                        return Err(TenantError::MaxRetriesExceeded {
                            operation: operation.to_string(),
                            attempts,
                        });
                    }
                    let backoff =
                        compute_backoff_with_jitter(backoff_ms, TRANSACTION_RETRY_MAX_BACKOFF_MS, rand::random::<u64>());
                    debug!(operation, attempts, sleep_ms = backoff.sleep_ms, "transaction conflict, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff.sleep_ms)).await;
                    backoff_ms = backoff.next_backoff_ms;
                }
                result => return result,
            }
        }
    }
}
