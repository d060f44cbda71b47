//! Registry consistency checking.
//!
//! Cross-checks the four registry containers in one read transaction and
//! reports every divergence found. A divergence is an invariant violation
//! left behind by a bug or a partial write from outside the manager; it is
//! reported, never repaired here.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use strata_constants::DEFAULT_RANGE_LIMIT;
use strata_constants::TENANT_PREFIX_SIZE;
use strata_kv::Transaction;
use strata_kv::VersionedStore;
use tracing::warn;

use crate::codec::id_to_prefix;
use crate::error::TenantError;
use crate::layout::TenantMetadataSpecification;
use crate::name::TenantGroupName;
use crate::name::TenantName;
use crate::name::printable;

/// One registry invariant violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Group index pair whose tenant is missing or in another group.
    IndexWithoutEntry { group: TenantGroupName, name: TenantName },
    /// Tenant in a group without the matching index pair.
    EntryWithoutIndex { group: TenantGroupName, name: TenantName },
    /// Allocated id above the id counter.
    CounterBehind { counter: i64, id: i64, name: TenantName },
    /// Tombstoned id still owned by a tenant.
    TombstonedIdInUse { id: i64, name: TenantName },
    /// Several tenants share an id.
    DuplicateId { id: i64, names: Vec<TenantName> },
    /// Entry prefix is too short or does not end with its id bytes.
    PrefixMismatch { name: TenantName, id: i64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::IndexWithoutEntry { group, name } => {
                write!(f, "index pair ({}, {}) has no matching entry", printable(group), printable(name))
            }
            Violation::EntryWithoutIndex { group, name } => {
                write!(f, "tenant {} in group {} has no index pair", printable(name), printable(group))
            }
            Violation::CounterBehind { counter, id, name } => {
                write!(f, "tenant {} has id {id} above counter {counter}", printable(name))
            }
            Violation::TombstonedIdInUse { id, name } => {
                write!(f, "tombstoned id {id} is used by tenant {}", printable(name))
            }
            Violation::DuplicateId { id, names } => {
                let names: Vec<String> = names.iter().map(|n| printable(n)).collect();
                write!(f, "id {id} is shared by {}", names.join(", "))
            }
            Violation::PrefixMismatch { name, id } => {
                write!(f, "tenant {} prefix does not encode id {id}", printable(name))
            }
        }
    }
}

/// Result of [`check_registry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub tenants_checked: usize,
    pub violations: Vec<Violation>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check the registry as of the transaction's read version.
pub async fn check_registry<S: VersionedStore + ?Sized>(
    layout: &TenantMetadataSpecification,
    tx: &mut Transaction<'_, S>,
) -> Result<ConsistencyReport, TenantError> {
    let entries = layout.tenant_map.get_all(tx, DEFAULT_RANGE_LIMIT).await?;
    let counter = layout.last_tenant_id.get(tx).await?.map_or(0, |id| id.get());
    let index: BTreeSet<(TenantGroupName, TenantName)> = layout
        .tenant_group_tenant_index
        .get_all(tx, None, DEFAULT_RANGE_LIMIT)
        .await?
        .iter()
        .map(TenantMetadataSpecification::parse_group_index_member)
        .collect::<Result<_, _>>()?;
    let tombstones: BTreeSet<i64> =
        layout.tenant_tombstones.get_all(tx, None, DEFAULT_RANGE_LIMIT).await?.into_iter().collect();

    let mut violations = Vec::new();
    let mut by_id: BTreeMap<i64, Vec<TenantName>> = BTreeMap::new();
    let mut expected_index = BTreeSet::new();

    for (name, entry) in &entries {
        let id = entry.id.get();
        by_id.entry(id).or_default().push(name.clone());

        if id > counter {
            violations.push(Violation::CounterBehind {
                counter,
                id,
                name: name.clone(),
            });
        }
        if tombstones.contains(&id) {
            violations.push(Violation::TombstonedIdInUse { id, name: name.clone() });
        }
        let prefix_ok = entry.id.is_assigned()
            && entry.prefix.len() >= TENANT_PREFIX_SIZE
            && entry.prefix.ends_with(&id_to_prefix(entry.id));
        if !prefix_ok {
            violations.push(Violation::PrefixMismatch { name: name.clone(), id });
        }
        if let Some(group) = &entry.tenant_group {
            let pair = (group.clone(), name.clone());
            if !index.contains(&pair) {
                violations.push(Violation::EntryWithoutIndex {
                    group: group.clone(),
                    name: name.clone(),
                });
            }
            expected_index.insert(pair);
        }
    }

    for (group, name) in index.difference(&expected_index) {
        violations.push(Violation::IndexWithoutEntry {
            group: group.clone(),
            name: name.clone(),
        });
    }
    for (id, names) in by_id {
        if names.len() > 1 {
            violations.push(Violation::DuplicateId { id, names });
        }
    }

    for violation in &violations {
        warn!(%violation, "tenant registry violation");
    }
    Ok(ConsistencyReport {
        tenants_checked: entries.len(),
        violations,
    })
}
