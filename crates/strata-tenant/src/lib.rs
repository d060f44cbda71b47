//! Tenant metadata for Strata.
//!
//! A tenant is a logically isolated namespace inside the shared keyspace. This
//! crate covers how a tenant is identified, stored and managed:
//!
//! - [`codec`]: bijection between a [`TenantId`] and its 8-byte key prefix.
//! - [`TenantMapEntry`]: the versioned record stored per tenant, with its
//!   binary wire form.
//! - [`TenantMetadataSpecification`]: the registry layout (tenant map, id
//!   counter, group index, tombstones) under a configurable root subspace.
//! - [`TenantManager`]: lifecycle operations that keep the four registry
//!   containers consistent by writing them in one transaction.
//! - [`TenantCache`]: versioned name and prefix lookups fed by the follower
//!   change stream.
//! - [`check_registry`]: consistency checker reporting index, counter and
//!   tombstone divergence.
//!
//! # Lifecycle
//!
//! ```text
//! Registering ──> Ready ──> Removing ──> (erased, id tombstoned)
//!      │            │          │
//!      └────────────┴──────────┴──> Error
//! ```

pub mod cache;
pub mod codec;
pub mod consistency;
pub mod entry;
mod error;
pub mod key_backed;
pub mod layout;
mod manager;
pub mod name;
mod state;
pub mod verified;

pub use cache::TenantCache;
pub use cache::TenantMap;
pub use cache::TenantPrefixIndex;
pub use codec::TenantId;
pub use codec::TenantIdCodec;
pub use consistency::ConsistencyReport;
pub use consistency::Violation;
pub use consistency::check_registry;
pub use entry::PROTOCOL_VERSION_WITH_TENANT_GROUPS;
pub use entry::PROTOCOL_VERSION_WITH_TENANTS;
pub use entry::TenantMapEntry;
pub use error::TenantError;
pub use layout::TenantMetadataSpecification;
pub use manager::TenantManager;
pub use name::TenantGroupName;
pub use name::TenantName;
pub use state::TenantState;
pub use state::string_to_tenant_state;
pub use state::tenant_state_to_string;
