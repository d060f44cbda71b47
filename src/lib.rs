//! Strata: tenant metadata and configuration followers.
//!
//! This crate ties the workspace together for the `strata-node` binary and
//! re-exports the member crates:
//!
//! - [`layer`]: tuple encoding and subspaces
//! - [`kv`]: versioned store seam, transactions, versioned maps
//! - [`tenant`]: tenant identity, registry layout and lifecycle
//! - [`follower`]: snapshot, change-tail and compaction protocol
//!
//! [`config`] holds the node configuration.

pub mod config;

pub use config::ConfigError;
pub use config::StrataConfig;
pub use strata_config_follower as follower;
pub use strata_constants as constants;
pub use strata_kv as kv;
pub use strata_layer as layer;
pub use strata_tenant as tenant;
