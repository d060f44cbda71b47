//! Centralized constants for Strata.
//!
//! Tiger Style: Constants are fixed and immutable, enforced at compile time.
//! Each constant has explicit bounds to prevent unbounded resource allocation.
//!
//! # Modules
//!
//! - [`api`]: Key/value sizes, range read and commit bounds
//! - [`tenant`]: Tenant registry literals, name limits, transaction retry policy
//! - [`follower`]: Configuration follower protocol bounds and intervals
//!
//! # Usage
//!
//! ```
//! use strata_constants::api::MAX_KEY_SIZE;
//! use strata_constants::tenant::TENANT_PREFIX_SIZE;
//! ```

pub mod api;
mod assertions;
pub mod follower;
pub mod tenant;

pub use api::DEFAULT_RANGE_LIMIT;
pub use api::MAX_KEY_SIZE;
pub use api::MAX_MUTATIONS_PER_COMMIT;
pub use api::MAX_RANGE_RESULTS;
pub use api::MAX_VALUE_SIZE;
pub use api::RESERVED_KEY_PREFIX;
pub use tenant::TENANT_PREFIX_SIZE;
