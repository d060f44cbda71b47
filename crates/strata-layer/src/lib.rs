//! Ordered key construction for the Strata keyspace.
//!
//! Two primitives, both following the FoundationDB layer conventions:
//!
//! - **Tuple encoding**: order-preserving serialization of composite keys
//!   (used for the tenant group index and the tombstone set).
//! - **Subspace**: a raw byte prefix that namespaces a family of keys.
//!
//! ```
//! use strata_layer::{Subspace, Tuple};
//!
//! let index = Subspace::from_bytes(b"\xff/tenant/tenantGroup/tenantIndex/".to_vec());
//! let key = index.pack(&Tuple::new().push(b"group-a".to_vec()).push(b"alpha".to_vec()));
//! assert!(index.contains(&key));
//! ```

mod subspace;
mod tuple;

#[cfg(test)]
mod proptest;

pub use subspace::Subspace;
pub use subspace::SubspaceError;
pub use subspace::strinc;
pub use tuple::Element;
pub use tuple::Tuple;
pub use tuple::TupleError;
