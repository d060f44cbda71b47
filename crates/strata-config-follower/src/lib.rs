//! Configuration follower protocol.
//!
//! A follower bootstraps from a snapshot plus the trailing changes, tails the
//! change stream, and periodically lets the responder compact history it no
//! longer needs. Three endpoints carry the protocol:
//!
//! | Endpoint | Request | Effect |
//! |----------|---------|--------|
//! | `WLTOKEN_CONFIGFOLLOWER_GETSNAPSHOTANDCHANGES` | [`GetSnapshotAndChangesRequest`] | read-only |
//! | `WLTOKEN_CONFIGFOLLOWER_GETCHANGES` | [`GetChangesRequest`] | read-only, `VersionTooOld` below the floor |
//! | `WLTOKEN_CONFIGFOLLOWER_COMPACT` | [`CompactRequest`] | idempotent, monotonic |
//!
//! Requests may carry a [`ConfigClassSet`]; the responder then drops
//! class-scoped knobs of other classes.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! use std::sync::Arc;
//!
//! use strata_config_follower::{
//!     ConfigConsumer, ConfigFollowerInterface, ConfigFollowerService, ConsumerConfig, KnobCache, LocalTransport,
//!     ServiceConfig,
//! };
//! use strata_kv::MemoryVersionedStore;
//!
//! let store = MemoryVersionedStore::new();
//! let transport = LocalTransport::new("node-1");
//! let mut served = ConfigFollowerInterface::new();
//! served.setup_well_known_endpoints();
//! served.register(&*transport, Arc::new(ConfigFollowerService::new(store, ServiceConfig::default()))).await.unwrap();
//!
//! let mut consumer = ConfigConsumer::new(ConfigFollowerInterface::with_remote("node-1"), transport, ConsumerConfig::default());
//! consumer.add_sink(Arc::new(KnobCache::new()));
//! assert_eq!(consumer.sync_once().await.unwrap(), 0);
//! # });
//! ```

mod class_set;
mod consumer;
mod error;
mod interface;
pub mod knobs;
pub mod protocol;
mod service;
pub mod transport;
pub mod wire;

pub use class_set::ConfigClassSet;
pub use consumer::ConfigConsumer;
pub use consumer::ConsumerConfig;
pub use consumer::ConsumerState;
pub use error::FollowerError;
pub use error::TransportError;
pub use interface::ConfigFollowerInterface;
pub use interface::RequestStream;
pub use knobs::KnobCache;
pub use knobs::KnobKey;
pub use knobs::KnobValue;
pub use protocol::CompactReply;
pub use protocol::CompactRequest;
pub use protocol::GetChangesReply;
pub use protocol::GetChangesRequest;
pub use protocol::GetSnapshotAndChangesReply;
pub use protocol::GetSnapshotAndChangesRequest;
pub use service::CompactionPolicy;
pub use service::ConfigFollowerService;
pub use service::ServiceConfig;
pub use transport::FollowerHandler;
pub use transport::FollowerTransport;
pub use transport::LocalTransport;
