//! Follower protocol messages.
//!
//! Every call is a typed request with a typed reply. On the wire both travel
//! inside the [`FollowerRequest`] / [`FollowerResponse`] envelopes.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use strata_kv::Version;
use strata_kv::VersionedMutations;
use uuid::Uuid;

use crate::class_set::ConfigClassSet;
use crate::error::FollowerError;
use crate::error::TransportError;

/// Identifier of a request endpoint within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointToken(pub u64);

impl EndpointToken {
    /// A fresh token outside the well-known range.
    pub fn random() -> Self {
        EndpointToken(rand::random::<u64>() | WELL_KNOWN_TOKEN_LIMIT)
    }

    pub fn is_well_known(self) -> bool {
        self.0 < WELL_KNOWN_TOKEN_LIMIT
    }
}

/// Tokens below this are reserved for well-known endpoints.
const WELL_KNOWN_TOKEN_LIMIT: u64 = 1 << 63;

pub const WLTOKEN_CONFIGFOLLOWER_GETSNAPSHOTANDCHANGES: EndpointToken = EndpointToken(16);
pub const WLTOKEN_CONFIGFOLLOWER_GETCHANGES: EndpointToken = EndpointToken(17);
pub const WLTOKEN_CONFIGFOLLOWER_COMPACT: EndpointToken = EndpointToken(18);

// ============================================================================
// Requests and replies
// ============================================================================

/// Ask for a full snapshot plus the changes after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSnapshotAndChangesRequest {
    pub consumer_id: Uuid,
    pub config_classes: Option<ConfigClassSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSnapshotAndChangesReply {
    /// Version the snapshot reflects exactly.
    pub snapshot_version: Version,
    pub snapshot: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Every batch after `snapshot_version`, in version order.
    pub changes: Vec<VersionedMutations>,
    pub most_recent_version: Version,
}

impl GetSnapshotAndChangesReply {
    /// Version the follower is at once the reply is applied.
    pub fn end_version(&self) -> Version {
        self.changes.last().map_or(self.snapshot_version, |batch| batch.version)
    }
}

/// Ask for batches after `last_seen_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetChangesRequest {
    pub consumer_id: Uuid,
    pub last_seen_version: Version,
    pub config_classes: Option<ConfigClassSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetChangesReply {
    pub changes: Vec<VersionedMutations>,
    pub most_recent_version: Version,
    /// True when the reply was cut at the batch limit.
    pub more: bool,
}

impl GetChangesReply {
    /// Version the follower is at once the reply is applied, given the
    /// `last_seen_version` it asked after.
    pub fn end_version(&self, last_seen_version: Version) -> Version {
        self.changes.last().map_or(last_seen_version, |batch| batch.version)
    }
}

/// Allow the responder to discard history at or before `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactRequest {
    pub version: Version,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactReply {
    /// Responder's compaction floor after the request.
    pub compacted_version: Version,
}

// ============================================================================
// Envelopes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowerRequest {
    GetSnapshotAndChanges(GetSnapshotAndChangesRequest),
    GetChanges(GetChangesRequest),
    Compact(CompactRequest),
}

impl FollowerRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            FollowerRequest::GetSnapshotAndChanges(_) => "get_snapshot_and_changes",
            FollowerRequest::GetChanges(_) => "get_changes",
            FollowerRequest::Compact(_) => "compact",
        }
    }
}

/// Errors that cross the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseError {
    VersionTooOld { version: Version, oldest: Version },
    Failed { message: String },
}

impl From<FollowerError> for ResponseError {
    fn from(err: FollowerError) -> Self {
        match err {
            FollowerError::VersionTooOld { version, oldest } => ResponseError::VersionTooOld { version, oldest },
            other => ResponseError::Failed {
                message: other.to_string(),
            },
        }
    }
}

impl From<ResponseError> for FollowerError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::VersionTooOld { version, oldest } => FollowerError::VersionTooOld { version, oldest },
            ResponseError::Failed { message } => FollowerError::Transport {
                source: TransportError::Handler { message },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowerResponse {
    GetSnapshotAndChanges(GetSnapshotAndChangesReply),
    GetChanges(GetChangesReply),
    Compact(CompactReply),
    Error(ResponseError),
}

impl FollowerResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            FollowerResponse::GetSnapshotAndChanges(_) => "get_snapshot_and_changes",
            FollowerResponse::GetChanges(_) => "get_changes",
            FollowerResponse::Compact(_) => "compact",
            FollowerResponse::Error(_) => "error",
        }
    }
}

/// A typed request that travels inside the envelopes.
pub trait FollowerCall: Clone + Send + Sync + 'static {
    type Reply: Send;

    const NAME: &'static str;

    fn into_request(self) -> FollowerRequest;

    fn reply_from(response: FollowerResponse) -> Result<Self::Reply, FollowerError>;
}

fn unexpected<T>(request: &'static str, response: FollowerResponse) -> Result<T, FollowerError> {
    match response {
        FollowerResponse::Error(err) => Err(err.into()),
        other => Err(FollowerError::UnexpectedResponse {
            request,
            got: other.kind(),
        }),
    }
}

impl FollowerCall for GetSnapshotAndChangesRequest {
    type Reply = GetSnapshotAndChangesReply;

    const NAME: &'static str = "get_snapshot_and_changes";

    fn into_request(self) -> FollowerRequest {
        FollowerRequest::GetSnapshotAndChanges(self)
    }

    fn reply_from(response: FollowerResponse) -> Result<Self::Reply, FollowerError> {
        match response {
            FollowerResponse::GetSnapshotAndChanges(reply) => Ok(reply),
            other => unexpected(Self::NAME, other),
        }
    }
}

impl FollowerCall for GetChangesRequest {
    type Reply = GetChangesReply;

    const NAME: &'static str = "get_changes";

    fn into_request(self) -> FollowerRequest {
        FollowerRequest::GetChanges(self)
    }

    fn reply_from(response: FollowerResponse) -> Result<Self::Reply, FollowerError> {
        match response {
            FollowerResponse::GetChanges(reply) => Ok(reply),
            other => unexpected(Self::NAME, other),
        }
    }
}

impl FollowerCall for CompactRequest {
    type Reply = CompactReply;

    const NAME: &'static str = "compact";

    fn into_request(self) -> FollowerRequest {
        FollowerRequest::Compact(self)
    }

    fn reply_from(response: FollowerResponse) -> Result<Self::Reply, FollowerError> {
        match response {
            FollowerResponse::Compact(reply) => Ok(reply),
            other => unexpected(Self::NAME, other),
        }
    }
}
