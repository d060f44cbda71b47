//! Follower protocol errors.

use snafu::Snafu;
use strata_kv::StoreError;
use strata_kv::Version;

/// Failures moving frames between a caller and a registered handler.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    /// Nothing is registered at the endpoint.
    #[snafu(display("no handler registered at {endpoint}"))]
    EndpointNotFound { endpoint: String },

    /// Frame exceeds the maximum frame size.
    #[snafu(display("frame too large: {size} > {max}"))]
    FrameTooLarge { size: usize, max: u32 },

    /// Request or response could not be serialized.
    #[snafu(display("failed to encode frame: {source}"))]
    Encode { source: postcard::Error },

    /// Request or response could not be deserialized.
    #[snafu(display("failed to decode frame: {source}"))]
    Decode { source: postcard::Error },

    /// Frame shorter than its length header claims.
    #[snafu(display("truncated frame: expected {expected} bytes, got {actual}"))]
    Truncated { expected: usize, actual: usize },

    /// The handler failed for a reason other than an old version.
    #[snafu(display("handler failed: {message}"))]
    Handler { message: String },
}

/// Errors from the follower service and consumer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FollowerError {
    /// Requested version precedes the responder's retained history.
    #[snafu(display("version {version} is older than the compacted version {oldest}"))]
    VersionTooOld { version: Version, oldest: Version },

    /// RPC failure. Caller-retriable.
    #[snafu(display("transport error: {source}"))]
    Transport { source: TransportError },

    /// The snapshot holds more keys than the responder serves.
    #[snafu(display("snapshot at version {version} exceeds {max} keys"))]
    SnapshotTooLarge { version: Version, max: usize },

    /// Responder storage failure.
    #[snafu(display("storage error: {source}"))]
    Storage { source: StoreError },

    /// The reply did not match the request.
    #[snafu(display("unexpected response to {request}: got {got}"))]
    UnexpectedResponse { request: &'static str, got: &'static str },

    /// A knob key or value could not be decoded.
    #[snafu(display("codec error: {reason}"))]
    Codec { reason: String },
}

impl From<StoreError> for FollowerError {
    fn from(source: StoreError) -> Self {
        match source {
            StoreError::VersionTooOld { version, oldest } => FollowerError::VersionTooOld { version, oldest },
            source => FollowerError::Storage { source },
        }
    }
}

impl From<TransportError> for FollowerError {
    fn from(source: TransportError) -> Self {
        FollowerError::Transport { source }
    }
}
