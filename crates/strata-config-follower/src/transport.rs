//! Request/response transport for the follower endpoints.
//!
//! [`FollowerTransport`] is the seam to the RPC layer. [`LocalTransport`]
//! routes encoded frames to handlers registered in the same process and is
//! what the node binary and the tests use.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::FollowerError;
use crate::error::TransportError;
use crate::protocol::EndpointToken;
use crate::protocol::FollowerRequest;
use crate::protocol::FollowerResponse;
use crate::protocol::ResponseError;
use crate::wire::decode_frame;
use crate::wire::encode_frame;

/// Address plus token of one request endpoint. `address == None` means the
/// local process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: Option<String>,
    pub token: EndpointToken,
}

impl Endpoint {
    pub fn local(token: EndpointToken) -> Self {
        Self { address: None, token }
    }

    pub fn remote(address: impl Into<String>, token: EndpointToken) -> Self {
        Self {
            address: Some(address.into()),
            token,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "{address}#{}", self.token.0),
            None => write!(f, "local#{}", self.token.0),
        }
    }
}

/// Serves decoded follower requests.
#[async_trait]
pub trait FollowerHandler: Send + Sync {
    async fn handle(&self, request: FollowerRequest) -> Result<FollowerResponse, FollowerError>;
}

#[async_trait]
impl<T: FollowerHandler + ?Sized> FollowerHandler for Arc<T> {
    async fn handle(&self, request: FollowerRequest) -> Result<FollowerResponse, FollowerError> {
        (**self).handle(request).await
    }
}

/// Delivers requests to endpoints.
///
/// Handler failures come back as [`FollowerResponse::Error`]; only delivery
/// failures are `Err`.
#[async_trait]
pub trait FollowerTransport: Send + Sync {
    async fn call(&self, endpoint: &Endpoint, request: FollowerRequest) -> Result<FollowerResponse, TransportError>;

    /// Bind `handler` at `endpoint`, replacing any previous binding.
    async fn register(&self, endpoint: Endpoint, handler: Arc<dyn FollowerHandler>) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: FollowerTransport + ?Sized> FollowerTransport for Arc<T> {
    async fn call(&self, endpoint: &Endpoint, request: FollowerRequest) -> Result<FollowerResponse, TransportError> {
        (**self).call(endpoint, request).await
    }

    async fn register(&self, endpoint: Endpoint, handler: Arc<dyn FollowerHandler>) -> Result<(), TransportError> {
        (**self).register(endpoint, handler).await
    }
}

/// In-process transport.
///
/// Requests and responses are encoded to frames and decoded again so the
/// wire format is exercised on every call. Endpoints addressed to this
/// transport's own address resolve like local ones.
pub struct LocalTransport {
    address: String,
    handlers: RwLock<HashMap<EndpointToken, Arc<dyn FollowerHandler>>>,
}

impl LocalTransport {
    pub fn new(address: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            address: address.into(),
            handlers: RwLock::new(HashMap::new()),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Remove the binding at `endpoint`. Returns whether one existed.
    pub async fn unregister(&self, endpoint: &Endpoint) -> bool {
        self.handlers.write().await.remove(&endpoint.token).is_some()
    }

    fn resolves(&self, endpoint: &Endpoint) -> bool {
        endpoint.address.as_deref().is_none_or(|address| address == self.address)
    }
}

#[async_trait]
impl FollowerTransport for LocalTransport {
    async fn call(&self, endpoint: &Endpoint, request: FollowerRequest) -> Result<FollowerResponse, TransportError> {
        let not_found = || TransportError::EndpointNotFound {
            endpoint: endpoint.to_string(),
        };
        if !self.resolves(endpoint) {
            return Err(not_found());
        }
        let handler = self.handlers.read().await.get(&endpoint.token).cloned().ok_or_else(not_found)?;

        let frame = encode_frame(&request)?;
        let request: FollowerRequest = decode_frame(&frame)?;
        debug!(%endpoint, kind = request.kind(), bytes = frame.len(), "follower request");

        let response = match handler.handle(request).await {
            Ok(response) => response,
            Err(err) => FollowerResponse::Error(ResponseError::from(err)),
        };
        let frame = encode_frame(&response)?;
        decode_frame(&frame)
    }

    async fn register(&self, endpoint: Endpoint, handler: Arc<dyn FollowerHandler>) -> Result<(), TransportError> {
        if !self.resolves(&endpoint) {
            return Err(TransportError::EndpointNotFound {
                endpoint: endpoint.to_string(),
            });
        }
        self.handlers.write().await.insert(endpoint.token, handler);
        Ok(())
    }
}
