//! The follower interface: identity plus the three request endpoints.

use std::hash::Hash;
use std::hash::Hasher;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::error::FollowerError;
use crate::error::TransportError;
use crate::protocol::CompactRequest;
use crate::protocol::EndpointToken;
use crate::protocol::FollowerCall;
use crate::protocol::GetChangesRequest;
use crate::protocol::GetSnapshotAndChangesRequest;
use crate::protocol::WLTOKEN_CONFIGFOLLOWER_COMPACT;
use crate::protocol::WLTOKEN_CONFIGFOLLOWER_GETCHANGES;
use crate::protocol::WLTOKEN_CONFIGFOLLOWER_GETSNAPSHOTANDCHANGES;
use crate::transport::Endpoint;
use crate::transport::FollowerHandler;
use crate::transport::FollowerTransport;

/// Typed handle to one endpoint accepting `Req`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct RequestStream<Req> {
    endpoint: Endpoint,
    #[serde(skip)]
    _request: PhantomData<fn(Req)>,
}

impl<Req> Clone for RequestStream<Req> {
    fn clone(&self) -> Self {
        Self::at(self.endpoint.clone())
    }
}

impl<Req> RequestStream<Req> {
    /// Stream at a fresh local endpoint.
    pub fn new() -> Self {
        Self::at(Endpoint::local(EndpointToken::random()))
    }

    pub fn at(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            _request: PhantomData,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Move the stream to a well-known token, keeping its address.
    pub fn make_well_known_endpoint(&mut self, token: EndpointToken) {
        self.endpoint.token = token;
    }
}

impl<Req> Default for RequestStream<Req> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req: FollowerCall> RequestStream<Req> {
    /// Send `request` and wait for its typed reply.
    pub async fn get_reply<T: FollowerTransport + ?Sized>(
        &self,
        transport: &T,
        request: Req,
    ) -> Result<Req::Reply, FollowerError> {
        let response = transport.call(&self.endpoint, request.into_request()).await?;
        Req::reply_from(response)
    }
}

/// Process-unique handle to a configuration follower's endpoints.
///
/// Equality and hashing use only the id, so two handles built from different
/// addresses are still distinct, and clones of one handle are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFollowerInterface {
    id: Uuid,
    pub get_snapshot_and_changes: RequestStream<GetSnapshotAndChangesRequest>,
    pub get_changes: RequestStream<GetChangesRequest>,
    pub compact: RequestStream<CompactRequest>,
}

impl ConfigFollowerInterface {
    /// Interface served by this process, on fresh endpoints.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            get_snapshot_and_changes: RequestStream::new(),
            get_changes: RequestStream::new(),
            compact: RequestStream::new(),
        }
    }

    /// Interface of the follower at `address`, on the well-known endpoints.
    pub fn with_remote(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: Uuid::new_v4(),
            get_snapshot_and_changes: RequestStream::at(Endpoint::remote(
                address.clone(),
                WLTOKEN_CONFIGFOLLOWER_GETSNAPSHOTANDCHANGES,
            )),
            get_changes: RequestStream::at(Endpoint::remote(address.clone(), WLTOKEN_CONFIGFOLLOWER_GETCHANGES)),
            compact: RequestStream::at(Endpoint::remote(address, WLTOKEN_CONFIGFOLLOWER_COMPACT)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Rebind all three endpoints to their well-known tokens.
    pub fn setup_well_known_endpoints(&mut self) {
        self.get_snapshot_and_changes.make_well_known_endpoint(WLTOKEN_CONFIGFOLLOWER_GETSNAPSHOTANDCHANGES);
        self.get_changes.make_well_known_endpoint(WLTOKEN_CONFIGFOLLOWER_GETCHANGES);
        self.compact.make_well_known_endpoint(WLTOKEN_CONFIGFOLLOWER_COMPACT);
    }

    /// Serve all three endpoints with `handler`.
    pub async fn register<T: FollowerTransport + ?Sized>(
        &self,
        transport: &T,
        handler: Arc<dyn FollowerHandler>,
    ) -> Result<(), TransportError> {
        for endpoint in [
            self.get_snapshot_and_changes.endpoint(),
            self.get_changes.endpoint(),
            self.compact.endpoint(),
        ] {
            transport.register(endpoint.clone(), Arc::clone(&handler)).await?;
        }
        Ok(())
    }
}

impl Default for ConfigFollowerInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ConfigFollowerInterface {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConfigFollowerInterface {}

impl Hash for ConfigFollowerInterface {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_identity_equality() {
        let a = ConfigFollowerInterface::new();
        let b = ConfigFollowerInterface::new();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let r1 = ConfigFollowerInterface::with_remote("10.0.0.1:4500");
        let r2 = ConfigFollowerInterface::with_remote("10.0.0.1:4500");
        assert_ne!(r1, r2);

        let set: HashSet<_> = [a.clone(), a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_well_known_endpoints() {
        let remote = ConfigFollowerInterface::with_remote("10.0.0.1:4500");
        assert_eq!(remote.get_changes.endpoint().token, WLTOKEN_CONFIGFOLLOWER_GETCHANGES);
        assert_eq!(remote.compact.endpoint().address.as_deref(), Some("10.0.0.1:4500"));

        let mut local = ConfigFollowerInterface::new();
        assert!(!local.get_changes.endpoint().token.is_well_known());
        local.setup_well_known_endpoints();
        assert_eq!(
            local.get_snapshot_and_changes.endpoint(),
            &Endpoint::local(WLTOKEN_CONFIGFOLLOWER_GETSNAPSHOTANDCHANGES)
        );
        assert_eq!(local.get_changes.endpoint(), &Endpoint::local(WLTOKEN_CONFIGFOLLOWER_GETCHANGES));
        assert_eq!(local.compact.endpoint(), &Endpoint::local(WLTOKEN_CONFIGFOLLOWER_COMPACT));
    }

    #[test]
    fn test_interface_serializes() {
        let iface = ConfigFollowerInterface::with_remote("n1");
        let bytes = postcard::to_allocvec(&iface).unwrap();
        let back: ConfigFollowerInterface = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, iface);
        assert_eq!(back.get_changes.endpoint(), iface.get_changes.endpoint());
    }
}
