//! The user/system endpoint pair held by one initiator.
//!
//! Acceptors see the two planes as unrelated connections and never pair
//! them.

use std::sync::Arc;

use gale_core::Plane;

use crate::endpoint::Endpoint;

/// Two endpoints to the same peer: application traffic on the user plane,
/// cluster traffic on the system plane.
pub struct DualChannel<C> {
    user: Arc<Endpoint<C>>,
    system: Arc<Endpoint<C>>,
}

impl<C> std::fmt::Debug for DualChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualChannel")
            .field("user", &self.user)
            .field("system", &self.system)
            .finish()
    }
}

impl<C> DualChannel<C> {
    /// Pair two open endpoints.
    pub fn new(user: Arc<Endpoint<C>>, system: Arc<Endpoint<C>>) -> Self {
        Self { user, system }
    }

    /// User-plane endpoint.
    pub fn user(&self) -> &Arc<Endpoint<C>> {
        &self.user
    }

    /// System-plane endpoint.
    pub fn system(&self) -> &Arc<Endpoint<C>> {
        &self.system
    }

    /// Endpoint for `plane`.
    pub fn endpoint(&self, plane: Plane) -> &Arc<Endpoint<C>> {
        match plane {
            Plane::User => &self.user,
            Plane::System => &self.system,
        }
    }

    /// Whether both planes are closed.
    pub fn is_closed(&self) -> bool {
        self.user.is_closed() && self.system.is_closed()
    }

    /// Close both endpoints. Each is closed once; repeat calls do nothing.
    pub async fn close(&self) {
        let _ = self.user.close().await;
        let _ = self.system.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;
    use crate::transport::memory_pair;
    use gale_core::JsonCodec;
    use std::time::Duration;

    fn endpoint(plane: Plane) -> Arc<Endpoint<()>> {
        let (side, _peer) = memory_pair(4);
        Arc::new(Endpoint::new(
            plane,
            Arc::new(Router::new()),
            Arc::new(JsonCodec),
            Box::new(side.writer),
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn close_closes_both_once() {
        let session = DualChannel::new(endpoint(Plane::User), endpoint(Plane::System));
        assert_eq!(session.endpoint(Plane::System).plane(), Plane::System);
        assert!(!session.is_closed());

        session.close().await;
        assert!(session.is_closed());
        assert!(session.user().cancellation_token().is_cancelled());
        // Second close is a no-op.
        session.close().await;
        assert!(!session.system().close().await);
    }
}
