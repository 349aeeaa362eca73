//! `/health` endpoint.

use std::time::Instant;

use gale_core::Plane;
use serde::Serialize;

use crate::server::GaleServer;

/// Open connections per plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaneConnections {
    /// `/user` connections; this is the node's load.
    pub user: usize,
    /// `/system` connections (members and redirect lookups).
    pub system: usize,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"draining"` once shutdown has begun.
    pub status: &'static str,
    /// Seconds since the node was created.
    pub uptime_secs: u64,
    /// Advertised address; empty until the listener is bound.
    pub address: String,
    /// Open connections across both planes.
    pub connections: usize,
    /// Per-plane split of `connections`.
    pub planes: PlaneConnections,
    /// Joined cluster peers.
    pub peers: usize,
}

impl HealthResponse {
    fn new(
        started: Instant,
        draining: bool,
        address: String,
        planes: PlaneConnections,
        peers: usize,
    ) -> Self {
        Self {
            status: if draining { "draining" } else { "ok" },
            uptime_secs: started.elapsed().as_secs(),
            address,
            connections: planes.user + planes.system,
            planes,
            peers,
        }
    }
}

/// Snapshot `server`'s counters.
pub fn health_check(server: &GaleServer, started: Instant) -> HealthResponse {
    let planes = PlaneConnections {
        user: server.directory(Plane::User).user_count(),
        system: server.directory(Plane::System).user_count(),
    };
    HealthResponse::new(
        started,
        server.shutdown().is_shutting_down(),
        server.cluster().self_address(),
        planes,
        server.cluster().peer_count(),
    )
}
