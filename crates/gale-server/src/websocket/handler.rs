//! Upgrade handlers for `/user` and `/system` and the per-connection
//! accept flow.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use gale_channel::{Endpoint, dispatcher};
use gale_core::Plane;
use metrics::{counter, gauge, histogram};
use tracing::{info, instrument, warn};

use super::transport;
use crate::context::ServerContext;
use crate::server::GaleServer;

/// GET /user
pub async fn user_upgrade(
    ws: WebSocketUpgrade,
    State(server): State<GaleServer>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| accept(server, Plane::User, socket))
}

/// GET /system
pub async fn system_upgrade(
    ws: WebSocketUpgrade,
    State(server): State<GaleServer>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| accept(server, Plane::System, socket))
}

/// Serve one upgraded socket until it closes or the server shuts down.
#[instrument(skip_all, fields(plane = %plane))]
pub async fn accept(server: GaleServer, plane: Plane, socket: WebSocket) {
    let (reader, writer) = transport::split(socket);
    let endpoint = Arc::new(Endpoint::new(
        plane,
        Arc::clone(server.router(plane)),
        Arc::clone(&server.config().codec),
        writer,
        server.config().timeout,
    ));
    let directory = Arc::clone(server.directory(plane));
    let user = match directory.register(Arc::clone(&endpoint)) {
        Ok(user) => user,
        Err(error) => {
            warn!(%error, "could not register connection");
            let _ = endpoint.close().await;
            return;
        }
    };

    let plane_label = plane.as_str();
    counter!("gale_ws_connections_total", "plane" => plane_label).increment(1);
    gauge!("gale_ws_connections_active", "plane" => plane_label).increment(1.0);
    info!(conn_id = %user.id(), users = directory.user_count(), "connection accepted");
    let connected_at = Instant::now();

    let shutdown = server.shutdown().token();
    let ctx = ServerContext::new(Arc::clone(&user), server.clone());
    let mut dispatch = dispatcher::spawn(Arc::clone(&endpoint), reader, ctx);
    tokio::select! {
        _ = &mut dispatch => {}
        () = shutdown.cancelled() => {
            let _ = endpoint.close().await;
            let _ = dispatch.await;
        }
    }

    let _ = directory.unregister(user.id());
    gauge!("gale_ws_connections_active", "plane" => plane_label).decrement(1.0);
    counter!("gale_ws_disconnections_total", "plane" => plane_label).increment(1);
    histogram!("gale_ws_connection_duration_seconds", "plane" => plane_label)
        .record(connected_at.elapsed().as_secs_f64());
    info!(conn_id = %user.id(), "connection closed");
}
