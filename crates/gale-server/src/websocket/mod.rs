//! WebSocket gateway: plane upgrades and the axum frame transport.

pub mod handler;
pub mod transport;
