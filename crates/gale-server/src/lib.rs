//! # gale-server
//!
//! Acceptor side of gale: an axum node serving the two planes.
//!
//! - `/user` and `/system` WebSocket upgrades, one shared router per plane
//! - Directory of users and rooms per plane, with paged listings
//! - Cluster coordinator: join / report / least-loaded redirect, stale sweep
//! - Member mode: join another node's network and report load
//! - `/health` and Prometheus `/metrics`
//! - Optional TLS from a PEM certificate and key
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod context;
pub mod directory;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod tls;
pub mod websocket;

pub use config::ServerConfig;
pub use context::ServerContext;
pub use errors::{ClusterError, DirectoryError, ServerError};
pub use server::GaleServer;
