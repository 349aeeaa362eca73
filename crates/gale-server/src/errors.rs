//! Server error types.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use gale_channel::RouteError;
use gale_core::{CallError, TransportError};
use thiserror::Error;

/// Failure to start or run a node.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Route registration was rejected.
    #[error(transparent)]
    Route(#[from] RouteError),
    /// A call to a peer failed.
    #[error(transparent)]
    Call(#[from] CallError),
    /// Dialing a peer failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The metrics recorder could not be installed.
    #[error("metrics: {0}")]
    Metrics(String),
    /// The certificate or key could not be loaded.
    #[error("tls: {}: {message}", path.display())]
    Tls {
        /// File that failed.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },
}

impl ServerError {
    pub(crate) fn tls(path: &Path, error: impl Display) -> Self {
        Self::Tls {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}

/// Directory bookkeeping errors. Returned to handlers that manage rooms.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// An entry with this id is already indexed.
    #[error("{0} already exists")]
    Duplicate(String),
    /// The user already belongs to a room.
    #[error("user {0} is already in a room")]
    AlreadyInRoom(String),
    /// The user does not belong to any room.
    #[error("user {0} is not in any room")]
    NotInRoom(String),
    /// The user is not a member of this room.
    #[error("user {0} not found")]
    NotMember(String),
    /// The owning directory has been dropped.
    #[error("directory closed")]
    Closed,
}

/// Cluster protocol failures, sent back as failure Acks.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClusterError {
    /// Join signature did not verify against the network key.
    #[error("invalid sign")]
    InvalidSign,
    /// Status report from a connection that never joined.
    #[error("not joined")]
    NotJoined,
}
