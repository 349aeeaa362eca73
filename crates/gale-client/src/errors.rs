//! Client error types.

use gale_channel::RouteError;
use gale_core::{CallError, TransportError};
use thiserror::Error;

/// Failure to establish or use a client session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Dialing or talking to a server failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The least-loaded lookup failed.
    #[error("address lookup failed: {0}")]
    Lookup(#[from] CallError),
    /// Servers kept redirecting past the hop limit.
    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),
    /// Handler registration was rejected.
    #[error(transparent)]
    Route(#[from] RouteError),
}
