//! Error types shared across the gale crates.

use thiserror::Error;

/// Failure to encode or decode a payload or envelope.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
    /// The input could not be decoded into the requested shape.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Failure on the physical connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading or writing the underlying socket failed.
    #[error("transport io: {0}")]
    Io(String),
    /// The connection was closed (locally or by the peer).
    #[error("connection closed")]
    Closed,
    /// Dialing the remote address failed.
    #[error("connect to {url} failed: {message}")]
    Connect {
        /// Target URL.
        url: String,
        /// Cause.
        message: String,
    },
}

/// Outcome of an outbound request that did not produce a value.
///
/// `Remote` means the peer answered and said no; `Timeout`, `Canceled` and
/// `Closed` mean no answer arrived.
#[derive(Debug, Error)]
pub enum CallError {
    /// The peer answered with a failure Ack carrying this text.
    #[error("remote error: {0}")]
    Remote(String),
    /// No Ack arrived before the deadline.
    #[error("request timeout")]
    Timeout,
    /// The caller's cancellation token fired first.
    #[error("request canceled")]
    Canceled,
    /// The endpoint closed while the call was pending.
    #[error("endpoint closed")]
    Closed,
    /// The endpoint has no connection to send on.
    #[error("not connected")]
    NotConnected,
    /// The request or its reply payload could not be (de)serialized.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Writing the request failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CallError {
    /// Whether no answer arrived (timeout, cancellation, close).
    pub fn is_unanswered(&self) -> bool {
        matches!(self, Self::Timeout | Self::Canceled | Self::Closed)
    }
}
