//! # gale-core
//!
//! Shared vocabulary for the gale messaging substrate.
//!
//! - **Envelope**: the wire record `{id, route, type, data, success}`
//! - **Branded IDs**: `MessageId`, `ConnectionId`, `RoomId` as newtypes
//! - **Codec**: pluggable payload/envelope serialization (`JsonCodec`)
//! - **Signing**: shared-key HMAC signatures used by the cluster join
//! - **Errors**: codec, transport and call errors via `thiserror`

#![deny(unsafe_code)]

pub mod codec;
pub mod constants;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod sign;

pub use codec::{Codec, JsonCodec};
pub use envelope::{Envelope, MessageKind, Plane};
pub use errors::{CallError, CodecError, TransportError};
pub use ids::{ConnectionId, MessageId, RoomId};
pub use sign::{HmacSigner, Signer};
