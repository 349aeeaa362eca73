//! # gale-channel
//!
//! The message-channel engine shared by initiators and acceptors.
//!
//! - [`transport`]: frame reader/writer traits plus an in-memory pair
//! - [`correlator`]: outstanding calls and their single-fire completions
//! - [`handler`] / [`middleware`] / [`router`]: typed handlers, middleware
//!   chain, dispatch
//! - [`dispatcher`]: the per-connection read loop
//! - [`endpoint`]: one plane of one connection (send, request, close)
//! - [`session`]: the user/system dual-channel pair

#![deny(unsafe_code)]

pub mod correlator;
pub mod dispatcher;
pub mod endpoint;
pub mod handler;
pub mod middleware;
pub mod router;
pub mod session;
pub mod transport;

pub use correlator::{CallResult, Correlator, PendingHandle};
pub use endpoint::Endpoint;
pub use handler::{Handler, PayloadShape};
pub use middleware::Middleware;
pub use router::{DispatchError, RouteError, Router};
pub use session::DualChannel;
pub use transport::{FrameReader, FrameWriter};
