//! # gale-client
//!
//! Initiator side of gale. A [`Client`] opens the user and system planes
//! to a server, first asking the server whether a less loaded member of
//! its network should be used instead.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use gale_client::{Client, ClientConfig};
//!
//! let client = Client::new(ClientConfig::for_target("127.0.0.1:22100"));
//! client.connect().await?;
//! let reply: String = client.request("/echo", &"hello").await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod connect;
pub mod errors;
pub mod transport;

pub use client::{Client, ClientContext};
pub use config::ClientConfig;
pub use connect::{connect_dual, open_endpoint};
pub use errors::ClientError;
