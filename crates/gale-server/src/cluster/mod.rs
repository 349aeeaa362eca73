//! Acceptor side of the cluster protocol.
//!
//! - [`coordinator`]: peer registry, least-loaded selection, stale sweep
//! - [`handlers`]: `/join`, `/report_status`, `/get_low_load_server_addr`
//! - [`member`]: joining another server's network and reporting load

pub mod coordinator;
pub mod handlers;
pub mod member;

pub use coordinator::{Coordinator, PeerStatus};
pub use handlers::{JoinRequest, ReportStatusRequest};
