//! Route names and protocol defaults shared by both ends.

use std::time::Duration;

/// System route: a peer server joins the network.
pub const ROUTE_JOIN: &str = "/join";
/// System route: a joined peer reports its load.
pub const ROUTE_REPORT_STATUS: &str = "/report_status";
/// System route: ask which server a client should use.
pub const ROUTE_LOW_LOAD_ADDR: &str = "/get_low_load_server_addr";

/// Ack payload for a route with no handler.
pub const ROUTE_NOT_FOUND: &str = "route not found";

/// Default listen / connect port.
pub const DEFAULT_PORT: u16 = 22100;
/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default interval between load reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
/// Default age after which a silent peer is evicted.
pub const DEFAULT_REMOVE_INTERVAL: Duration = Duration::from_secs(30);
/// Default directory page size.
pub const DEFAULT_PAGE_SIZE: usize = 100;
/// Length in bytes of a generated network key.
pub const NETWORK_KEY_BYTES: usize = 64;
/// Redirect hops an initiator follows before giving up.
pub const MAX_REDIRECTS: usize = 8;
