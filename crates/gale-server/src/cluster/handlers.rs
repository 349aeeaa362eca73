//! System-plane routes of the cluster protocol.

use std::convert::Infallible;

use gale_channel::{RouteError, Router, handler};
use gale_core::constants::{ROUTE_JOIN, ROUTE_LOW_LOAD_ADDR, ROUTE_REPORT_STATUS};
use serde::{Deserialize, Serialize};

use crate::context::ServerContext;

/// Payload of `/join`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Address the joining server advertises.
    pub addr: String,
    /// Hex HMAC-SHA256 of `addr` under the network key.
    pub sign: String,
}

/// Payload of `/report_status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatusRequest {
    /// Current load of the reporting server.
    pub load: i64,
}

/// Install `/join`, `/report_status` and `/get_low_load_server_addr`.
pub fn register(router: &Router<ServerContext>) -> Result<(), RouteError> {
    router.add_route(
        ROUTE_JOIN,
        handler::typed(|ctx: ServerContext, req: JoinRequest| async move {
            ctx.server()
                .cluster()
                .join(ctx.user().id().clone(), &req.addr, &req.sign)
        }),
    )?;
    router.add_route(
        ROUTE_REPORT_STATUS,
        handler::typed(|ctx: ServerContext, req: ReportStatusRequest| async move {
            ctx.server().cluster().report(ctx.user().id(), req.load)
        }),
    )?;
    router.add_route(
        ROUTE_LOW_LOAD_ADDR,
        handler::typed(|ctx: ServerContext, wants_new_address: bool| async move {
            Ok::<_, Infallible>(ctx.server().cluster().low_load_address(wants_new_address))
        }),
    )?;
    Ok(())
}
