//! Member mode: join another server's network and report load to it.

use std::sync::Arc;

use gale_channel::{Endpoint, Router};
use gale_client::{ClientConfig, open_endpoint};
use gale_core::Plane;
use gale_core::constants::{ROUTE_JOIN, ROUTE_REPORT_STATUS};
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::handlers::{JoinRequest, ReportStatusRequest};
use crate::errors::ServerError;
use crate::server::GaleServer;

/// Spawn the member loop for `network`.
pub fn spawn(server: GaleServer, network: String, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(server, network, cancel))
}

/// Join `network`, report until the link drops, wait one report interval,
/// and try again. Stops when `cancel` fires.
#[instrument(skip_all, fields(network = %network))]
pub async fn run(server: GaleServer, network: String, cancel: CancellationToken) {
    let retry = server.config().report_interval;
    loop {
        match membership(&server, &network, &cancel).await {
            Ok(()) => return,
            Err(error) => warn!(%error, retry = ?retry, "network membership lost"),
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(retry) => {}
        }
    }
}

async fn membership(
    server: &GaleServer,
    network: &str,
    cancel: &CancellationToken,
) -> Result<(), ServerError> {
    let mut config = ClientConfig::for_target(network);
    config.timeout = server.config().timeout;
    config.codec = Arc::clone(&server.config().codec);
    let router = Arc::new(Router::new());
    let endpoint = open_endpoint(&config, network, Plane::System, router, ()).await?;

    let outcome = report_loop(server, &endpoint, cancel).await;
    let _ = endpoint.close().await;
    outcome
}

async fn report_loop(
    server: &GaleServer,
    endpoint: &Endpoint<()>,
    cancel: &CancellationToken,
) -> Result<(), ServerError> {
    let cluster = server.cluster();
    let addr = cluster.self_address();
    let join = JoinRequest {
        sign: cluster.sign(&addr),
        addr,
    };
    endpoint.request::<_, ()>(ROUTE_JOIN, &join).await?;
    info!(address = %join.addr, "joined network");

    let mut ticker = tokio::time::interval(server.config().report_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
        let report = ReportStatusRequest { load: cluster.self_load() };
        match endpoint.request::<_, ()>(ROUTE_REPORT_STATUS, &report).await {
            Ok(()) => counter!("gale_member_reports_total", "outcome" => "ok").increment(1),
            Err(error) => {
                counter!("gale_member_reports_total", "outcome" => "error").increment(1);
                return Err(error.into());
            }
        }
    }
}
