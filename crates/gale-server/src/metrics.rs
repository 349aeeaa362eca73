//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants. The channel engine records the frame and dispatch
// metrics under the same names.

/// Frames read (counter, labels: plane, kind).
pub const FRAMES_TOTAL: &str = "gale_frames_total";
/// Frames that did not decode as an envelope (counter, labels: plane).
pub const MALFORMED_FRAMES_TOTAL: &str = "gale_malformed_frames_total";
/// Failure Acks produced by dispatch (counter, labels: plane, `error_type`).
pub const DISPATCH_ERRORS_TOTAL: &str = "gale_dispatch_errors_total";
/// Handler duration seconds (histogram, labels: route).
pub const HANDLER_DURATION_SECONDS: &str = "gale_handler_duration_seconds";
/// WebSocket connections accepted (counter, labels: plane).
pub const WS_CONNECTIONS_TOTAL: &str = "gale_ws_connections_total";
/// WebSocket disconnections (counter, labels: plane).
pub const WS_DISCONNECTIONS_TOTAL: &str = "gale_ws_disconnections_total";
/// Open WebSocket connections (gauge, labels: plane).
pub const WS_CONNECTIONS_ACTIVE: &str = "gale_ws_connections_active";
/// Connection lifetime seconds (histogram, labels: plane).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "gale_ws_connection_duration_seconds";
/// Joined, non-evicted peers (gauge).
pub const CLUSTER_PEERS: &str = "gale_cluster_peers";
/// Join attempts (counter, labels: outcome).
pub const CLUSTER_JOINS_TOTAL: &str = "gale_cluster_joins_total";
/// Peers evicted for silence (counter).
pub const CLUSTER_EVICTIONS_TOTAL: &str = "gale_cluster_evictions_total";
/// Least-loaded lookups that pointed a client elsewhere (counter).
pub const CLUSTER_REDIRECTS_TOTAL: &str = "gale_cluster_redirects_total";
/// Load reports sent while a member (counter, labels: outcome).
pub const MEMBER_REPORTS_TOTAL: &str = "gale_member_reports_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        let names = [
            FRAMES_TOTAL,
            MALFORMED_FRAMES_TOTAL,
            DISPATCH_ERRORS_TOTAL,
            HANDLER_DURATION_SECONDS,
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            CLUSTER_PEERS,
            CLUSTER_JOINS_TOTAL,
            CLUSTER_EVICTIONS_TOTAL,
            CLUSTER_REDIRECTS_TOTAL,
            MEMBER_REPORTS_TOTAL,
        ];
        for name in names {
            assert!(name.starts_with("gale_"), "{name}");
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name}"
            );
        }
    }
}
