//! # gale
//!
//! Node binary: loads settings, starts a gale node on both planes with an
//! `/echo` route, optionally joins a network, and stops on ctrl-c.

#![deny(unsafe_code)]

use std::convert::Infallible;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gale_channel::handler;
use gale_server::{GaleServer, ServerConfig, ServerContext};
use gale_settings::GaleSettings;
use serde_json::Value;

/// gale node.
#[derive(Parser, Debug)]
#[command(name = "gale", about = "gale WebSocket RPC node")]
struct Cli {
    /// Settings file (default: ~/.gale/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind host.
    #[arg(long)]
    host: Option<String>,

    /// Bind port.
    #[arg(long)]
    port: Option<u16>,

    /// `host:port` of a node whose network to join.
    #[arg(long)]
    join: Option<String>,

    /// Log level filter, e.g. `info` or `gale_server=debug`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<GaleSettings> {
        let mut settings = match &self.config {
            Some(path) => gale_settings::loader::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => gale_settings::loader::load_settings().context("Failed to load settings")?,
        };
        self.apply(&mut settings);
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }

    fn apply(&self, settings: &mut GaleSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(join) = &self.join {
            settings.cluster.join_network = Some(join.clone());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn build_server(settings: &GaleSettings) -> Result<GaleServer> {
    let metrics = gale_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = GaleServer::new(ServerConfig::from(settings), metrics)
        .context("Failed to create server")?;
    server
        .add_handler(
            "/echo",
            handler::typed(|_ctx: ServerContext, value: Value| async move {
                Ok::<_, Infallible>(value)
            }),
        )
        .context("Failed to register /echo")?;
    Ok(server)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load()?;
    gale_logging::init_from_settings(&settings.logging);

    let server = build_server(&settings)?;
    let (addr, handle) = server.listen().await.context("Failed to bind listener")?;
    tracing::info!(
        %addr,
        join = ?settings.cluster.join_network,
        "gale {} ready",
        env!("CARGO_PKG_VERSION")
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    let report = server.shutdown_gracefully().await;
    tracing::info!(
        finished = ?report.finished,
        aborted = ?report.aborted,
        "background tasks drained"
    );
    handle.await.context("Server task panicked")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gale_core::Plane;

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "gale",
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--join",
            "10.0.0.1:22100",
            "--log-level",
            "debug",
        ]);
        let mut settings = GaleSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.cluster.join_network.as_deref(), Some("10.0.0.1:22100"));
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn no_flags_keeps_settings() {
        let cli = Cli::parse_from(["gale"]);
        let mut settings = GaleSettings::default();
        let before = settings.server.port;
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, before);
        assert!(settings.cluster.join_network.is_none());
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = std::env::temp_dir().join("gale-missing-settings-test");
        let cli = Cli::parse_from(["gale", "--config", dir.join("nope.json").to_str().unwrap()]);
        let settings = cli.load().unwrap();
        assert_eq!(settings.server.page_size, GaleSettings::default().server.page_size);
    }

    #[tokio::test]
    async fn node_serves_echo_route() {
        let mut settings = GaleSettings::default();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = 0;
        let server = build_server(&settings).unwrap();
        assert_eq!(server.router(Plane::User).routes(), vec!["/echo"]);
        let (_addr, handle) = server.listen().await.unwrap();
        let report = server.shutdown_gracefully().await;
        assert!(report.aborted.is_empty());
        handle.await.unwrap();
    }
}
