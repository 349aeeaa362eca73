//! Server configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gale_core::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_REMOVE_INTERVAL, DEFAULT_REPORT_INTERVAL, DEFAULT_TIMEOUT,
    NETWORK_KEY_BYTES,
};
use gale_core::{Codec, JsonCodec};
use gale_settings::GaleSettings;

/// Configuration for a gale node.
#[derive(Clone)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Timeout for requests the server sends to its users.
    pub timeout: Duration,
    /// Directory page size.
    pub page_size: usize,
    /// Grace period for background tasks on shutdown.
    pub shutdown_timeout: Duration,
    /// PEM certificate chain; with `key_file` the listener serves TLS.
    pub cert_file: Option<PathBuf>,
    /// PEM private key for `cert_file`.
    pub key_file: Option<PathBuf>,
    /// Shared key for join signatures.
    pub network_sign_key: String,
    /// `host:port` of a server to join, if any.
    pub join_network: Option<String>,
    /// Address announced to peers and redirected clients. Defaults to the
    /// bound address.
    pub advertise_address: Option<String>,
    /// Interval between load reports when joined to a network.
    pub report_interval: Duration,
    /// Age after which a silent peer is evicted.
    pub remove_interval: Duration,
    /// Codec for payloads and envelopes on both planes.
    pub codec: Arc<dyn Codec>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("page_size", &self.page_size)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("cert_file", &self.cert_file)
            .field("network_sign_key", &"<redacted>")
            .field("join_network", &self.join_network)
            .field("advertise_address", &self.advertise_address)
            .field("report_interval", &self.report_interval)
            .field("remove_interval", &self.remove_interval)
            .field("codec", &self.codec.name())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            timeout: DEFAULT_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            shutdown_timeout: Duration::from_secs(5),
            cert_file: None,
            key_file: None,
            network_sign_key: gale_core::sign::generate_key(NETWORK_KEY_BYTES),
            join_network: None,
            advertise_address: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            remove_interval: DEFAULT_REMOVE_INTERVAL,
            codec: Arc::new(JsonCodec),
        }
    }
}

impl From<&GaleSettings> for ServerConfig {
    fn from(settings: &GaleSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            timeout: settings.server.timeout(),
            page_size: settings.server.page_size,
            shutdown_timeout: settings.server.shutdown_timeout(),
            cert_file: settings.server.cert_file.clone(),
            key_file: settings.server.key_file.clone(),
            network_sign_key: settings.cluster.network_sign_key.clone(),
            join_network: settings.cluster.join_network.clone(),
            advertise_address: settings.cluster.advertise_address.clone(),
            report_interval: settings.cluster.report_interval(),
            remove_interval: settings.cluster.remove_interval(),
            codec: Arc::new(JsonCodec),
        }
    }
}

impl ServerConfig {
    /// Bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Certificate and key when the listener should serve TLS.
    pub fn tls_files(&self) -> Option<(&Path, &Path)> {
        Some((self.cert_file.as_deref()?, self.key_file.as_deref()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_address(), "127.0.0.1:0");
        assert_eq!(cfg.page_size, 100);
        assert_eq!(cfg.network_sign_key.len(), NETWORK_KEY_BYTES * 2);
        assert!(cfg.tls_files().is_none());
    }

    #[test]
    fn from_settings_copies_cluster_section() {
        let mut settings = GaleSettings::default();
        settings.server.port = 23000;
        settings.cluster.join_network = Some("10.0.0.1:22100".into());
        settings.cluster.network_sign_key = "k".into();
        settings.cluster.report_interval_ms = 2_000;
        settings.server.cert_file = Some("/tls/cert.pem".into());
        settings.server.key_file = Some("/tls/key.pem".into());
        let cfg = ServerConfig::from(&settings);
        assert_eq!(
            cfg.tls_files(),
            Some((Path::new("/tls/cert.pem"), Path::new("/tls/key.pem")))
        );
        assert_eq!(cfg.bind_address(), "0.0.0.0:23000");
        assert_eq!(cfg.join_network.as_deref(), Some("10.0.0.1:22100"));
        assert_eq!(cfg.network_sign_key, "k");
        assert_eq!(cfg.report_interval, Duration::from_secs(2));
        assert_eq!(cfg.remove_interval, Duration::from_secs(30));
    }

    #[test]
    fn debug_redacts_key() {
        let cfg = ServerConfig {
            network_sign_key: "secret-key".into(),
            ..ServerConfig::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("redacted"));
    }
}
