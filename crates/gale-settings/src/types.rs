//! Settings schema. Every section defaults field-by-field, so a settings
//! file only needs the keys it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gale_core::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_PORT, DEFAULT_REMOVE_INTERVAL, DEFAULT_REPORT_INTERVAL,
    DEFAULT_TIMEOUT, NETWORK_KEY_BYTES,
};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object (`~/.gale/settings.json`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GaleSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Outbound connection settings.
    pub client: ClientSettings,
    /// Cluster membership settings.
    pub cluster: ClusterSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl GaleSettings {
    /// Reject combinations the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.server.timeout_ms == 0 {
            return Err(SettingsError::invalid("server.timeoutMs", "must be positive"));
        }
        if self.client.timeout_ms == 0 {
            return Err(SettingsError::invalid("client.timeoutMs", "must be positive"));
        }
        if self.server.page_size == 0 {
            return Err(SettingsError::invalid("server.pageSize", "must be positive"));
        }
        if self.server.cert_file.is_some() != self.server.key_file.is_some() {
            return Err(SettingsError::invalid(
                "server.certFile",
                "certFile and keyFile must be set together",
            ));
        }
        if self.cluster.network_sign_key.is_empty() {
            return Err(SettingsError::invalid("cluster.networkSignKey", "must not be empty"));
        }
        if self.cluster.remove_interval_ms <= self.cluster.report_interval_ms {
            return Err(SettingsError::invalid(
                "cluster.removeIntervalMs",
                format!(
                    "{} must exceed reportIntervalMs ({})",
                    self.cluster.remove_interval_ms, self.cluster.report_interval_ms
                ),
            ));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Timeout for requests a server sends to its users, in milliseconds.
    pub timeout_ms: u64,
    /// Directory page size.
    pub page_size: usize,
    /// Grace period for background tasks on shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// PEM certificate chain. With `key_file`, the listener serves TLS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,
    /// PEM private key matching `cert_file`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            timeout_ms: millis(DEFAULT_TIMEOUT),
            page_size: DEFAULT_PAGE_SIZE,
            shutdown_timeout_ms: 5_000,
            cert_file: None,
            key_file: None,
        }
    }
}

impl ServerSettings {
    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Certificate and key paths when both are set.
    pub fn tls_files(&self) -> Option<(&Path, &Path)> {
        Some((self.cert_file.as_deref()?, self.key_file.as_deref()?))
    }
}

/// Outbound connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Server host to dial.
    pub address: String,
    /// Server port to dial.
    pub port: u16,
    /// Dial `wss://` instead of `ws://`.
    pub use_tls: bool,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Skip the least-loaded redirect and stay on the first server.
    pub direct_connect: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            use_tls: false,
            timeout_ms: millis(DEFAULT_TIMEOUT),
            direct_connect: false,
        }
    }
}

impl ClientSettings {
    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Cluster membership settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterSettings {
    /// Shared key that signs join requests. Every member of a network must
    /// use the same key; the default is random per process.
    pub network_sign_key: String,
    /// `host:port` of a server to join as a member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_network: Option<String>,
    /// `host:port` this server tells peers and redirected clients to use.
    /// Defaults to the bound address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,
    /// Interval between load reports, in milliseconds.
    pub report_interval_ms: u64,
    /// Age after which a silent peer is evicted, in milliseconds.
    pub remove_interval_ms: u64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            network_sign_key: gale_core::sign::generate_key(NETWORK_KEY_BYTES),
            join_network: None,
            advertise_address: None,
            report_interval_ms: millis(DEFAULT_REPORT_INTERVAL),
            remove_interval_ms: millis(DEFAULT_REMOVE_INTERVAL),
        }
    }
}

impl ClusterSettings {
    /// Interval between load reports.
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    /// Peer eviction age.
    pub fn remove_interval(&self) -> Duration {
        Duration::from_millis(self.remove_interval_ms)
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = GaleSettings::default();
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 22100);
        assert_eq!(s.server.timeout(), Duration::from_secs(300));
        assert_eq!(s.server.page_size, 100);
        assert_eq!(s.cluster.report_interval(), Duration::from_secs(10));
        assert_eq!(s.cluster.remove_interval(), Duration::from_secs(30));
        assert_eq!(s.cluster.network_sign_key.len(), 128);
        assert!(s.cluster.join_network.is_none());
        assert_eq!(s.logging.format, LogFormat::Compact);
        s.validate().unwrap();
    }

    #[test]
    fn default_keys_differ_per_instance() {
        assert_ne!(
            ClusterSettings::default().network_sign_key,
            ClusterSettings::default().network_sign_key
        );
    }

    #[test]
    fn camel_case_field_names() {
        let value = serde_json::to_value(GaleSettings::default()).unwrap();
        assert!(value["cluster"]["networkSignKey"].is_string());
        assert!(value["cluster"]["reportIntervalMs"].is_u64());
        assert!(value["client"]["directConnect"].is_boolean());
        assert!(value["cluster"].get("joinNetwork").is_none());
    }

    #[test]
    fn remove_must_exceed_report() {
        let mut s = GaleSettings::default();
        s.cluster.report_interval_ms = 60_000;
        s.cluster.remove_interval_ms = 30_000;
        assert_matches!(
            s.validate(),
            Err(SettingsError::Invalid { field: "cluster.removeIntervalMs", .. })
        );
    }

    #[test]
    fn empty_key_rejected() {
        let mut s = GaleSettings::default();
        s.cluster.network_sign_key.clear();
        assert_matches!(
            s.validate(),
            Err(SettingsError::Invalid { field: "cluster.networkSignKey", .. })
        );
    }

    #[test]
    fn tls_files_come_in_pairs() {
        let mut s = GaleSettings::default();
        assert!(s.server.tls_files().is_none());
        assert!(serde_json::to_value(&s).unwrap()["server"].get("certFile").is_none());

        s.server.cert_file = Some(PathBuf::from("/etc/gale/cert.pem"));
        assert!(s.server.tls_files().is_none());
        assert_matches!(s.validate(), Err(SettingsError::Invalid { field: "server.certFile", .. }));

        s.server.key_file = Some(PathBuf::from("/etc/gale/key.pem"));
        s.validate().unwrap();
        let (cert, key) = s.server.tls_files().unwrap();
        assert_eq!(cert, Path::new("/etc/gale/cert.pem"));
        assert_eq!(key, Path::new("/etc/gale/key.pem"));
    }
}
