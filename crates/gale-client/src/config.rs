//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use gale_core::constants::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use gale_core::{Codec, JsonCodec, Plane};
use gale_settings::ClientSettings;

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Server host to dial first.
    pub address: String,
    /// Server port to dial first.
    pub port: u16,
    /// Dial `wss://` instead of `ws://`.
    pub use_tls: bool,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Stay on the first server instead of asking for a less loaded one.
    pub direct_connect: bool,
    /// Codec for payloads and envelopes.
    pub codec: Arc<dyn Codec>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("timeout", &self.timeout)
            .field("direct_connect", &self.direct_connect)
            .field("codec", &self.codec.name())
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            use_tls: false,
            timeout: DEFAULT_TIMEOUT,
            direct_connect: false,
            codec: Arc::new(JsonCodec),
        }
    }
}

impl From<&ClientSettings> for ClientConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            address: settings.address.clone(),
            port: settings.port,
            use_tls: settings.use_tls,
            timeout: settings.timeout(),
            direct_connect: settings.direct_connect,
            ..Self::default()
        }
    }
}

impl ClientConfig {
    /// Config for `host:port` with defaults elsewhere.
    pub fn for_target(target: &str) -> Self {
        let mut config = Self::default();
        match target.rsplit_once(':').map(|(host, port)| (host, port.parse::<u16>())) {
            Some((host, Ok(port))) => {
                host.clone_into(&mut config.address);
                config.port = port;
            }
            _ => target.clone_into(&mut config.address),
        }
        config
    }

    /// The first server to dial, as `host:port`.
    pub fn target(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// WebSocket URL of `plane` on `target` (`host:port`).
    pub fn url(&self, target: &str, plane: Plane) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{scheme}://{target}{}", plane.path())
    }
}
