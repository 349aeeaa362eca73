//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GaleSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `GALE_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{GaleSettings, LogFormat};

/// Resolve the path to the settings file (`~/.gale/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".gale").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<GaleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid combination
/// of values is an error.
pub fn load_settings_from_path(path: &Path) -> Result<GaleSettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<GaleSettings> {
    let defaults = serde_json::to_value(GaleSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Integers must parse and fall within range, booleans accept
/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_env_overrides(settings: &mut GaleSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Same as [`apply_env_overrides`] with an injectable variable lookup.
pub fn apply_overrides(settings: &mut GaleSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Env { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("GALE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("GALE_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u64("GALE_TIMEOUT_MS", 1, 86_400_000) {
        settings.server.timeout_ms = v;
        settings.client.timeout_ms = v;
    }
    if let Some(v) = env.usize("GALE_PAGE_SIZE", 1, 1_000_000) {
        settings.server.page_size = v;
    }
    if let Some(v) = env.string("GALE_CERT_FILE") {
        settings.server.cert_file = Some(v.into());
    }
    if let Some(v) = env.string("GALE_KEY_FILE") {
        settings.server.key_file = Some(v.into());
    }

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = env.string("GALE_CLIENT_ADDRESS") {
        settings.client.address = v;
    }
    if let Some(v) = env.u16("GALE_CLIENT_PORT", 1, 65535) {
        settings.client.port = v;
    }
    if let Some(v) = env.bool("GALE_CLIENT_TLS") {
        settings.client.use_tls = v;
    }
    if let Some(v) = env.bool("GALE_DIRECT_CONNECT") {
        settings.client.direct_connect = v;
    }

    // ── Cluster ─────────────────────────────────────────────────────
    if let Some(v) = env.string("GALE_NETWORK_SIGN_KEY") {
        settings.cluster.network_sign_key = v;
    }
    if let Some(v) = env.string("GALE_JOIN_NETWORK") {
        settings.cluster.join_network = Some(v);
    }
    if let Some(v) = env.string("GALE_ADVERTISE_ADDRESS") {
        settings.cluster.advertise_address = Some(v);
    }
    if let Some(v) = env.u64("GALE_REPORT_INTERVAL_MS", 100, 86_400_000) {
        settings.cluster.report_interval_ms = v;
    }
    if let Some(v) = env.u64("GALE_REMOVE_INTERVAL_MS", 100, 86_400_000) {
        settings.cluster.remove_interval_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("GALE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("GALE_LOG_FORMAT") {
        match serde_json::from_value::<LogFormat>(Value::String(v.clone())) {
            Ok(format) => settings.logging.format = format,
            Err(_) => warn!(key = "GALE_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}
