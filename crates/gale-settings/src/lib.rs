//! # gale-settings
//!
//! Layered configuration for gale nodes and clients.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GaleSettings::default()`]
//! 2. **Settings file**: `~/.gale/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `GALE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_under_gale_dir() {
        let path = settings_path();
        assert!(path.ends_with(".gale/settings.json"));
    }
}
