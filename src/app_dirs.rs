//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux | Windows |
//! |---------|-------|-------|---------|
//! | Config | `~/Library/Application Support/lightsout/` | `~/.config/lightsout/` | `%APPDATA%\lightsout\` |
//! | Data   | `~/Library/Application Support/lightsout/` | `~/.local/share/lightsout/` | `%APPDATA%\lightsout\` |
//!
//! # Environment Overrides
//!
//! - `LIGHTSOUT_CONFIG_DIR`: overrides [`config_dir`]
//! - `LIGHTSOUT_DATA_DIR`: overrides [`data_dir`]

use std::path::PathBuf;

/// File name of the persisted config document.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/lightsout/` by default. Override with
/// the `LIGHTSOUT_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LIGHTSOUT_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("lightsout"))
        .unwrap_or_else(|| PathBuf::from("/tmp/lightsout-config"))
}

/// Application data directory, used for logs.
///
/// Resolves to `dirs::data_dir()/lightsout/` by default. Override with
/// the `LIGHTSOUT_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LIGHTSOUT_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("lightsout"))
        .unwrap_or_else(|| PathBuf::from("/tmp/lightsout-data"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Config document path (`config_dir()/config.json`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}
