//! # Configuration Module
//!
//! User preferences are stored as JSON in:
//! `~/.config/bing-background/config.json`
//!
//! Every field has a default, so a missing or partial file still yields a
//! usable configuration. The loaded `Config` is passed explicitly into the
//! pipeline; nothing here is process-global.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::background::PicturePosition;

/// Directory name under the user's config dir.
const APP_DIR: &str = "bing-background";

/// Default Bing host for both the metadata API and the image assets.
pub const DEFAULT_SERVICE_HOST: &str = "https://www.bing.com";

/// Timeout applied to each request and to the whole run.
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// A fixed display size, used instead of querying the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

/// User configuration for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bing market code (e.g., "en-US").
    pub market: String,
    /// Scheme and host serving the API and the images.
    pub service_host: String,
    /// Overrides the platform Pictures directory as the storage root.
    pub pictures_dir: Option<PathBuf>,
    /// How the image is laid out on the desktop.
    pub style: PicturePosition,
    /// Optional proxy URL for all requests (e.g. "http://proxy:3128").
    pub proxy: Option<String>,
    /// Per-request and whole-run timeout in seconds.
    pub timeout_secs: u64,
    /// Skip display detection and use this size.
    pub display: Option<DisplaySize>,
    /// tracing filter directive (e.g. "info,bing_background=debug").
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            market: "en-US".to_string(),
            service_host: DEFAULT_SERVICE_HOST.to_string(),
            pictures_dir: None,
            style: PicturePosition::Fill,
            proxy: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            display: None,
            log_filter: None,
        }
    }
}

/// Returns the application config directory (`~/.config/bing-background`).
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

impl Config {
    /// Returns the path to the default configuration file.
    pub fn default_path() -> Option<PathBuf> {
        app_config_dir().map(|p| p.join("config.json"))
    }

    /// Loads the configuration from the default location.
    ///
    /// If the file doesn't exist or cannot be parsed, returns default values.
    pub fn load() -> Self {
        Self::default_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Loads the configuration from `path`, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Persists the configuration to `path` as pretty-printed JSON.
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {e}"))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {e}"))?;

        std::fs::write(path, content)
            .map_err(|e| format!("Failed to write config: {e}"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Root under which `Bing Backgrounds/` is created.
    ///
    /// Falls back to `~/Pictures` and then the current directory when the
    /// platform has no Pictures folder.
    pub fn pictures_root(&self) -> PathBuf {
        self.pictures_dir
            .clone()
            .or_else(dirs::picture_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join("Pictures")))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.market, "en-US");
        assert_eq!(config.service_host, DEFAULT_SERVICE_HOST);
        assert_eq!(config.style, PicturePosition::Fill);
        assert_eq!(config.timeout(), Duration::from_secs(45));
        assert!(config.proxy.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "market": "de-DE", "style": "Fit" }"#).unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.market, "de-DE");
        assert_eq!(config.style, PicturePosition::Fit);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn unreadable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        assert_eq!(Config::load_from(&dir.path().join("missing.json")), Config::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        let config = Config {
            proxy: Some("http://proxy.local:3128".to_string()),
            display: Some(DisplaySize { width: 2560, height: 1440 }),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn explicit_pictures_dir_wins() {
        let config = Config {
            pictures_dir: Some(PathBuf::from("/srv/pictures")),
            ..Config::default()
        };
        assert_eq!(config.pictures_root(), PathBuf::from("/srv/pictures"));
    }
}
