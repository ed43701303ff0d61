use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::{BackgroundSettings, BackgroundSettingsStore, PicturePosition};
use crate::error::{PipelineError, Result};
use crate::host::{run_host_command, spawn_host_command};

/// COSMIC desktop.
///
/// cosmic-bg reads its configuration from RON files under
/// `~/.config/cosmic/com.system76.CosmicBackground/v1/`. There is no reload
/// API, so after writing the file the `cosmic-bg` process is restarted.
#[derive(Debug, Clone)]
pub struct CosmicStore {
    /// Directory holding the `all` and `same-on-all` entries.
    config_dir: Option<PathBuf>,
}

impl Default for CosmicStore {
    fn default() -> Self {
        // home_dir() rather than config_dir(): inside Flatpak config_dir()
        // points into the sandbox, but cosmic-bg reads the host's ~/.config
        match dirs::home_dir() {
            Some(home) => Self::with_config_dir(home.join(".config/cosmic/com.system76.CosmicBackground/v1")),
            None => Self { config_dir: None },
        }
    }
}

impl CosmicStore {
    pub fn with_config_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: Some(dir.into()),
        }
    }
}

/// cosmic-bg `scaling_mode`. It has no tile or center mode; those letterbox.
pub(super) fn scaling_mode(style: PicturePosition) -> &'static str {
    match style {
        PicturePosition::Fill => "Zoom",
        PicturePosition::Stretch => "Stretch",
        PicturePosition::Fit | PicturePosition::Center | PicturePosition::Tile => "Fit((0.0, 0.0, 0.0))",
    }
}

/// Escapes `text` for a double-quoted RON string.
fn ron_string(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

pub(super) fn background_config(settings: &BackgroundSettings) -> String {
    format!(
        r#"(
    output: "all",
    source: Path("{}"),
    filter_by_theme: false,
    rotation_frequency: 300,
    filter_method: Lanczos,
    scaling_mode: {},
    sampling_method: Alphanumeric,
)"#,
        ron_string(&settings.image_path.to_string_lossy()),
        scaling_mode(settings.style)
    )
}

#[async_trait]
impl BackgroundSettingsStore for CosmicStore {
    fn name(&self) -> &'static str {
        "cosmic-bg"
    }

    async fn write(&self, settings: &BackgroundSettings) -> Result<()> {
        let dir = self
            .config_dir
            .as_ref()
            .ok_or_else(|| PipelineError::configuration("cosmic-bg", "could not find home directory"))?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PipelineError::configuration("cosmic-bg", e))?;
        tokio::fs::write(dir.join("same-on-all"), "true")
            .await
            .map_err(|e| PipelineError::configuration("cosmic-bg", e))?;
        tokio::fs::write(dir.join("all"), background_config(settings))
            .await
            .map_err(|e| PipelineError::configuration("cosmic-bg", e))?;
        Ok(())
    }

    async fn notify_changed(&self, _settings: &BackgroundSettings) -> Result<()> {
        // SIGTERM makes the session restart cosmic-bg with the new config
        let _ = run_host_command("pkill", &["-TERM", "-x", "cosmic-bg"]).await;
        tokio::time::sleep(Duration::from_millis(1000)).await;

        match run_host_command("pgrep", &["-x", "cosmic-bg"]).await {
            Ok(output) if output.status.success() => Ok(()),
            _ => {
                tracing::debug!("cosmic-bg not restarted by the session, starting it");
                spawn_host_command("cosmic-bg")
                    .map(drop)
                    .map_err(|e| PipelineError::configuration("cosmic-bg", format!("failed to start cosmic-bg: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_config_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CosmicStore::with_config_dir(dir.path().join("v1"));
        let settings = BackgroundSettings {
            style: PicturePosition::Fill,
            image_path: PathBuf::from("/home/u/Pictures/Bing Backgrounds/2024/3-15-2024.jpeg"),
        };

        store.write(&settings).await.unwrap();

        let all = std::fs::read_to_string(dir.path().join("v1/all")).unwrap();
        assert!(all.contains(r#"source: Path("/home/u/Pictures/Bing Backgrounds/2024/3-15-2024.jpeg"),"#));
        assert!(all.contains("scaling_mode: Zoom,"));
        assert_eq!(std::fs::read_to_string(dir.path().join("v1/same-on-all")).unwrap(), "true");
    }

    #[test]
    fn quotes_and_backslashes_are_escaped() {
        let settings = BackgroundSettings {
            style: PicturePosition::Fit,
            image_path: PathBuf::from(r#"/home/u/My "Pics"\old/3-15-2024.jpeg"#),
        };

        let config = background_config(&settings);

        assert!(config.contains(r#"source: Path("/home/u/My \"Pics\"\\old/3-15-2024.jpeg"),"#));
    }

    #[test]
    fn unsupported_styles_letterbox() {
        assert_eq!(scaling_mode(PicturePosition::Stretch), "Stretch");
        assert!(scaling_mode(PicturePosition::Tile).starts_with("Fit("));
    }
}
