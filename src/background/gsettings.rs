use async_trait::async_trait;

use super::{BackgroundSettings, BackgroundSettingsStore, PicturePosition};
use crate::error::{PipelineError, Result};
use crate::host::run_host_checked;

/// GNOME-family desktops, configured through dconf via `gsettings`.
///
/// The shell watches the keys, so writing them is also the notification.
#[derive(Debug, Clone, Copy)]
pub struct GSettingsStore {
    schema: &'static str,
    /// GNOME 42+ keeps a separate key for the dark style.
    has_dark_variant: bool,
}

impl GSettingsStore {
    pub fn gnome() -> Self {
        Self {
            schema: "org.gnome.desktop.background",
            has_dark_variant: true,
        }
    }

    pub fn cinnamon() -> Self {
        Self {
            schema: "org.cinnamon.desktop.background",
            has_dark_variant: false,
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        run_host_checked("gsettings", &["set", self.schema, key, value])
            .await
            .map(drop)
            .map_err(|e| PipelineError::configuration("gsettings", e))
    }
}

/// `picture-options` value for each style.
pub(super) fn picture_options(style: PicturePosition) -> &'static str {
    match style {
        PicturePosition::Tile => "wallpaper",
        PicturePosition::Center => "centered",
        PicturePosition::Stretch => "stretched",
        PicturePosition::Fit => "scaled",
        PicturePosition::Fill => "zoom",
    }
}

#[async_trait]
impl BackgroundSettingsStore for GSettingsStore {
    fn name(&self) -> &'static str {
        "gsettings"
    }

    async fn write(&self, settings: &BackgroundSettings) -> Result<()> {
        let uri = settings.image_uri()?;
        self.set("picture-options", picture_options(settings.style)).await?;
        self.set("picture-uri", &uri).await?;

        if self.has_dark_variant {
            // Older GNOME releases lack the key
            if let Err(e) = self.set("picture-uri-dark", &uri).await {
                tracing::debug!(error = %e, "picture-uri-dark not set");
            }
        }
        Ok(())
    }

    async fn notify_changed(&self, _settings: &BackgroundSettings) -> Result<()> {
        Ok(())
    }
}
