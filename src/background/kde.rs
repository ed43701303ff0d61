use async_trait::async_trait;

use super::{BackgroundSettings, BackgroundSettingsStore, PicturePosition};
use crate::error::{PipelineError, Result};

/// KDE Plasma, configured through the PlasmaShell scripting API on D-Bus.
///
/// `writeConfig` takes effect immediately, so there is nothing extra to
/// notify.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlasmaStore;

/// `org.kde.image` FillMode values (Qt `Image.fillMode`).
pub(super) fn fill_mode(style: PicturePosition) -> u32 {
    match style {
        PicturePosition::Stretch => 0,
        PicturePosition::Fit => 1,
        PicturePosition::Fill => 2,
        PicturePosition::Tile => 3,
        PicturePosition::Center => 6,
    }
}

/// Desktop script setting image and fill mode on every desktop.
pub(super) fn plasma_script(uri: &str, style: PicturePosition) -> String {
    format!(
        "var allDesktops = desktops();\n\
         for (var i = 0; i < allDesktops.length; i++) {{\n\
           var d = allDesktops[i];\n\
           d.wallpaperPlugin = 'org.kde.image';\n\
           d.currentConfigGroup = ['Wallpaper', 'org.kde.image', 'General'];\n\
           d.writeConfig('FillMode', {mode});\n\
           d.writeConfig('Image', '{uri}');\n\
         }}\n",
        mode = fill_mode(style),
        uri = uri.replace('\'', "\\'"),
    )
}

#[async_trait]
impl BackgroundSettingsStore for PlasmaStore {
    fn name(&self) -> &'static str {
        "plasmashell"
    }

    async fn write(&self, settings: &BackgroundSettings) -> Result<()> {
        let script = plasma_script(&settings.image_uri()?, settings.style);

        let connection = zbus::Connection::session()
            .await
            .map_err(|e| PipelineError::configuration("plasmashell", e))?;
        connection
            .call_method(
                Some("org.kde.plasmashell"),
                "/PlasmaShell",
                Some("org.kde.PlasmaShell"),
                "evaluateScript",
                &script,
            )
            .await
            .map_err(|e| PipelineError::configuration("plasmashell", e))?;
        Ok(())
    }

    async fn notify_changed(&self, _settings: &BackgroundSettings) -> Result<()> {
        Ok(())
    }
}
