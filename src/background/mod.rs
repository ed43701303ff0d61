//! # Desktop Background
//!
//! Applies a stored image as the desktop background.
//!
//! The layout style is described the way Windows' personalization store
//! models it: a `PicturePosition` code plus a `TileWallpaper` flag. Each
//! [`BackgroundSettingsStore`] translates that into its own desktop's
//! settings, writes them, and then tells the desktop to refresh so the change
//! is visible without logging out.
//!
//! | style   | position code | tile flag |
//! |---------|---------------|-----------|
//! | Tile    | 0             | true      |
//! | Center  | 0             | false     |
//! | Stretch | 2             | false     |
//! | Fit     | 6             | false     |
//! | Fill    | 10            | false     |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

mod cosmic;
mod gsettings;
mod kde;
#[cfg(windows)]
mod windows;

pub use cosmic::CosmicStore;
pub use gsettings::GSettingsStore;
pub use kde::PlasmaStore;
#[cfg(windows)]
pub use windows::RegistryStore;

/// How the image is laid out on the desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PicturePosition {
    Tile,
    Center,
    Stretch,
    Fit,
    #[default]
    Fill,
}

impl PicturePosition {
    pub fn position_code(self) -> u32 {
        match self {
            Self::Tile | Self::Center => 0,
            Self::Stretch => 2,
            Self::Fit => 6,
            Self::Fill => 10,
        }
    }

    pub fn tile(self) -> bool {
        matches!(self, Self::Tile)
    }
}

/// What gets written to the personalization store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundSettings {
    pub style: PicturePosition,
    /// Absolute path of the image to show.
    pub image_path: PathBuf,
}

impl BackgroundSettings {
    pub fn position_code(&self) -> u32 {
        self.style.position_code()
    }

    pub fn tile(&self) -> bool {
        self.style.tile()
    }

    /// `file://` URI for desktops that take one, percent-encoded.
    pub fn image_uri(&self) -> Result<String> {
        reqwest::Url::from_file_path(&self.image_path)
            .map(|url| url.to_string())
            .map_err(|_| PipelineError::Configuration {
                store: "background",
                message: format!("{} is not an absolute path", self.image_path.display()),
            })
    }
}

/// The OS-owned store holding desktop background configuration.
///
/// Implementations must stay cancellable: external commands and D-Bus
/// calls are awaited, never blocked on, so dropping the future at the run's
/// deadline also abandons the call.
#[async_trait]
pub trait BackgroundSettingsStore: Send + Sync {
    /// Short name for logs and errors.
    fn name(&self) -> &'static str;

    /// Persists the settings, failing with `Configuration` if the store
    /// cannot be opened for writing.
    async fn write(&self, settings: &BackgroundSettings) -> Result<()>;

    /// Tells the desktop the background changed.
    async fn notify_changed(&self, settings: &BackgroundSettings) -> Result<()>;
}

/// Writes settings for `path` in `style` and refreshes the desktop.
pub async fn apply(store: &dyn BackgroundSettingsStore, path: &Path, style: PicturePosition) -> Result<()> {
    let image_path = std::path::absolute(path).map_err(|e| PipelineError::configuration(store.name(), e))?;
    let settings = BackgroundSettings { style, image_path };

    tracing::info!(
        store = store.name(),
        path = %settings.image_path.display(),
        ?style,
        position_code = settings.position_code(),
        tile = settings.tile(),
        "setting background"
    );
    store.write(&settings).await?;
    store.notify_changed(&settings).await?;
    Ok(())
}

/// Desktop environments with a settings backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopKind {
    Windows,
    Cosmic,
    Kde,
    Cinnamon,
    Gnome,
    Other,
}

/// Identifies the desktop from `XDG_CURRENT_DESKTOP` (or the target OS).
pub fn detect_desktop() -> DesktopKind {
    if cfg!(windows) {
        return DesktopKind::Windows;
    }
    desktop_from_env(std::env::var("XDG_CURRENT_DESKTOP").ok().as_deref())
}

fn desktop_from_env(value: Option<&str>) -> DesktopKind {
    let Some(value) = value else {
        return DesktopKind::Other;
    };
    let value = value.to_lowercase();

    // XDG_CURRENT_DESKTOP is a colon-separated list, e.g. "ubuntu:GNOME"
    value
        .split(':')
        .find_map(|name| match name.trim() {
            "cosmic" => Some(DesktopKind::Cosmic),
            "kde" | "plasma" => Some(DesktopKind::Kde),
            "x-cinnamon" | "cinnamon" => Some(DesktopKind::Cinnamon),
            "gnome" | "unity" | "budgie" | "pantheon" => Some(DesktopKind::Gnome),
            _ => None,
        })
        .unwrap_or(DesktopKind::Other)
}

/// Returns the settings store for the running desktop.
pub fn system_store() -> Result<Box<dyn BackgroundSettingsStore>> {
    match detect_desktop() {
        #[cfg(windows)]
        DesktopKind::Windows => Ok(Box::new(RegistryStore)),
        DesktopKind::Cosmic => Ok(Box::new(CosmicStore::default())),
        DesktopKind::Kde => Ok(Box::new(PlasmaStore)),
        DesktopKind::Cinnamon => Ok(Box::new(GSettingsStore::cinnamon())),
        DesktopKind::Gnome => Ok(Box::new(GSettingsStore::gnome())),
        desktop => Err(PipelineError::Configuration {
            store: "background",
            message: format!("unsupported desktop ({desktop:?}); set XDG_CURRENT_DESKTOP"),
        }),
    }
}
