use async_trait::async_trait;
use std::os::windows::ffi::OsStrExt;

use winapi::um::winuser::{SystemParametersInfoW, SPIF_SENDWININICHANGE, SPIF_UPDATEINIFILE, SPI_SETDESKWALLPAPER};
use winreg::enums::{HKEY_CURRENT_USER, KEY_WRITE};
use winreg::RegKey;

use super::{BackgroundSettings, BackgroundSettingsStore};
use crate::error::{PipelineError, Result};

/// `HKCU\Control Panel\Desktop`, the Windows personalization store.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStore;

const DESKTOP_KEY: &str = r"Control Panel\Desktop";

#[async_trait]
impl BackgroundSettingsStore for RegistryStore {
    fn name(&self) -> &'static str {
        "registry"
    }

    async fn write(&self, settings: &BackgroundSettings) -> Result<()> {
        let key = RegKey::predef(HKEY_CURRENT_USER)
            .open_subkey_with_flags(DESKTOP_KEY, KEY_WRITE)
            .map_err(|e| PipelineError::configuration("registry", format!("could not open {DESKTOP_KEY} for writing: {e}")))?;

        let tile = if settings.tile() { "1" } else { "0" };
        key.set_value("PicturePosition", &settings.position_code().to_string())
            .and_then(|_| key.set_value("TileWallpaper", &tile))
            .map_err(|e| PipelineError::configuration("registry", e))
    }

    async fn notify_changed(&self, settings: &BackgroundSettings) -> Result<()> {
        let mut wide: Vec<u16> = settings.image_path.as_os_str().encode_wide().collect();
        wide.push(0);

        // The WM_SETTINGCHANGE broadcast waits on every top-level window
        tokio::task::spawn_blocking(move || {
            // SAFETY: `wide` is a NUL-terminated UTF-16 buffer that outlives the call.
            let ok = unsafe {
                SystemParametersInfoW(
                    SPI_SETDESKWALLPAPER,
                    0,
                    wide.as_mut_ptr().cast(),
                    SPIF_UPDATEINIFILE | SPIF_SENDWININICHANGE,
                )
            };
            if ok == 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(())
            }
        })
        .await
        .map_err(|e| PipelineError::configuration("registry", e))?
        .map_err(|e| PipelineError::configuration("registry", e))
    }
}
