//! # Display Detection
//!
//! Reads the active display's pixel size so the right resolution tier can
//! be requested. Only the primary display matters; multi-monitor setups get
//! the same image everywhere.

use async_trait::async_trait;

use crate::asset::Resolution;
use crate::config::DisplaySize;

/// Capability for querying the active display's size in pixels.
#[async_trait]
pub trait DisplayInfoProvider: Send + Sync {
    async fn current_size(&self) -> Result<DisplaySize, String>;
}

/// A provider that always answers with the configured size.
#[derive(Debug, Clone, Copy)]
pub struct FixedDisplay(pub DisplaySize);

#[async_trait]
impl DisplayInfoProvider for FixedDisplay {
    async fn current_size(&self) -> Result<DisplaySize, String> {
        Ok(self.0)
    }
}

/// Queries the operating system.
///
/// - Windows: `EnumDisplaySettingsW` for the current mode
/// - Linux/X11 (and XWayland): `xrandr --current`
/// - Linux fallback: preferred mode of the first connected DRM connector
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDisplay;

#[async_trait]
impl DisplayInfoProvider for SystemDisplay {
    #[cfg(windows)]
    async fn current_size(&self) -> Result<DisplaySize, String> {
        windows::current_size()
    }

    #[cfg(not(windows))]
    async fn current_size(&self) -> Result<DisplaySize, String> {
        let xrandr = crate::host::run_host_checked("xrandr", &["--current"])
            .await
            .and_then(|output| {
                parse_xrandr(&String::from_utf8_lossy(&output.stdout))
                    .ok_or_else(|| "xrandr reported no active output".to_string())
            });

        match xrandr {
            Ok(size) => Ok(size),
            Err(e) => {
                tracing::debug!(error = %e, "xrandr unavailable, reading DRM connectors");
                drm_preferred_size(std::path::Path::new("/sys/class/drm"))
            }
        }
    }
}

/// Selects the resolution tier for the active display.
///
/// Detection failure is not fatal: the default tier always exists upstream.
pub async fn select_resolution(provider: &dyn DisplayInfoProvider) -> Resolution {
    match provider.current_size().await {
        Ok(size) => {
            let resolution = Resolution::for_display(size.width, size.height);
            tracing::info!(width = size.width, height = size.height, %resolution, "display detected");
            resolution
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not detect display size, using {}", Resolution::DEFAULT);
            Resolution::DEFAULT
        }
    }
}

/// Parses "WIDTHxHEIGHT" with an optional "+X+Y" offset.
fn parse_geometry(token: &str) -> Option<DisplaySize> {
    let size = token.split('+').next()?;
    let (w, h) = size.split_once('x')?;
    Some(DisplaySize {
        width: w.parse().ok()?,
        height: h.parse().ok()?,
    })
}

/// Extracts the primary output's current mode from `xrandr --current`.
///
/// Preference: the `primary` output, then any connected output with a
/// geometry, then the screen's `current W x H`.
fn parse_xrandr(output: &str) -> Option<DisplaySize> {
    let connected_geometry = |line: &str| {
        line.split_whitespace()
            .skip_while(|t| *t != "connected")
            .find_map(parse_geometry)
    };

    let lines: Vec<&str> = output.lines().collect();

    lines
        .iter()
        .filter(|l| l.contains(" connected primary "))
        .find_map(|l| connected_geometry(*l))
        .or_else(|| {
            lines
                .iter()
                .filter(|l| l.contains(" connected "))
                .find_map(|l| connected_geometry(*l))
        })
        .or_else(|| {
            let screen = lines.iter().find(|l| l.starts_with("Screen "))?;
            let current = screen.split(',').find_map(|part| part.trim().strip_prefix("current "))?;
            let (w, h) = current.split_once(" x ")?;
            Some(DisplaySize {
                width: w.trim().parse().ok()?,
                height: h.trim().parse().ok()?,
            })
        })
}

/// Reads the preferred mode of the first connected connector under `root`.
fn drm_preferred_size(root: &std::path::Path) -> Result<DisplaySize, String> {
    let mut connectors: Vec<_> = std::fs::read_dir(root)
        .map_err(|e| format!("Failed to read {}: {e}", root.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.join("status").exists())
        .collect();
    connectors.sort();

    connectors
        .iter()
        .filter(|path| {
            std::fs::read_to_string(path.join("status"))
                .map(|s| s.trim() == "connected")
                .unwrap_or(false)
        })
        .find_map(|path| {
            let modes = std::fs::read_to_string(path.join("modes")).ok()?;
            modes.lines().next().and_then(parse_geometry)
        })
        .ok_or_else(|| "no connected display found".to_string())
}

#[cfg(windows)]
mod windows {
    use super::DisplaySize;
    use winapi::um::wingdi::DEVMODEW;
    use winapi::um::winuser::EnumDisplaySettingsW;

    const ENUM_CURRENT_SETTINGS: u32 = u32::MAX;

    pub fn current_size() -> Result<DisplaySize, String> {
        // SAFETY: DEVMODEW is plain data; dmSize tells the API which version we pass.
        let mut dev_mode: DEVMODEW = unsafe { std::mem::zeroed() };
        dev_mode.dmSize = std::mem::size_of::<DEVMODEW>() as u16;

        let ok = unsafe { EnumDisplaySettingsW(std::ptr::null(), ENUM_CURRENT_SETTINGS, &mut dev_mode) };
        if ok == 0 {
            return Err("EnumDisplaySettingsW failed".to_string());
        }

        Ok(DisplaySize {
            width: dev_mode.dmPelsWidth,
            height: dev_mode.dmPelsHeight,
        })
    }
}
