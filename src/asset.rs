//! # Asset Resolution
//!
//! Maps an image descriptor and a resolution tier to a concrete image URL.
//!
//! Bing serves every image as `<urlbase>_UHD.jpg` and scales it server-side
//! when `w`/`h` query parameters are present. Older images, and some markets,
//! only carry fixed-size variants, so when the UHD asset is missing we fall
//! back to the default `<urlbase>_1920x1080.jpg` variant.
//!
//! Probing only sends HEAD requests; the payload is fetched once, by
//! [`crate::bing::BingClient::download`].

use std::future::Future;

use crate::bing::ImageDescriptor;
use crate::error::{PipelineError, Result};

/// One of the two supported width/height tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const DEFAULT: Resolution = Resolution { width: 1920, height: 1080 };
    pub const HIGH_DENSITY: Resolution = Resolution { width: 3840, height: 2160 };

    /// Quantizes display dimensions to a tier.
    ///
    /// Anything larger than 1920x1080 in either dimension gets the
    /// high-density image; everything else (including exactly 1920x1080)
    /// gets the default.
    pub fn for_display(width: u32, height: u32) -> Self {
        if width > Self::DEFAULT.width || height > Self::DEFAULT.height {
            Self::HIGH_DENSITY
        } else {
            Self::DEFAULT
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A fully qualified image URL. Existence is established by probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    pub url: String,
}

/// Lightweight existence check for an asset URL.
pub trait AssetProbe {
    fn exists(&self, url: &str) -> impl Future<Output = bool> + Send;
}

/// URL of the UHD asset scaled to `resolution`.
pub fn uhd_url(descriptor: &ImageDescriptor, resolution: Resolution) -> String {
    let base = format!("{}_UHD.jpg", descriptor.base_url);
    // urlbase is normally "/th?id=...", so the parameters extend that query
    let separator = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{separator}w={}&h={}&rs=1&c=4",
        resolution.width, resolution.height
    )
}

/// URL of the fixed-size default asset.
pub fn fallback_url(descriptor: &ImageDescriptor) -> String {
    format!("{}_{}.jpg", descriptor.base_url, Resolution::DEFAULT)
}

/// Picks the first asset that exists: UHD at `resolution`, then the default.
pub async fn resolve<P: AssetProbe>(
    probe: &P,
    descriptor: &ImageDescriptor,
    resolution: Resolution,
) -> Result<AssetReference> {
    let primary = uhd_url(descriptor, resolution);
    if probe.exists(&primary).await {
        tracing::info!(%resolution, url = %primary, "background found");
        return Ok(AssetReference { url: primary });
    }

    let fallback = fallback_url(descriptor);
    tracing::info!(%resolution, "no background for this resolution, using {} instead", Resolution::DEFAULT);
    if probe.exists(&fallback).await {
        return Ok(AssetReference { url: fallback });
    }

    Err(PipelineError::AssetNotFound { primary, fallback })
}
