//! # Bing API Client
//!
//! Handles communication with the Bing Homepage Image Archive API to fetch
//! the daily image descriptor, probe asset URLs and download the image.
//!
//! ## API Endpoint
//! ```text
//! https://www.bing.com/HPImageArchive.aspx?format=js&idx=0&n=1&mkt=<market>
//! ```
//!
//! Parameters:
//! - `format=js`: Return JSON response
//! - `idx=0`: Start from today's image (0=today, 1=yesterday, etc.)
//! - `n=1`: Number of images to return
//! - `mkt=<market>`: Regional market code (e.g., "en-US")
//!
//! The response carries a partial `urlbase` (e.g. `/th?id=OHR.Name_EN-US123`)
//! that is joined with the service host and a resolution suffix by
//! [`crate::asset`].

use bytes::Bytes;
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;

use crate::asset::{AssetProbe, AssetReference};
use crate::config::Config;
use crate::error::{PipelineError, Result};

/// Path of the Homepage Image Archive API on the service host.
const BING_API_PATH: &str = "/HPImageArchive.aspx";

/// Delimiter between description and attribution in the API's copyright text.
const COPYRIGHT_DELIMITER: &str = " (";

/// Raw API response from Bing.
#[derive(Debug, Clone, Deserialize)]
struct ArchiveResponse {
    images: Vec<ArchiveImage>,
}

/// The subset of an image entry the pipeline relies on.
///
/// Any of these missing fails deserialization, which surfaces as
/// `PipelineError::Parse` at this boundary.
#[derive(Debug, Clone, Deserialize)]
struct ArchiveImage {
    /// Combined text, e.g. "Northern Lights (© Photographer X)"
    copyright: String,
    title: String,
    /// Partial URL path without resolution suffix
    urlbase: String,
}

/// The day's featured image, validated and ready for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub title: String,
    pub description: String,
    /// Attribution, `None` when the API text carries none.
    pub copyright: Option<String>,
    /// Service host joined with `urlbase`, no resolution suffix.
    pub base_url: String,
}

impl ImageDescriptor {
    fn from_archive(image: ArchiveImage, host: &str) -> Result<Self> {
        for (field, value) in [
            ("title", &image.title),
            ("copyright", &image.copyright),
            ("urlbase", &image.urlbase),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::Parse {
                    target: BING_API_PATH.to_string(),
                    message: format!("images[0].{field} is blank"),
                });
            }
        }
        let urlbase = image.urlbase.trim();

        let (description, copyright) = split_copyright(&image.copyright);
        Ok(Self {
            title: image.title.trim().to_string(),
            description,
            copyright,
            base_url: format!("{}{}", host.trim_end_matches('/'), urlbase),
        })
    }
}

/// Splits "Description (Attribution)" on the first `" ("`.
///
/// The attribution loses its trailing `)` and is `None` if nothing but
/// whitespace remains. Text without the delimiter is all description.
pub fn split_copyright(text: &str) -> (String, Option<String>) {
    match text.split_once(COPYRIGHT_DELIMITER) {
        Some((description, rest)) => {
            let rest = rest.strip_suffix(')').unwrap_or(rest).trim();
            let copyright = (!rest.is_empty()).then(|| rest.to_string());
            (description.trim().to_string(), copyright)
        }
        None => (text.trim().to_string(), None),
    }
}

/// A downloaded image, owned by a single pipeline run.
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    bytes: Bytes,
    format: image::ImageFormat,
    width: u32,
    height: u32,
}

impl DownloadedImage {
    /// Validates `bytes` as an image and reads its header.
    ///
    /// Bing answers some bad requests with an HTML page and a 200, so the
    /// content is checked rather than trusted.
    pub fn from_bytes(bytes: Bytes, source: &str) -> Result<Self> {
        let invalid = |message: String| PipelineError::InvalidImage {
            target: source.to_string(),
            message,
        };

        let format = image::guess_format(&bytes).map_err(|e| invalid(e.to_string()))?;
        let (width, height) = image::ImageReader::with_format(Cursor::new(&bytes[..]), format)
            .into_dimensions()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            bytes,
            format,
            width,
            height,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> image::ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Fully decodes the pixels, for re-encoding into another format.
    pub fn decode(&self) -> Result<image::DynamicImage> {
        image::load_from_memory_with_format(&self.bytes, self.format)
            .map_err(|e| PipelineError::Encoding(e.to_string()))
    }
}

/// HTTP client for one pipeline run.
///
/// Built from the run's `Config` so proxy, host, market and timeout are all
/// explicit rather than ambient.
#[derive(Debug, Clone)]
pub struct BingClient {
    http: reqwest::Client,
    host: String,
    market: String,
    timeout: Duration,
}

impl BingClient {
    /// Builds the client for one run.
    ///
    /// # Arguments
    /// * `config` - Supplies the service host, market, timeout and optional proxy
    ///
    /// # Returns
    /// `Err(Configuration)` if the proxy URL is invalid.
    pub fn new(config: &Config) -> Result<Self> {
        let timeout = config.timeout();
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bing-background/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| PipelineError::configuration("proxy", e))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| PipelineError::configuration("http client", e))?;

        Ok(Self {
            http,
            host: config.service_host.trim_end_matches('/').to_string(),
            market: config.market.clone(),
            timeout,
        })
    }

    fn api_url(&self) -> String {
        format!(
            "{}{}?format=js&idx=0&n=1&mkt={}",
            self.host, BING_API_PATH, self.market
        )
    }

    /// Fetches today's image descriptor.
    ///
    /// Queries the Homepage Image Archive for the current day's image in the
    /// configured market. One request, no retries.
    ///
    /// # Returns
    /// * `Ok(ImageDescriptor)` - Title, split description/attribution and the base URL
    /// * `Err(Transport)` - Connection failure or non-success status
    /// * `Err(TimedOut)` - No response within the request timeout
    /// * `Err(Parse)` - Payload missing `title`, `copyright` or `urlbase`, or any of them blank
    ///
    /// # Example
    /// ```ignore
    /// let descriptor = BingClient::new(&config)?.fetch_descriptor().await?;
    /// ```
    pub async fn fetch_descriptor(&self) -> Result<ImageDescriptor> {
        const OPERATION: &str = "metadata fetch";
        let url = self.api_url();
        tracing::info!(%url, "downloading image metadata");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(OPERATION, &url, self.timeout, e))?
            .error_for_status()
            .map_err(|e| PipelineError::transport(OPERATION, &url, e))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::from_reqwest(OPERATION, &url, self.timeout, e))?;

        let descriptor = parse_descriptor(&body, &self.host).map_err(|e| match e {
            PipelineError::Parse { message, .. } => PipelineError::Parse {
                target: url.clone(),
                message,
            },
            other => other,
        })?;
        tracing::debug!(title = %descriptor.title, base_url = %descriptor.base_url, "image metadata parsed");
        Ok(descriptor)
    }

    /// Downloads the asset as image bytes.
    ///
    /// # Arguments
    /// * `asset` - URL chosen by [`crate::asset::resolve`]
    ///
    /// # Returns
    /// * `Ok(DownloadedImage)` - Validated bytes with the detected format and size
    /// * `Err(Transport)` - Connection failure, non-success status or an empty body
    /// * `Err(TimedOut)` - The request timeout elapsed mid-transfer
    /// * `Err(InvalidImage)` - The body is not a decodable image (e.g. an HTML error page)
    pub async fn download(&self, asset: &AssetReference) -> Result<DownloadedImage> {
        const OPERATION: &str = "image download";
        tracing::info!(url = %asset.url, "downloading background");

        let response = self
            .http
            .get(&asset.url)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(OPERATION, &asset.url, self.timeout, e))?
            .error_for_status()
            .map_err(|e| PipelineError::transport(OPERATION, &asset.url, e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::from_reqwest(OPERATION, &asset.url, self.timeout, e))?;

        if bytes.is_empty() {
            return Err(PipelineError::transport(OPERATION, &asset.url, "response body is empty"));
        }

        let image = DownloadedImage::from_bytes(bytes, &asset.url)?;
        tracing::debug!(format = ?image.format(), dimensions = ?image.dimensions(), "background downloaded");
        Ok(image)
    }
}

impl AssetProbe for BingClient {
    /// HEAD request; any success status means the asset exists.
    async fn exists(&self, url: &str) -> bool {
        match self.http.head(url).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                tracing::debug!(%url, status = %response.status(), "asset probe");
                ok
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "asset probe failed");
                false
            }
        }
    }
}

/// Parses the archive JSON into a descriptor.
fn parse_descriptor(body: &[u8], host: &str) -> Result<ImageDescriptor> {
    let parse_error = |message: String| PipelineError::Parse {
        target: BING_API_PATH.to_string(),
        message,
    };

    let response: ArchiveResponse = serde_json::from_slice(body).map_err(|e| parse_error(e.to_string()))?;
    let image = response
        .images
        .into_iter()
        .next()
        .ok_or_else(|| parse_error("no images in response".to_string()))?;

    ImageDescriptor::from_archive(image, host)
}
