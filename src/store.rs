//! # Image Store
//!
//! Writes the day's background to a dated path:
//!
//! ```text
//! <Pictures>/Bing Backgrounds/<yyyy>/<M-d-yyyy>.jpeg
//! ```
//!
//! One file per calendar day. Storing again on the same day replaces the
//! file, so a re-run always leaves the latest successful fetch on disk.
//! Old files are never pruned here.

use chrono::{Datelike, NaiveDate};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::metadata::{insert_exif, read_metadata, TaggedImage};

/// Folder created under the Pictures root.
pub const STORE_DIR: &str = "Bing Backgrounds";

/// Quality used when a non-JPEG source has to be re-encoded.
const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// `root` is the Pictures directory; `Bing Backgrounds/` goes inside it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic destination for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(STORE_DIR)
            .join(date.year().to_string())
            .join(format!("{}.jpeg", date.format("%-m-%-d-%Y")))
    }

    /// Encodes `image` as JPEG with its metadata and writes it for `date`.
    ///
    /// # Arguments
    /// * `image` - The downloaded image and its EXIF block
    /// * `date` - Calendar day the file is named after
    ///
    /// # Returns
    /// The path written. The new file only becomes visible at the final
    /// rename, so a run cancelled earlier leaves the previous file.
    pub async fn store(&self, image: TaggedImage, date: NaiveDate) -> Result<PathBuf> {
        let path = self.path_for(date);
        let encoded = tokio::task::spawn_blocking(move || encode_jpeg(&image))
            .await
            .map_err(|e| PipelineError::Encoding(e.to_string()))??;

        // The EXIF segment must survive the splice intact
        let embedded = read_metadata(&encoded)?;
        tracing::debug!(
            title = ?embedded.title,
            subject = ?embedded.subject,
            copyright = ?embedded.copyright,
            "metadata verified"
        );

        tracing::info!(path = %path.display(), bytes = encoded.len(), "saving background");
        atomic_write(&path, &encoded).await?;
        Ok(path)
    }
}

/// Produces the final JPEG bytes with the EXIF segment in place.
///
/// JPEG downloads are used as-is to avoid a second lossy pass; other formats
/// are decoded and re-encoded.
pub fn encode_jpeg(image: &TaggedImage) -> Result<Vec<u8>> {
    let source = image.image();
    let jpeg = if source.format() == image::ImageFormat::Jpeg {
        source.bytes().to_vec()
    } else {
        let rgb = source.decode()?.to_rgb8();
        let mut buf = Cursor::new(Vec::new());
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        rgb.write_with_encoder(encoder)
            .map_err(|e| PipelineError::Encoding(e.to_string()))?;
        buf.into_inner()
    };

    insert_exif(&jpeg, image.exif())
}

/// Writes through a temp file and rename so readers never see a partial
/// image and an existing file is replaced in one step.
async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let storage = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PipelineError::Storage { path, source }
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await.map_err(storage(dir))?;

    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("background")
    ));
    tokio::fs::write(&tmp, bytes).await.map_err(storage(&tmp))?;
    if let Err(source) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(PipelineError::Storage {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bing::{DownloadedImage, ImageDescriptor};
    use crate::metadata::embed;
    use bytes::Bytes;

    fn encoded(format: image::ImageFormat, shade: u8) -> DownloadedImage {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([shade, shade, shade]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        DownloadedImage::from_bytes(Bytes::from(buf.into_inner()), "test").unwrap()
    }

    fn tagged(format: image::ImageFormat, shade: u8) -> TaggedImage {
        let descriptor = ImageDescriptor {
            title: "Aurora".to_string(),
            description: "Northern Lights".to_string(),
            copyright: Some("Photographer X".to_string()),
            base_url: "https://www.bing.com/th?id=abc".to_string(),
        };
        embed(encoded(format, shade), &descriptor).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn path_uses_unpadded_month_day_year() {
        let store = ImageStore::new("/home/u/Pictures");
        assert_eq!(
            store.path_for(date(2024, 3, 15)),
            PathBuf::from("/home/u/Pictures/Bing Backgrounds/2024/3-15-2024.jpeg")
        );
        assert_eq!(
            store.path_for(date(2025, 12, 1)),
            PathBuf::from("/home/u/Pictures/Bing Backgrounds/2025/12-1-2025.jpeg")
        );
    }

    #[tokio::test]
    async fn creates_directories_and_embeds_metadata() {
        let root = tempfile::tempdir().unwrap();
        let store = ImageStore::new(root.path());

        let path = store
            .store(tagged(image::ImageFormat::Jpeg, 40), date(2024, 3, 15))
            .await
            .unwrap();
        assert!(path.starts_with(root.path().join(STORE_DIR).join("2024")));

        let written = std::fs::read(&path).unwrap();
        let meta = read_metadata(&written).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Aurora"));
        assert_eq!(meta.subject.as_deref(), Some("Northern Lights"));
    }

    #[tokio::test]
    async fn same_day_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let store = ImageStore::new(root.path());
        let day = date(2024, 3, 15);

        let first = store.store(tagged(image::ImageFormat::Jpeg, 10), day).await.unwrap();
        let second_image = tagged(image::ImageFormat::Jpeg, 240);
        let second = store.store(second_image.clone(), day).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), encode_jpeg(&second_image).unwrap());

        // no temp files left behind
        let entries = std::fs::read_dir(second.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn recreates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = ImageStore::new(root.path());
        let day = date(2024, 3, 15);

        store.store(tagged(image::ImageFormat::Jpeg, 10), day).await.unwrap();
        std::fs::remove_dir_all(root.path().join(STORE_DIR)).unwrap();
        let path = store.store(tagged(image::ImageFormat::Jpeg, 10), day).await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn png_source_is_reencoded_as_jpeg() {
        let out = encode_jpeg(&tagged(image::ImageFormat::Png, 128)).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Jpeg);
        assert_eq!(read_metadata(&out).unwrap().title.as_deref(), Some("Aurora"));
    }
}
