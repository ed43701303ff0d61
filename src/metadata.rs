//! # Image Metadata
//!
//! Embeds the descriptor's text into the image as EXIF so file managers and
//! photo viewers show what the background is.
//!
//! Fields written (primary IFD):
//! - `ImageDescription` (0x010E): title
//! - `XPTitle` (0x9C9B): title, UCS-2 as Windows Explorer expects
//! - `XPSubject` (0x9C9F): description
//! - `Copyright` (0x8298): only when the descriptor has a non-blank one
//!
//! The EXIF block is kept next to the untouched image bytes and spliced in
//! as an APP1 segment when the JPEG is written, so pixels are never re-encoded
//! to add metadata.

use exif::{Context, Field, In, Tag, Value};
use std::io::Cursor;

use crate::bing::{DownloadedImage, ImageDescriptor};
use crate::error::{PipelineError, Result};

const XP_TITLE: Tag = Tag(Context::Tiff, 0x9C9B);
const XP_SUBJECT: Tag = Tag(Context::Tiff, 0x9C9F);

/// Identifier that starts an EXIF APP1 payload.
const EXIF_HEADER: &[u8] = b"Exif\0\0";

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;

/// A downloaded image plus the EXIF block to attach to it.
#[derive(Debug, Clone)]
pub struct TaggedImage {
    image: DownloadedImage,
    exif: Vec<u8>,
}

impl TaggedImage {
    pub fn image(&self) -> &DownloadedImage {
        &self.image
    }

    /// Raw TIFF-structured EXIF data (without the APP1 framing).
    pub fn exif(&self) -> &[u8] {
        &self.exif
    }
}

/// Text fields read back from an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedMetadata {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub copyright: Option<String>,
}

/// Attaches title, subject and copyright metadata to `image`.
pub fn embed(image: DownloadedImage, descriptor: &ImageDescriptor) -> Result<TaggedImage> {
    let exif = exif_block(descriptor)?;
    tracing::debug!(bytes = exif.len(), has_copyright = descriptor.copyright.is_some(), "metadata embedded");
    Ok(TaggedImage { image, exif })
}

fn ascii(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

/// XP* tags are BYTE arrays holding NUL-terminated UTF-16LE.
fn ucs2(tag: Tag, text: &str) -> Field {
    let mut bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
    bytes.extend_from_slice(&[0, 0]);
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Byte(bytes),
    }
}

/// Builds the EXIF block for `descriptor`.
pub fn exif_block(descriptor: &ImageDescriptor) -> Result<Vec<u8>> {
    let mut fields = vec![
        ascii(Tag::ImageDescription, &descriptor.title),
        ucs2(XP_TITLE, &descriptor.title),
        ucs2(XP_SUBJECT, &descriptor.description),
    ];
    if let Some(copyright) = descriptor.copyright.as_deref().filter(|c| !c.trim().is_empty()) {
        fields.push(ascii(Tag::Copyright, copyright));
    }

    let mut writer = exif::experimental::Writer::new();
    for field in &fields {
        writer.push_field(field);
    }

    let mut buf = Cursor::new(Vec::new());
    writer
        .write(&mut buf, false)
        .map_err(|e| PipelineError::Encoding(format!("EXIF: {e}")))?;
    Ok(buf.into_inner())
}

/// Inserts `tiff` as the EXIF APP1 segment of `jpeg`.
///
/// Any EXIF segment already present is dropped; everything else, including
/// the entropy-coded image data, is copied unchanged.
pub fn insert_exif(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>> {
    if !jpeg.starts_with(&SOI) {
        return Err(PipelineError::Encoding("not a JPEG stream".to_string()));
    }

    // Segment length counts its own two bytes
    let segment_len = 2 + EXIF_HEADER.len() + tiff.len();
    let segment_len = u16::try_from(segment_len)
        .map_err(|_| PipelineError::Encoding(format!("EXIF block too large ({} bytes)", tiff.len())))?;

    let mut out = Vec::with_capacity(jpeg.len() + segment_len as usize + 2);
    out.extend_from_slice(&SOI);
    out.extend_from_slice(&[0xFF, APP1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);

    let mut pos = SOI.len();
    while pos + 4 <= jpeg.len() && jpeg[pos] == 0xFF {
        let marker = jpeg[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        if marker == SOS {
            break;
        }

        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            return Err(PipelineError::Encoding("truncated JPEG segment".to_string()));
        }

        let is_exif = marker == APP1 && jpeg[pos + 4..end].starts_with(EXIF_HEADER);
        if !is_exif {
            out.extend_from_slice(&jpeg[pos..end]);
        }
        pos = end;
    }

    out.extend_from_slice(&jpeg[pos..]);
    Ok(out)
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|s| String::from_utf8_lossy(s).trim_end_matches('\0').to_string()),
        _ => None,
    }
}

fn ucs2_value(value: &Value) -> Option<String> {
    match value {
        Value::Byte(bytes) => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            Some(String::from_utf16_lossy(&units).trim_end_matches('\0').to_string())
        }
        _ => None,
    }
}

/// Reads the text fields back out of an encoded image.
pub fn read_metadata(encoded: &[u8]) -> Result<EmbeddedMetadata> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(encoded))
        .map_err(|e| PipelineError::Encoding(format!("EXIF: {e}")))?;

    let field = |tag: Tag| exif.get_field(tag, In::PRIMARY).map(|f| &f.value);

    Ok(EmbeddedMetadata {
        title: field(XP_TITLE)
            .and_then(ucs2_value)
            .or_else(|| field(Tag::ImageDescription).and_then(ascii_value)),
        subject: field(XP_SUBJECT).and_then(ucs2_value),
        copyright: field(Tag::Copyright).and_then(ascii_value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn jpeg() -> DownloadedImage {
        let img = image::RgbImage::from_fn(16, 8, |x, y| image::Rgb([(x * 16) as u8, (y * 32) as u8, 128]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
        DownloadedImage::from_bytes(Bytes::from(buf.into_inner()), "test").unwrap()
    }

    fn descriptor(copyright: Option<&str>) -> ImageDescriptor {
        ImageDescriptor {
            title: "T".to_string(),
            description: "D".to_string(),
            copyright: copyright.map(str::to_string),
            base_url: "https://www.bing.com/th?id=abc".to_string(),
        }
    }

    fn tagged_jpeg(copyright: Option<&str>) -> Vec<u8> {
        let tagged = embed(jpeg(), &descriptor(copyright)).unwrap();
        insert_exif(tagged.image().bytes(), tagged.exif()).unwrap()
    }

    #[test]
    fn title_and_subject_read_back() {
        let meta = read_metadata(&tagged_jpeg(Some("© Photographer X"))).unwrap();
        assert_eq!(meta.title.as_deref(), Some("T"));
        assert_eq!(meta.subject.as_deref(), Some("D"));
        assert_eq!(meta.copyright.as_deref(), Some("© Photographer X"));
    }

    #[test]
    fn no_copyright_field_when_absent_or_blank() {
        for copyright in [None, Some(""), Some("   ")] {
            let meta = read_metadata(&tagged_jpeg(copyright)).unwrap();
            assert_eq!(meta.copyright, None, "{copyright:?}");
            assert_eq!(meta.title.as_deref(), Some("T"));
        }
    }

    #[test]
    fn unicode_title_survives() {
        let d = ImageDescriptor {
            title: "Tromsø – Nordlys".to_string(),
            ..descriptor(None)
        };
        let tagged = embed(jpeg(), &d).unwrap();
        let out = insert_exif(tagged.image().bytes(), tagged.exif()).unwrap();
        assert_eq!(read_metadata(&out).unwrap().title.as_deref(), Some("Tromsø – Nordlys"));
    }

    #[test]
    fn embedding_is_deterministic() {
        let d = descriptor(Some("X"));
        assert_eq!(exif_block(&d).unwrap(), exif_block(&d).unwrap());
    }

    #[test]
    fn pixels_are_untouched() {
        let original = jpeg();
        let out = tagged_jpeg(Some("X"));
        let before = image::load_from_memory(original.bytes()).unwrap().to_rgb8();
        let after = image::load_from_memory(&out).unwrap().to_rgb8();
        assert_eq!(before, after);
    }

    #[test]
    fn existing_exif_is_replaced() {
        let first = tagged_jpeg(Some("Old"));
        let block = exif_block(&descriptor(Some("New"))).unwrap();
        let second = insert_exif(&first, &block).unwrap();

        assert_eq!(read_metadata(&second).unwrap().copyright.as_deref(), Some("New"));
        let exif_segments = second
            .windows(4 + EXIF_HEADER.len())
            .filter(|w| w[..2] == [0xFF, APP1] && &w[4..] == EXIF_HEADER)
            .count();
        assert_eq!(exif_segments, 1);
    }

    #[test]
    fn rejects_non_jpeg() {
        assert!(matches!(insert_exif(b"\x89PNG....", &[]), Err(PipelineError::Encoding(_))));
    }
}
