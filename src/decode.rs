//! Format-sniffing decode of icon candidates.
//!
//! A candidate is either an inline `data:` URL or something to fetch. Fetched
//! bytes are classified by [`sniff`] and then handed to the matching decoder.
//! Every failure is reported as an [`Error`] and the caller moves on to the
//! next candidate.

use crate::fetch::{CancelToken, Fetched, Fetcher};
use crate::vector;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, RgbaImage};

const SVG_MEDIA_TYPE: &str = "image/svg+xml";

/// Raster containers accepted from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterKind {
    Png,
    Jpeg,
    Ico,
}

impl RasterKind {
    fn image_format(self) -> ImageFormat {
        match self {
            RasterKind::Png => ImageFormat::Png,
            RasterKind::Jpeg => ImageFormat::Jpeg,
            RasterKind::Ico => ImageFormat::Ico,
        }
    }
}

/// What a fetched payload looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    Vector,
    Raster(RasterKind),
    /// Anything else, including HTML error pages served with a 200
    Unknown,
}

/// Classify fetched bytes without decoding them.
///
/// SVG is recognised by the `image/svg+xml` content type or a `.svg` path;
/// everything else by its magic bytes.
pub fn sniff(url: &str, content_type: Option<&str>, bytes: &[u8]) -> SniffedFormat {
    let svg_content_type = content_type
        .map(|ct| ct.to_ascii_lowercase().contains(SVG_MEDIA_TYPE))
        .unwrap_or(false);
    if svg_content_type || has_svg_extension(url) {
        return SniffedFormat::Vector;
    }

    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => SniffedFormat::Raster(RasterKind::Png),
        Ok(ImageFormat::Jpeg) => SniffedFormat::Raster(RasterKind::Jpeg),
        Ok(ImageFormat::Ico) => SniffedFormat::Raster(RasterKind::Ico),
        _ => SniffedFormat::Unknown,
    }
}

fn has_svg_extension(url: &str) -> bool {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    path.to_ascii_lowercase().ends_with(".svg")
}

/// Whether a candidate is carried inline rather than fetched.
pub fn is_inline(candidate: &str) -> bool {
    candidate
        .get(..5)
        .map(|scheme| scheme.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

/// Decode a `data:<mediatype>;base64,<payload>` URL.
///
/// SVG media types go to the rasterizer; everything else must be an image the
/// raster decoder understands.
pub fn decode_inline(data_url: &str) -> Result<RgbaImage> {
    let (meta, payload) = data_url
        .split_once(',')
        .ok_or_else(|| Error::DecodeError("Invalid data URL: missing ','".into()))?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::DecodeError(format!("Invalid base64 in data URL: {}", e)))?;

    if meta.to_ascii_lowercase().contains(SVG_MEDIA_TYPE) {
        return vector::rasterize(&bytes);
    }
    image::load_from_memory(&bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| Error::DecodeError(format!("Inline image decode failed: {}", e)))
}

/// Decode a fetched payload according to [`sniff`].
pub fn decode_fetched(url: &str, fetched: &Fetched) -> Result<RgbaImage> {
    match sniff(url, fetched.content_type.as_deref(), &fetched.body) {
        SniffedFormat::Vector => vector::rasterize(&fetched.body),
        SniffedFormat::Raster(kind) => image::load_from_memory_with_format(&fetched.body, kind.image_format())
            .map(|img| img.to_rgba8())
            .map_err(|e| Error::DecodeError(format!("{:?} decode failed for {}: {}", kind, url, e))),
        SniffedFormat::Unknown => Err(Error::DecodeError(format!(
            "Unsupported format for {} (content type {:?})",
            url, fetched.content_type
        ))),
    }
}

/// Turn one candidate into a bitmap, fetching it if needed.
pub fn decode(candidate: &str, fetcher: &Fetcher, cancel: &CancelToken) -> Result<RgbaImage> {
    if is_inline(candidate) {
        return decode_inline(candidate);
    }
    let fetched = fetcher.fetch(candidate, cancel)?;
    decode_fetched(candidate, &fetched)
}
