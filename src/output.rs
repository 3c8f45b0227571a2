//! Multi-size PNG renditions of the resolved icon.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};
use std::collections::BTreeMap;
use std::io::Cursor;

/// Sizes produced when the configuration does not override them.
pub const DEFAULT_SIZES: [u32; 5] = [16, 32, 64, 128, 256];

/// Resize to `size`×`size` (bilinear) and encode as PNG.
pub fn encode_png(img: &RgbaImage, size: u32) -> image::ImageResult<Vec<u8>> {
    let resized = image::imageops::resize(img, size, size, FilterType::Triangle);
    let mut buf = Vec::new();
    resized.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// `data:image/png;base64,...` URL for each size, keyed by the size in
/// decimal. Zero sizes and sizes that fail to encode are left out.
pub fn render_sizes(img: &RgbaImage, sizes: &[u32]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for &size in sizes {
        if size == 0 {
            continue;
        }
        match encode_png(img, size) {
            Ok(png) => {
                out.insert(size.to_string(), format!("data:image/png;base64,{}", STANDARD.encode(png)));
            }
            Err(e) => log::warn!("skipping {}px rendition: {}", size, e),
        }
    }
    out
}
