//! SVG rasterization.

use crate::{Error, Result};
use image::RgbaImage;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use resvg::usvg;

/// Canvas size used when the document declares no usable `viewBox`.
pub const DEFAULT_CANVAS: u32 = 256;

/// Largest canvas side accepted from a `viewBox`. Anything bigger is refused
/// before a pixel buffer is allocated.
pub const MAX_CANVAS: u32 = 4096;

/// Read the root element's `viewBox` as `(min_x, min_y, width, height)`.
///
/// Returns `None` when the root is not `<svg>`, the attribute is missing, or
/// it does not hold four numbers.
pub fn declared_view_box(svg_data: &[u8]) -> Option<(f32, f32, f32, f32)> {
    let mut reader = Reader::from_reader(svg_data);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() != b"svg" {
                    return None;
                }
                let attr = e.try_get_attribute("viewBox").ok()??;
                let value = attr.unescape_value().ok()?;
                return parse_view_box(&value);
            }
            Ok(Event::Eof) | Err(_) => return None,
            // Prolog, doctype, comments.
            Ok(_) => {}
        }
        buf.clear();
    }
}

fn parse_view_box(value: &str) -> Option<(f32, f32, f32, f32)> {
    let numbers: Vec<f32> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match numbers.as_slice() {
        [x, y, w, h] => Some((*x, *y, *w, *h)),
        _ => None,
    }
}

fn usable_view_box(svg_data: &[u8]) -> Option<(f32, f32)> {
    match declared_view_box(svg_data) {
        Some((_, _, w, h)) if w >= 1.0 && h >= 1.0 => Some((w, h)),
        _ => None,
    }
}

/// Canvas dimensions for a document: its view box when both sides are
/// positive, otherwise 256×256.
pub fn canvas_size(svg_data: &[u8]) -> (u32, u32) {
    match usable_view_box(svg_data) {
        Some((w, h)) => (w as u32, h as u32),
        None => (DEFAULT_CANVAS, DEFAULT_CANVAS),
    }
}

/// Copy of the document with the root's `width`/`height` replaced by the view
/// box size, so the viewport maps user units onto pixels at unit scale
/// regardless of `preserveAspectRatio`.
fn with_viewport_size(svg_data: &[u8], width: f32, height: f32) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(svg_data);
    let mut writer = Writer::new(Vec::with_capacity(svg_data.len() + 32));
    let mut buf = Vec::new();
    let mut root_seen = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::RenderError(format!("Failed to parse SVG: {}", e)))?;
        let event = match event {
            Event::Eof => break,
            Event::Start(e) if !root_seen => {
                root_seen = true;
                Event::Start(resized_root(&e, width, height))
            }
            Event::Empty(e) if !root_seen => {
                root_seen = true;
                Event::Empty(resized_root(&e, width, height))
            }
            other => other,
        };
        writer
            .write_event(event)
            .map_err(|e| Error::RenderError(format!("Failed to rewrite SVG: {}", e)))?;
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn resized_root(root: &BytesStart, width: f32, height: f32) -> BytesStart<'static> {
    let mut resized = root.clone().into_owned();
    resized.clear_attributes();
    for attr in root.attributes().flatten() {
        let key = attr.key.local_name();
        if key.as_ref() != b"width" && key.as_ref() != b"height" {
            resized.push_attribute(attr);
        }
    }
    resized.push_attribute(("width", width.to_string().as_str()));
    resized.push_attribute(("height", height.to_string().as_str()));
    resized
}

/// Render an SVG document to a straight-alpha RGBA bitmap.
///
/// With a view box, view box units map one to one onto canvas pixels whatever
/// the declared `width`/`height`; without one, user units are drawn at unit
/// scale. View boxes wider or taller than [`MAX_CANVAS`] are a render error.
pub fn rasterize(svg_data: &[u8]) -> Result<RgbaImage> {
    let view_box = usable_view_box(svg_data);
    let (width, height) = canvas_size(svg_data);
    if width > MAX_CANVAS || height > MAX_CANVAS {
        return Err(Error::RenderError(format!(
            "SVG canvas {}x{} exceeds the {}x{} limit",
            width, height, MAX_CANVAS, MAX_CANVAS
        )));
    }
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| Error::RenderError(format!("SVG canvas {}x{} is too large", width, height)))?;

    let options = usvg::Options::default();
    let tree = match view_box {
        Some((w, h)) => usvg::Tree::from_data(&with_viewport_size(svg_data, w, h)?, &options),
        None => usvg::Tree::from_data(svg_data, &options),
    }
    .map_err(|e| Error::RenderError(format!("Failed to parse SVG: {}", e)))?;

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| Error::RenderError(format!("Failed to allocate {}x{} pixmap", width, height)))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    // tiny-skia stores premultiplied colour; image expects straight alpha.
    let mut pixels = Vec::with_capacity(len);
    for px in pixmap.pixels() {
        let c = px.demultiply();
        pixels.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| Error::RenderError("Pixel buffer size mismatch".into()))
}
