//! Deterministic fallback icon generated from a domain name.
//!
//! The icon is a 128×128 square filled with a colour derived from a rolling
//! hash of the domain, a white disc in the middle, and a crude glyph for the
//! domain's initial punched out of the disc in the background colour.

use image::{Rgba, RgbaImage};

/// Side length of the generated icon.
pub const ICON_SIZE: u32 = 128;

/// Glyph cell half-extent: glyphs cover offsets `-GLYPH_HALF..=GLYPH_HALF`.
const GLYPH_HALF: i32 = 10;

const FOREGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Pixel predicate over glyph offsets `(dx, dy)` from the icon centre.
pub type Glyph = fn(i32, i32) -> bool;

/// Known initials. Anything missing here is drawn as [`cross`].
static GLYPHS: &[(char, Glyph)] = &[
    ('A', glyph_a),
    ('B', glyph_b),
    ('H', glyph_h),
    ('I', glyph_i),
    ('L', glyph_l),
    ('T', glyph_t),
];

fn glyph_a(dx: i32, dy: i32) -> bool {
    dx == dy * 2 || dx == -dy * 2 || (dy == 0 && dx.abs() <= GLYPH_HALF / 2)
}

fn glyph_b(dx: i32, dy: i32) -> bool {
    let h = GLYPH_HALF;
    dx == -h
        || dy == -h
        || dy == h
        || dy == 0
        || (dx == h && ((dy > -h && dy < 0) || (dy > 0 && dy < h)))
}

fn glyph_h(dx: i32, dy: i32) -> bool {
    dx.abs() == GLYPH_HALF || dy == 0
}

fn glyph_i(dx: i32, dy: i32) -> bool {
    dx == 0 || (dy.abs() == GLYPH_HALF && dx.abs() <= GLYPH_HALF / 2)
}

fn glyph_l(dx: i32, dy: i32) -> bool {
    dx == -GLYPH_HALF || dy == GLYPH_HALF
}

fn glyph_t(dx: i32, dy: i32) -> bool {
    dx == 0 || dy == -GLYPH_HALF
}

/// Default glyph: a plain centred cross.
pub fn cross(dx: i32, dy: i32) -> bool {
    dx == 0 || dy == 0
}

/// Glyph for an initial, falling back to the cross.
pub fn glyph_for(initial: char) -> Glyph {
    GLYPHS
        .iter()
        .find(|(c, _)| *c == initial)
        .map(|(_, g)| *g)
        .unwrap_or(cross)
}

/// 32-bit rolling hash `h = h * 31 + byte`, seeded at zero.
pub fn domain_hash(domain: &str) -> u32 {
    domain
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

/// Background colour: three byte slices of the hash, each taken modulo 200
/// and lifted by 55 so the result is never close to black.
pub fn background_color(domain: &str) -> Rgba<u8> {
    let hash = domain_hash(domain);
    let channel = |shift: u32| ((hash >> shift) % 200) as u8 + 55;
    Rgba([channel(16), channel(8), channel(0), 255])
}

/// Uppercased first character of the leading label, or `?`.
pub fn initial(domain: &str) -> char {
    domain
        .split('.')
        .next()
        .and_then(|label| label.chars().next())
        .and_then(|c| c.to_uppercase().next())
        .unwrap_or('?')
}

/// Build the fallback icon for `domain`. Same input, same pixels.
pub fn generate(domain: &str) -> RgbaImage {
    let bg = background_color(domain);
    let mut img = RgbaImage::from_pixel(ICON_SIZE, ICON_SIZE, bg);

    let cx = (ICON_SIZE / 2) as i32;
    let cy = (ICON_SIZE / 2) as i32;
    let radius = (ICON_SIZE / 4) as i32;

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(&mut img, cx + dx, cy + dy, FOREGROUND);
            }
        }
    }

    let glyph = glyph_for(initial(domain));
    for dy in -GLYPH_HALF..=GLYPH_HALF {
        for dx in -GLYPH_HALF..=GLYPH_HALF {
            if glyph(dx, dy) {
                put(&mut img, cx + dx, cy + dy, bg);
            }
        }
    }

    img
}

fn put(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}
