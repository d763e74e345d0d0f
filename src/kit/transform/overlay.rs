// SPDX-License-Identifier: MIT

//! Caption rendering on top of images

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use font8x8::UnicodeFonts;
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

/// Distance between the caption and the top or bottom edge
const EDGE_MARGIN: i64 = 10;
/// Padding of the background plate around the caption
const PLATE_PADDING: i64 = 5;
/// Largest caption size in pixels
pub const MAX_FONT_SIZE: u32 = 512;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Top,
    Center,
    Bottom,
}

impl Anchor {
    /// Unrecognised positions render centred
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "top" => Anchor::Top,
            "bottom" => Anchor::Bottom,
            _ => Anchor::Center,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayOptions {
    pub text: String,
    pub anchor: Anchor,
    pub font_size: u32,
    pub color: Rgba<u8>,
    /// `None` draws no background plate
    pub background: Option<Rgba<u8>>,
}

impl OverlayOptions {
    /// Build options from loosely typed values
    ///
    /// Unparseable text colors become white; an unparseable or transparent
    /// background draws no plate.
    pub fn new(text: &str, position: &str, font_size: u32, color: &str, background: &str) -> Self {
        Self {
            text: text.to_string(),
            anchor: Anchor::parse(position),
            font_size: font_size.clamp(1, MAX_FONT_SIZE),
            color: parse_color(color).unwrap_or(Rgba([255, 255, 255, 255])),
            background: parse_color(background).filter(|c| c[3] > 0),
        }
    }
}

/// Where glyphs come from
pub enum GlyphSource {
    TrueType(FontVec),
    /// Built-in 8x8 bitmap glyphs, scaled by whole pixels
    Bitmap,
}

impl std::fmt::Debug for GlyphSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlyphSource::TrueType(_) => f.write_str("GlyphSource::TrueType"),
            GlyphSource::Bitmap => f.write_str("GlyphSource::Bitmap"),
        }
    }
}

impl GlyphSource {
    /// Load the configured font, then well-known system fonts, then the bitmap fallback
    pub fn load(preferred: Option<&Path>) -> Self {
        let candidates = preferred
            .map(Path::to_path_buf)
            .into_iter()
            .chain(SYSTEM_FONTS.iter().map(PathBuf::from));

        for path in candidates {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    log::debug!("Using font {}", path.display());
                    return GlyphSource::TrueType(font);
                }
                Err(e) => log::warn!("Ignoring unreadable font {}: {}", path.display(), e),
            }
        }

        log::info!("No TrueType font found, using bitmap glyphs");
        GlyphSource::Bitmap
    }

    fn measure(&self, text: &str, size: u32) -> (u32, u32) {
        if text.is_empty() {
            return (0, 0);
        }
        match self {
            GlyphSource::TrueType(font) => text_size(PxScale::from(size as f32), font, text),
            GlyphSource::Bitmap => {
                let cell = 8 * u64::from(bitmap_scale(size));
                let chars = text.chars().count() as u64;
                (saturate(chars.saturating_mul(cell)), saturate(cell))
            }
        }
    }

    fn draw(&self, canvas: &mut RgbaImage, text: &str, x: i64, y: i64, size: u32, color: Rgba<u8>) {
        match self {
            GlyphSource::TrueType(font) => draw_text_mut(
                canvas,
                color,
                x as i32,
                y as i32,
                PxScale::from(size as f32),
                font,
                text,
            ),
            GlyphSource::Bitmap => draw_bitmap_text(canvas, text, x, y, bitmap_scale(size), color),
        }
    }
}

fn bitmap_scale(size: u32) -> u32 {
    (size / 8).max(1)
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn draw_bitmap_text(canvas: &mut RgbaImage, text: &str, x: i64, y: i64, scale: u32, color: Rgba<u8>) {
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    let scale = scale as i64;

    for (index, ch) in text.chars().enumerate() {
        let origin_x = x.saturating_add((index as i64).saturating_mul(8 * scale));
        if origin_x >= width {
            break;
        }
        if origin_x.saturating_add(8 * scale) <= 0 {
            continue;
        }

        let glyph = font8x8::BASIC_FONTS
            .get(ch)
            .or_else(|| font8x8::BASIC_FONTS.get('?'))
            .unwrap_or([0u8; 8]);

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                // Visit only the part of the scaled bit that lies on the canvas
                let left = origin_x + col as i64 * scale;
                let top = y + row as i64 * scale;
                for py in top.max(0)..(top + scale).min(height) {
                    for px in left.max(0)..(left + scale).min(width) {
                        canvas.get_pixel_mut(px as u32, py as u32).blend(&color);
                    }
                }
            }
        }
    }
}

/// Render a caption onto the canvas according to the options
pub fn render(canvas: &mut RgbaImage, options: &OverlayOptions, glyphs: &GlyphSource) {
    if options.text.is_empty() {
        return;
    }

    let (text_w, text_h) = glyphs.measure(&options.text, options.font_size);
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    let (text_w, text_h) = (text_w as i64, text_h as i64);

    let x = (width - text_w) / 2;
    let y = match options.anchor {
        Anchor::Top => EDGE_MARGIN,
        Anchor::Center => (height - text_h) / 2,
        Anchor::Bottom => height - text_h - EDGE_MARGIN,
    };

    if let Some(background) = options.background {
        let left = (x - PLATE_PADDING).max(0);
        let top = (y - PLATE_PADDING).max(0);
        let right = (x + text_w + PLATE_PADDING).min(width);
        let bottom = (y + text_h + PLATE_PADDING).min(height);
        if right > left && bottom > top {
            let plate = Rect::at(left as i32, top as i32)
                .of_size((right - left) as u32, (bottom - top) as u32);
            draw_filled_rect_mut(canvas, plate, background);
        }
    }

    glyphs.draw(canvas, &options.text, x, y, options.font_size, options.color);
}

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` or a handful of colour names
pub fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim().to_ascii_lowercase();

    if let Some(hex) = value.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            3 => {
                let mut out = [0u8; 4];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    out[i] = v * 17;
                }
                out[3] = 255;
                Some(Rgba(out))
            }
            6 => Some(Rgba([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            ])),
            8 => Some(Rgba([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            ])),
            _ => None,
        };
    }

    let rgb = match value.as_str() {
        "transparent" | "none" => return Some(Rgba([0, 0, 0, 0])),
        "white" => [255, 255, 255],
        "black" => [0, 0, 0],
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "lime" => [0, 255, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 255, 0],
        "cyan" => [0, 255, 255],
        "magenta" => [255, 0, 255],
        "gray" | "grey" => [128, 128, 128],
        "orange" => [255, 165, 0],
        "purple" => [128, 0, 128],
        _ => return None,
    };
    Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("#fff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_color("#FF0000"), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(parse_color("#00000080"), Some(Rgba([0, 0, 0, 128])));
        assert_eq!(parse_color("yellow"), Some(Rgba([255, 255, 0, 255])));
        assert_eq!(parse_color("transparent"), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("chartreuse-ish"), None);
    }

    #[test]
    fn test_transparent_background_draws_no_plate() {
        for background in ["transparent", "#00000000", "none", "bogus"] {
            let options = OverlayOptions::new("hi", "center", 32, "#ffffff", background);
            assert!(options.background.is_none(), "{}", background);
        }
        let options = OverlayOptions::new("hi", "center", 32, "#ffffff", "#000000");
        assert_eq!(options.background, Some(Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn test_anchor_parse() {
        assert_eq!(Anchor::parse("TOP"), Anchor::Top);
        assert_eq!(Anchor::parse("bottom"), Anchor::Bottom);
        assert_eq!(Anchor::parse("left"), Anchor::Center);
    }

    #[test]
    fn test_bitmap_render_top_plate() {
        let mut canvas = RgbaImage::from_pixel(100, 60, Rgba([0, 0, 255, 255]));
        let options = OverlayOptions::new("AB", "top", 16, "#ffffff", "#ff0000");

        render(&mut canvas, &options, &GlyphSource::Bitmap);

        // Bitmap glyphs at size 16 are 16px tall and 32px wide for two chars
        // Plate spans x 29..=70, y 5..=30
        assert_eq!(*canvas.get_pixel(29, 5), Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(70, 30), Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(50, 50), Rgba([0, 0, 255, 255]));
        assert!(canvas
            .pixels()
            .any(|p| *p == Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn test_font_size_is_capped() {
        let options = OverlayOptions::new("Hi", "center", 200_000, "#ffffff", "none");
        assert_eq!(options.font_size, MAX_FONT_SIZE);
        assert_eq!(OverlayOptions::new("Hi", "top", 0, "#fff", "none").font_size, 1);
    }

    #[test]
    fn test_bitmap_measure_saturates() {
        let text = "x".repeat(1000);
        assert_eq!(GlyphSource::Bitmap.measure(&text, u32::MAX), (u32::MAX, u32::MAX - 7));
    }

    #[test]
    fn test_huge_bitmap_caption_only_touches_canvas() {
        let mut canvas = RgbaImage::from_pixel(40, 30, Rgba([0, 0, 0, 255]));
        let options = OverlayOptions {
            text: "Hi".to_string(),
            anchor: Anchor::Top,
            font_size: 200_000,
            color: Rgba([255, 255, 255, 255]),
            background: Some(Rgba([255, 0, 0, 255])),
        };

        render(&mut canvas, &options, &GlyphSource::Bitmap);

        assert_eq!(canvas.dimensions(), (40, 30));
        // The plate starts 5px above the caption, which sits 10px from the top
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_ne!(*canvas.get_pixel(0, 29), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_empty_text_leaves_canvas() {
        let mut canvas = RgbaImage::from_pixel(20, 20, Rgba([1, 2, 3, 255]));
        let before = canvas.clone();
        let options = OverlayOptions::new("", "center", 32, "#ffffff", "#000000");
        render(&mut canvas, &options, &GlyphSource::Bitmap);
        assert_eq!(canvas, before);
    }
}
