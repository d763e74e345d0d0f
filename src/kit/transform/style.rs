// SPDX-License-Identifier: MIT

//! Named style filters

use image::{imageops, DynamicImage, Rgb, RgbImage};

/// A named style; unknown names fall back to a plain blur
#[derive(Debug, Clone, PartialEq)]
pub enum Style {
    Vintage,
    Neon,
    Watercolor,
    OilPainting,
    Blur(String),
}

impl Style {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "vintage" => Style::Vintage,
            "neon" => Style::Neon,
            "watercolor" => Style::Watercolor,
            "oil_painting" => Style::OilPainting,
            _ => Style::Blur(name.to_string()),
        }
    }

    /// Name used in output file names
    pub fn name(&self) -> &str {
        match self {
            Style::Vintage => "vintage",
            Style::Neon => "neon",
            Style::Watercolor => "watercolor",
            Style::OilPainting => "oil_painting",
            Style::Blur(name) => name,
        }
    }

    pub fn apply(&self, image: &DynamicImage, intensity: f32) -> DynamicImage {
        let rgb = image.to_rgb8();
        let intensity = intensity.max(0.0);

        let styled = match self {
            Style::Vintage => blur(&warm_remix(&rgb), intensity * 0.5),
            Style::Neon => amplify(&contour(&rgb), 1.0 + intensity * 2.0),
            Style::Watercolor => {
                let size = (3.0 + intensity * 4.0) as u32;
                let radius = size / 2;
                let median = imageproc::filter::median_filter(&rgb, radius, radius);
                smooth_more(&median)
            }
            Style::OilPainting => {
                let size = (5.0 + intensity * 5.0) as u32;
                mode_filter(&rgb, size / 2)
            }
            Style::Blur(_) => blur(&rgb, intensity),
        };

        DynamicImage::ImageRgb8(styled)
    }
}

fn scale_channel(value: u8, factor: f32) -> u8 {
    (value as f32 * factor).round().clamp(0.0, 255.0) as u8
}

/// Sepia-like warm remix
fn warm_remix(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let Rgb([r, g, b]) = *pixel;
        *pixel = Rgb([
            scale_channel(r, 0.393 + 0.769 + 0.189),
            scale_channel(g, 0.349 + 0.686 + 0.168),
            scale_channel(b, 0.272 + 0.534 + 0.131),
        ]);
    }
    out
}

fn blur(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= f32::EPSILON {
        return image.clone();
    }
    imageops::blur(image, sigma)
}

/// Dark edges on a white field
fn contour(image: &RgbImage) -> RgbImage {
    let kernel = [1.0, 1.0, 1.0, 1.0, -8.0, 1.0, 1.0, 1.0, 1.0];
    let mut edges: RgbImage = imageops::filter3x3(image, &kernel);
    imageops::invert(&mut edges);
    edges
}

fn amplify(image: &RgbImage, factor: f32) -> RgbImage {
    let mut out = image.clone();
    for channel in out.iter_mut() {
        *channel = scale_channel(*channel, factor);
    }
    out
}

/// 5x5 weighted smoothing with a heavy centre tap
fn smooth_more(image: &RgbImage) -> RgbImage {
    const KERNEL: [[u32; 5]; 5] = [
        [1, 1, 1, 1, 1],
        [1, 5, 5, 5, 1],
        [1, 5, 44, 5, 1],
        [1, 5, 5, 5, 1],
        [1, 1, 1, 1, 1],
    ];
    const DIVISOR: u32 = 100;

    let (width, height) = image.dimensions();
    let mut out = RgbImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }

    for y in 0..height {
        for x in 0..width {
            let mut acc = [0u32; 3];
            for (ky, row) in KERNEL.iter().enumerate() {
                let sy = (y as i64 + ky as i64 - 2).clamp(0, height as i64 - 1) as u32;
                for (kx, weight) in row.iter().enumerate() {
                    let sx = (x as i64 + kx as i64 - 2).clamp(0, width as i64 - 1) as u32;
                    let Rgb(px) = image.get_pixel(sx, sy);
                    for c in 0..3 {
                        acc[c] += px[c] as u32 * weight;
                    }
                }
            }
            out.put_pixel(
                x,
                y,
                Rgb([
                    ((acc[0] + DIVISOR / 2) / DIVISOR).min(255) as u8,
                    ((acc[1] + DIVISOR / 2) / DIVISOR).min(255) as u8,
                    ((acc[2] + DIVISOR / 2) / DIVISOR).min(255) as u8,
                ]),
            );
        }
    }
    out
}

/// Per-channel most-frequent value in a square window
///
/// Pixels whose window has no repeated value keep their own value; ties
/// resolve to the lowest channel value.
fn mode_filter(image: &RgbImage, radius: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    if radius == 0 || width == 0 || height == 0 {
        return out;
    }

    let r = radius as i64;
    let (w, h) = (width as i64, height as i64);

    for channel in 0..3 {
        for y in 0..h {
            let y0 = (y - r).max(0);
            let y1 = (y + r).min(h - 1);
            let mut hist = [0u32; 256];

            let add_column = |hist: &mut [u32; 256], x: i64, delta: i32| {
                for sy in y0..=y1 {
                    let v = image.get_pixel(x as u32, sy as u32)[channel] as usize;
                    hist[v] = (hist[v] as i32 + delta) as u32;
                }
            };

            for x in 0..=r.min(w - 1) {
                add_column(&mut hist, x, 1);
            }

            for x in 0..w {
                let (mode, count) = hist
                    .iter()
                    .enumerate()
                    .fold((0usize, 0u32), |best, (value, &n)| {
                        if n > best.1 {
                            (value, n)
                        } else {
                            best
                        }
                    });
                if count > 1 {
                    out.get_pixel_mut(x as u32, y as u32)[channel] = mode as u8;
                }

                if x - r >= 0 {
                    add_column(&mut hist, x - r, -1);
                }
                if x + r + 1 < w {
                    add_column(&mut hist, x + r + 1, 1);
                }
            }
        }
    }
    out
}
