// SPDX-License-Identifier: MIT

//! Resizing and cropping

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// Scale to cover the target box, keep the middle
    Center,
    /// Scale to cover the target box, keep the busiest window
    Smart,
    /// Stretch to the target box
    ResizeOnly,
}

impl CropMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "center_crop" | "center" => CropMode::Center,
            "smart_crop" | "smart" => CropMode::Smart,
            _ => CropMode::ResizeOnly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CropMode::Center => "center_crop",
            CropMode::Smart => "smart_crop",
            CropMode::ResizeOnly => "resize_only",
        }
    }
}

/// Resize (and crop) to the requested box
///
/// Missing or zero dimensions keep the source size on that axis. Cropping
/// modes only apply when both dimensions are given.
pub fn crop_resize(
    image: &DynamicImage,
    width: Option<u32>,
    height: Option<u32>,
    mode: CropMode,
) -> DynamicImage {
    let (src_w, src_h) = image.dimensions();
    let width = width.filter(|w| *w > 0);
    let height = height.filter(|h| *h > 0);
    let target_w = width.unwrap_or(src_w);
    let target_h = height.unwrap_or(src_h);

    let crops = width.is_some() && height.is_some() && mode != CropMode::ResizeOnly;
    if !crops || src_w == 0 || src_h == 0 {
        return image.resize_exact(target_w, target_h, FilterType::Lanczos3);
    }

    let src_aspect = src_w as f64 / src_h as f64;
    let target_aspect = target_w as f64 / target_h as f64;
    let (scaled_w, scaled_h) = if src_aspect > target_aspect {
        (((target_h as f64 * src_aspect) as u32).max(target_w), target_h)
    } else {
        (target_w, ((target_w as f64 / src_aspect) as u32).max(target_h))
    };

    let scaled = image.resize_exact(scaled_w, scaled_h, FilterType::Lanczos3);
    let (left, top) = match mode {
        CropMode::Smart => busiest_offset(&scaled, target_w, target_h),
        _ => ((scaled_w - target_w) / 2, (scaled_h - target_h) / 2),
    };

    scaled.crop_imm(left, top, target_w, target_h)
}

/// Offset of the crop window with the most edge energy
///
/// Only the overflowing axis is searched; ties prefer the window closest to
/// the centre, so flat images crop exactly like `Center`.
fn busiest_offset(image: &DynamicImage, target_w: u32, target_h: u32) -> (u32, u32) {
    let luma = image.to_luma8();
    let (w, h) = luma.dimensions();
    let horizontal = w > target_w;
    let (len, window) = if horizontal { (w, target_w) } else { (h, target_h) };
    if len <= window {
        return ((w - target_w) / 2, (h - target_h) / 2);
    }

    let mut energy = vec![0u64; len as usize];
    for y in 0..h {
        for x in 0..w {
            let here = luma.get_pixel(x, y)[0] as i32;
            let right = luma.get_pixel((x + 1).min(w - 1), y)[0] as i32;
            let below = luma.get_pixel(x, (y + 1).min(h - 1))[0] as i32;
            let gradient = ((here - right).abs() + (here - below).abs()) as u64;
            let slot = if horizontal { x } else { y };
            energy[slot as usize] += gradient;
        }
    }

    let centre = (len - window) / 2;
    let mut sum: u64 = energy[..window as usize].iter().sum();
    let mut best = (sum, 0u32);
    for start in 1..=(len - window) {
        sum = sum - energy[(start - 1) as usize] + energy[(start + window - 1) as usize];
        let closer = start.abs_diff(centre) < best.1.abs_diff(centre);
        if sum > best.0 || (sum == best.0 && closer) {
            best = (sum, start);
        }
    }

    if horizontal {
        (best.1, (h - target_h) / 2)
    } else {
        ((w - target_w) / 2, best.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 60, 30])))
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(CropMode::parse("center"), CropMode::Center);
        assert_eq!(CropMode::parse("center_crop"), CropMode::Center);
        assert_eq!(CropMode::parse("smart"), CropMode::Smart);
        assert_eq!(CropMode::parse("manual"), CropMode::ResizeOnly);
        assert_eq!(CropMode::parse(""), CropMode::ResizeOnly);
    }

    #[test]
    fn test_resize_only_stretches() {
        let out = crop_resize(&solid(40, 20), Some(10), Some(10), CropMode::ResizeOnly);
        assert_eq!(out.dimensions(), (10, 10));
    }

    #[test]
    fn test_missing_dimension_keeps_source() {
        let out = crop_resize(&solid(40, 20), Some(10), None, CropMode::Center);
        assert_eq!(out.dimensions(), (10, 20));

        let out = crop_resize(&solid(40, 20), Some(0), Some(0), CropMode::Center);
        assert_eq!(out.dimensions(), (40, 20));
    }

    #[test]
    fn test_center_crop_exact_box() {
        let out = crop_resize(&solid(64, 48), Some(30), Some(30), CropMode::Center);
        assert_eq!(out.dimensions(), (30, 30));

        let out = crop_resize(&solid(48, 64), Some(40), Some(20), CropMode::Center);
        assert_eq!(out.dimensions(), (40, 20));
    }

    #[test]
    fn test_smart_crop_follows_detail() {
        // Flat image with a striped block near the right edge
        let mut img = RgbImage::from_pixel(60, 20, Rgb([128, 128, 128]));
        for y in 0..20 {
            for x in 45..60 {
                let v = if (x + y) % 2 == 0 { 0 } else { 255 };
                img.put_pixel(x, y, Rgb([v, v, v]));
            }
        }
        let img = DynamicImage::ImageRgb8(img);

        assert_eq!(busiest_offset(&img, 20, 20), (40, 0));
        assert_eq!(busiest_offset(&solid(60, 20), 20, 20), (20, 0));

        let out = crop_resize(&img, Some(20), Some(20), CropMode::Smart);
        assert_eq!(out.dimensions(), (20, 20));
    }
}
