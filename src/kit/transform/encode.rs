// SPDX-License-Identifier: MIT

//! Image encoding into the supported output formats

use std::io::Cursor;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat};

use crate::kit::error::{CanvasError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
    Bmp,
    Tiff,
}

impl FromStr for OutputFormat {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::WebP),
            "gif" => Ok(OutputFormat::Gif),
            "bmp" => Ok(OutputFormat::Bmp),
            "tiff" | "tif" => Ok(OutputFormat::Tiff),
            other => Err(CanvasError::config(format!(
                "Unsupported target format: {}",
                other
            ))),
        }
    }
}

impl OutputFormat {
    fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Gif => ImageFormat::Gif,
            OutputFormat::Bmp => ImageFormat::Bmp,
            OutputFormat::Tiff => ImageFormat::Tiff,
        }
    }
}

/// zlib level for a 1-100 quality; higher quality compresses less
pub fn png_compression_level(quality: u8) -> u8 {
    let quality = quality.clamp(1, 100) as f32;
    (9.0 - (quality - 1.0) / 11.0).clamp(0.0, 9.0) as u8
}

fn png_compression(quality: u8) -> CompressionType {
    match png_compression_level(quality) {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Encode an image; JPEG drops alpha and honours `quality`
pub fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let quality = quality.clamp(1, 100);

    match format {
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                png_compression(quality),
                FilterType::Adaptive,
            );
            image.write_with_encoder(encoder)?;
        }
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            rgb.write_with_encoder(encoder)?;
        }
        OutputFormat::WebP => {
            let encoder = WebPEncoder::new_lossless(&mut buffer);
            eight_bit(image).write_with_encoder(encoder)?;
        }
        OutputFormat::Gif | OutputFormat::Bmp | OutputFormat::Tiff => {
            let prepared = match format {
                OutputFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8()),
                _ => eight_bit(image),
            };
            prepared.write_to(&mut buffer, format.image_format())?;
        }
    }

    Ok(buffer.into_inner())
}

fn eight_bit(image: &DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 200])))
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!("PNG".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("jpeg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        let err = "xcf".parse::<OutputFormat>().unwrap_err();
        assert!(err.to_string().contains("Unsupported target format: xcf"));
    }

    #[test]
    fn test_png_compression_level() {
        assert_eq!(png_compression_level(1), 9);
        assert_eq!(png_compression_level(90), 0);
        assert_eq!(png_compression_level(100), 0);
        assert_eq!(png_compression_level(50), 4);
    }

    #[test]
    fn test_encode_all_formats_decodes() {
        for format in [
            OutputFormat::Png,
            OutputFormat::Jpeg,
            OutputFormat::WebP,
            OutputFormat::Gif,
            OutputFormat::Bmp,
            OutputFormat::Tiff,
        ] {
            let bytes = encode(&sample(), format, 90).unwrap();
            assert_eq!(
                image::guess_format(&bytes).unwrap(),
                format.image_format(),
                "{:?}",
                format
            );
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (8, 6));
        }
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let bytes = encode(&sample(), OutputFormat::Jpeg, 80).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(!decoded.color().has_alpha());
    }
}
