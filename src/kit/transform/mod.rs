// SPDX-License-Identifier: MIT

//! Local image transformations
//!
//! Every operation reads a stored image, runs the pixel work on the
//! blocking pool and writes a new file next to its source (see
//! [`Storage::derived_path`]). Sources are never modified.

pub mod encode;
pub mod geometry;
pub mod overlay;
pub mod style;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageReader};

use super::error::{CanvasError, Result};
use super::storage::Storage;

pub use encode::OutputFormat;
pub use geometry::CropMode;
pub use overlay::{GlyphSource, OverlayOptions};
pub use style::Style;

/// Identifies which execution and node a derived file belongs to
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    pub execution_id: &'a str,
    pub node_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct TransformService {
    storage: Storage,
    glyphs: Arc<GlyphSource>,
}

impl TransformService {
    pub fn new(storage: Storage, font_path: Option<&Path>) -> Self {
        Self {
            storage,
            glyphs: Arc::new(GlyphSource::load(font_path)),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Pixel dimensions of a stored image
    pub async fn dimensions(&self, source: &Path) -> Result<(u32, u32)> {
        let source = source.to_path_buf();
        blocking(move || Ok(image::image_dimensions(&source)?)).await
    }

    /// Apply a named style; output is PNG
    pub async fn apply_style(
        &self,
        source: &Path,
        style: &str,
        intensity: f32,
        origin: Origin<'_>,
    ) -> Result<PathBuf> {
        let style = Style::parse(style);
        let operation = format!("styled_{}", style.name());
        self.process(source, origin, &operation, OutputFormat::Png, "png", 95, move |img| {
            Ok(style.apply(&img, intensity))
        })
        .await
    }

    /// Render a caption; output is PNG with alpha
    pub async fn apply_text_overlay(
        &self,
        source: &Path,
        options: OverlayOptions,
        origin: Origin<'_>,
    ) -> Result<PathBuf> {
        let glyphs = Arc::clone(&self.glyphs);
        self.process(source, origin, "text_overlay", OutputFormat::Png, "png", 95, move |img| {
            let mut canvas = img.to_rgba8();
            overlay::render(&mut canvas, &options, &glyphs);
            Ok(DynamicImage::ImageRgba8(canvas))
        })
        .await
    }

    /// Resize and optionally crop; output is PNG
    pub async fn crop_resize(
        &self,
        source: &Path,
        width: Option<u32>,
        height: Option<u32>,
        mode: CropMode,
        origin: Origin<'_>,
    ) -> Result<PathBuf> {
        self.process(source, origin, "crop_resize", OutputFormat::Png, "png", 95, move |img| {
            Ok(geometry::crop_resize(&img, width, height, mode))
        })
        .await
    }

    /// Re-encode into `format`, keeping the requested spelling as extension
    pub async fn convert_format(
        &self,
        source: &Path,
        format: &str,
        quality: u8,
        origin: Origin<'_>,
    ) -> Result<PathBuf> {
        let target: OutputFormat = format.parse()?;
        let extension = format.trim().to_ascii_lowercase();
        let operation = format!("converted_{}", extension);
        self.process(source, origin, &operation, target, &extension, quality, Ok)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn process<F>(
        &self,
        source: &Path,
        origin: Origin<'_>,
        operation: &str,
        format: OutputFormat,
        extension: &str,
        quality: u8,
        transform: F,
    ) -> Result<PathBuf>
    where
        F: FnOnce(DynamicImage) -> Result<DynamicImage> + Send + 'static,
    {
        let output = self.storage.derived_path(
            source,
            origin.execution_id,
            origin.node_id,
            operation,
            extension,
        );

        let source = source.to_path_buf();
        let target = output.clone();
        blocking(move || {
            let image = open_image(&source)?;
            let result = transform(image)?;
            let bytes = encode::encode(&result, format, quality)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, bytes)?;
            Ok(())
        })
        .await?;

        log::debug!("{} wrote {}", operation, output.display());
        Ok(output)
    }
}

fn open_image(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(CanvasError::ResourceMissing(path.to_path_buf()));
    }
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CanvasError::other(format!("Image task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::config::Settings;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    const ORIGIN: Origin<'static> = Origin {
        execution_id: "exec1",
        node_id: "n1",
    };

    fn service(dir: &TempDir) -> TransformService {
        let settings = Settings::default().with_upload_dir(dir.path());
        TransformService::new(Storage::new(&settings).unwrap(), None)
    }

    fn write_sample(dir: &TempDir, relative: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(width, height, Rgb([200, 120, 40]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_style_writes_next_to_source() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let source = write_sample(&dir, "gallery/cat.png", 12, 8);

        let out = svc.apply_style(&source, "vintage", 0.5, ORIGIN).await.unwrap();

        assert_eq!(out.parent().unwrap(), dir.path().join("gallery"));
        let name = out.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("exec1_n1_styled_vintage_"), "{}", name);
        assert!(name.ends_with(".png"));
        assert_eq!(image::image_dimensions(&out).unwrap(), (12, 8));
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_crop_resize_output_size() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let source = write_sample(&dir, "a.png", 40, 30);

        let out = svc
            .crop_resize(&source, Some(16), Some(16), CropMode::Center, ORIGIN)
            .await
            .unwrap();
        assert_eq!(svc.dimensions(&out).await.unwrap(), (16, 16));
    }

    #[tokio::test]
    async fn test_convert_format_jpeg() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let source = write_sample(&dir, "a.png", 10, 10);

        let out = svc.convert_format(&source, "jpg", 85, ORIGIN).await.unwrap();
        let name = out.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.contains("_converted_jpg_"));
        assert!(name.ends_with(".jpg"));

        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_convert_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let source = write_sample(&dir, "a.png", 4, 4);

        let err = svc.convert_format(&source, "psd", 90, ORIGIN).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported target format: psd"));
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let err = svc
            .apply_style(&dir.path().join("nope.png"), "neon", 0.5, ORIGIN)
            .await
            .unwrap_err();
        assert!(matches!(err, CanvasError::ResourceMissing(_)));
    }

    #[tokio::test]
    async fn test_text_overlay_keeps_size() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let source = write_sample(&dir, "a.png", 64, 48);
        let options = OverlayOptions::new("Hello", "bottom", 16, "#ffffff", "#000000");

        let out = svc.apply_text_overlay(&source, options, ORIGIN).await.unwrap();
        assert_eq!(image::image_dimensions(&out).unwrap(), (64, 48));
    }
}
