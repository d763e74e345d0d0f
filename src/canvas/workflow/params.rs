// SPDX-License-Identifier: MIT

//! Typed parameter resolution for each node type
//!
//! Values are looked up in the node's live inputs first and its static
//! config second, so an upstream connection always wins over a value typed
//! into the editor. Numbers may arrive as JSON numbers or numeric strings.

use serde_json::Value;

use super::types::{Node, Values};
use crate::kit::error::{CanvasError, Result};
use crate::kit::transform::overlay::MAX_FONT_SIZE;

/// Layered view over one node's inputs and config
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    node_id: &'a str,
    inputs: &'a Values,
    config: &'a Values,
}

impl<'a> Params<'a> {
    pub fn new(node: &'a Node, inputs: &'a Values) -> Self {
        Self {
            node_id: &node.id,
            inputs,
            config: &node.config,
        }
    }

    pub fn node_id(&self) -> &str {
        self.node_id
    }

    /// Raw value; `null` counts as absent
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.inputs
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.config.get(key).filter(|v| !v.is_null()))
    }

    /// Value rendered as text; empty strings count as absent
    pub fn text(&self, key: &str) -> Option<String> {
        let text = match self.get(key)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    pub fn required(&self, key: &str) -> Result<String> {
        self.text(key)
            .ok_or_else(|| CanvasError::missing(self.node_id, key))
    }

    pub fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    /// Like [`text_or`](Self::text_or) but keeps an explicitly empty string
    pub fn raw_text_or(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(_) => self.text_or(key, default),
            None => default.to_string(),
        }
    }

    pub fn number(&self, key: &str) -> Result<Option<f64>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value {
            Value::Number(n) => Ok(n.as_f64()),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.invalid(key, format!("'{}' is not a number", s))),
            other => Err(self.invalid(key, format!("expected a number, got {}", other))),
        }
    }

    pub fn float_or(&self, key: &str, default: f32) -> Result<f32> {
        Ok(self.number(key)?.map(|n| n as f32).unwrap_or(default))
    }

    /// Non-negative integer; fractional values truncate
    pub fn dimension(&self, key: &str) -> Result<Option<u32>> {
        match self.number(key)? {
            None => Ok(None),
            Some(n) if !n.is_finite() || n < 0.0 || n > u32::MAX as f64 => {
                Err(self.invalid(key, format!("{} is out of range", n)))
            }
            Some(n) => Ok(Some(n as u32)),
        }
    }

    pub fn dimension_or(&self, key: &str, default: u32) -> Result<u32> {
        Ok(self.dimension(key)?.unwrap_or(default))
    }

    fn invalid(&self, key: &str, message: String) -> CanvasError {
        CanvasError::invalid(self.node_id, key, message)
    }
}

/// `image_input`
#[derive(Debug, Clone, PartialEq)]
pub enum ImageInputParams {
    Url(String),
    File(String),
}

impl ImageInputParams {
    pub fn resolve(params: &Params) -> Result<Self> {
        if params.text_or("source_type", "upload") == "url" {
            Ok(Self::Url(params.required("url")?))
        } else {
            Ok(Self::File(params.required("file")?))
        }
    }
}

/// `text_to_image` and `image_to_image`
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub provider: String,
    pub prompt: String,
    pub model: Option<String>,
    /// Source image reference, required for image-to-image
    pub image: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: u32,
    pub guidance_scale: f32,
    pub strength: f32,
}

impl GenerationParams {
    pub fn resolve(params: &Params, needs_image: bool) -> Result<Self> {
        let provider = params.required("provider")?;
        let prompt = params.required("prompt")?;
        let image = if needs_image {
            Some(params.required("image")?)
        } else {
            None
        };

        Ok(Self {
            provider,
            prompt,
            model: params.text("model"),
            image,
            width: params.dimension("width")?,
            height: params.dimension("height")?,
            steps: params.dimension_or("steps", 30)?,
            guidance_scale: params.float_or("guidance_scale", 7.5)?,
            strength: params.float_or("strength", 0.8)?,
        })
    }
}

/// `style_transfer`
#[derive(Debug, Clone, PartialEq)]
pub struct StyleParams {
    pub image: String,
    pub style: String,
    pub intensity: f32,
}

impl StyleParams {
    pub fn resolve(params: &Params) -> Result<Self> {
        Ok(Self {
            image: params.required("image")?,
            style: params.required("style")?,
            intensity: params.float_or("intensity", 0.7)?,
        })
    }
}

/// `text_overlay`
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayParams {
    pub image: String,
    pub text: String,
    pub position: String,
    pub font_size: u32,
    pub font_color: String,
    pub background_color: String,
}

impl OverlayParams {
    pub fn resolve(params: &Params) -> Result<Self> {
        Ok(Self {
            image: params.required("image")?,
            text: params.raw_text_or("text", ""),
            position: params.text_or("position", "center"),
            font_size: params.dimension_or("font_size", 32)?.clamp(1, MAX_FONT_SIZE),
            font_color: params.text_or("font_color", "#ffffff"),
            background_color: params.text_or("background_color", "transparent"),
        })
    }
}

/// `crop_resize`
#[derive(Debug, Clone, PartialEq)]
pub struct CropParams {
    pub image: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub crop_type: String,
}

impl CropParams {
    pub fn resolve(params: &Params) -> Result<Self> {
        Ok(Self {
            image: params.required("image")?,
            width: params.dimension("width")?,
            height: params.dimension("height")?,
            crop_type: params.text_or("crop_type", "resize_only"),
        })
    }
}

/// `output`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputParams {
    pub image: String,
    pub format: String,
    pub quality: u8,
}

impl OutputParams {
    pub fn resolve(params: &Params) -> Result<Self> {
        Ok(Self {
            image: params.required("image")?,
            format: Self::format_of(params),
            quality: params.dimension_or("quality", 90)?.clamp(1, 100) as u8,
        })
    }

    /// Requested format, lower-cased; also used when reporting results
    pub fn format_of(params: &Params) -> String {
        params.text_or("format", "png").to_ascii_lowercase()
    }
}
