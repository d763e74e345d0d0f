// SPDX-License-Identifier: MIT

//! Stability Provider - v1 SDXL engines and v2beta SD3 endpoints
//!
//! The v1 engine answers with base64 artifacts in JSON; the v2beta
//! endpoints answer with raw image bytes. Both are normalized into
//! `data:image/png;base64,...` locators.

use super::{GenerationMetadata, GenerationRequest, GenerationResponse, ImageProvider};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::json;

pub const MODELS: &[&str] = &[
    "stable-diffusion-xl-1024-v1-0",
    "stable-diffusion-v1-6",
    "stable-diffusion-xl-beta-v2-2-2",
    "stable-diffusion-3-medium",
    "stable-diffusion-3-ultra",
];

const DEFAULT_ENGINE: &str = "stable-diffusion-xl-1024-v1-0";

/// Which Stability API family serves a model
#[derive(Debug, Clone, PartialEq)]
enum Route {
    /// v1 engine id
    Engine(String),
    /// v2beta `ultra`
    Ultra,
    /// v2beta `core`
    Core,
}

impl Route {
    fn for_model(model: Option<&str>) -> Self {
        let model = model.unwrap_or(DEFAULT_ENGINE);
        match model.to_ascii_lowercase().as_str() {
            "sd3-ultra" | "stable-diffusion-3-ultra" => Route::Ultra,
            "sd3-core" | "stable-diffusion-3-core" | "stable-diffusion-3-medium" => Route::Core,
            _ => Route::Engine(model.to_string()),
        }
    }

    fn v2_path(&self) -> &'static str {
        match self {
            Route::Ultra => "ultra",
            _ => "core",
        }
    }

    fn v2_model_name(&self) -> &'static str {
        match self {
            Route::Ultra => "sd3-ultra",
            _ => "sd3-core",
        }
    }
}

/// Stability AI implementation
pub struct StabilityProvider {
    client: Client,
    api_key: String,
    base_url: String,
    v2_base_url: String,
}

impl StabilityProvider {
    pub fn new(client: Client, api_key: &str, base_url: &str, v2_base_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            v2_base_url: v2_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn sdxl_text_body(request: &GenerationRequest) -> serde_json::Value {
        json!({
            "text_prompts": [{"text": request.prompt, "weight": 1.0}],
            "width": request.width,
            "height": request.height,
            "steps": request.steps,
            "cfg_scale": request.guidance_scale,
            "samples": 1
        })
    }

    /// Parse `artifacts[0].base64` out of a v1 response
    fn parse_artifacts(response: &serde_json::Value, engine_id: &str) -> GenerationResponse {
        let Some(artifact) = response["artifacts"].as_array().and_then(|a| a.first()) else {
            return GenerationResponse::failed("No artifacts returned from Stability API.");
        };
        let Some(data) = artifact["base64"].as_str() else {
            return GenerationResponse::failed("No base64 image data in artifact.");
        };

        GenerationResponse::succeeded(
            format!("data:image/png;base64,{}", data),
            GenerationMetadata {
                provider: "stability".to_string(),
                model: engine_id.to_string(),
                seed: artifact["seed"].as_u64().map(|s| s.to_string()),
            },
        )
    }

    /// Error text from a non-2xx Stability response
    async fn error_message(resp: Response) -> String {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| {
                v["message"]
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| v.get("errors").map(|e| e.to_string()))
            })
            .unwrap_or(text);
        format!("Stability API error ({}): {}", status.as_u16(), detail)
    }

    async fn request_sdxl_text(&self, engine_id: &str, request: &GenerationRequest) -> GenerationResponse {
        let url = format!("{}/{}/text-to-image", self.base_url, engine_id);

        let resp = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .json(&Self::sdxl_text_body(request))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return GenerationResponse::failed(format!(
                    "Stability provider HTTP request error: {}",
                    e
                ))
            }
        };

        if !resp.status().is_success() {
            return GenerationResponse::failed(Self::error_message(resp).await);
        }

        match resp.json::<serde_json::Value>().await {
            Ok(json) => Self::parse_artifacts(&json, engine_id),
            Err(e) => GenerationResponse::failed(format!("Stability provider error: {}", e)),
        }
    }

    async fn request_sdxl_image(&self, engine_id: &str, request: &GenerationRequest) -> GenerationResponse {
        let Some(source) = &request.image else {
            return GenerationResponse::failed("Image URL is required for image-to-image.");
        };
        let init_image = match source.bytes(&self.client).await {
            Ok(bytes) => bytes,
            Err(e) => return GenerationResponse::failed(e),
        };

        let part = match Part::bytes(init_image)
            .file_name(source.file_name("init_image"))
            .mime_str(source.mime_type())
        {
            Ok(part) => part,
            Err(e) => return GenerationResponse::failed(format!("Stability provider error (i2i): {}", e)),
        };

        let form = Form::new()
            .text("init_image_mode", "IMAGE_STRENGTH")
            .text("image_strength", request.strength.to_string())
            .text("text_prompts[0][text]", request.prompt.clone())
            .text("text_prompts[0][weight]", "1.0")
            .text("cfg_scale", request.guidance_scale.to_string())
            .text("steps", request.steps.to_string())
            .text("samples", "1")
            .part("init_image", part);

        let url = format!("{}/{}/image-to-image", self.base_url, engine_id);
        let resp = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return GenerationResponse::failed(format!(
                    "Stability provider HTTP request error (i2i): {}",
                    e
                ))
            }
        };

        if !resp.status().is_success() {
            return GenerationResponse::failed(Self::error_message(resp).await);
        }

        match resp.json::<serde_json::Value>().await {
            Ok(json) => Self::parse_artifacts(&json, engine_id),
            Err(e) => GenerationResponse::failed(format!("Stability provider error (i2i): {}", e)),
        }
    }

    async fn request_v2(&self, route: &Route, request: &GenerationRequest, with_image: bool) -> GenerationResponse {
        let mut form = Form::new()
            .text("prompt", request.prompt.clone())
            .text("output_format", "png");

        if with_image {
            let Some(source) = &request.image else {
                return GenerationResponse::failed("Image URL is required for image-to-image.");
            };
            let bytes = match source.bytes(&self.client).await {
                Ok(bytes) => bytes,
                Err(e) => return GenerationResponse::failed(e),
            };
            let part = match Part::bytes(bytes)
                .file_name(source.file_name("input_image"))
                .mime_str(source.mime_type())
            {
                Ok(part) => part,
                Err(e) => return GenerationResponse::failed(format!("Stability provider error (v2): {}", e)),
            };
            form = form
                .text("mode", "image-to-image")
                .text("strength", request.strength.to_string())
                .part("image", part);
        } else {
            form = form.text("aspect_ratio", aspect_ratio(request.width, request.height));
        }

        let url = format!("{}/{}", self.v2_base_url, route.v2_path());
        let resp = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "image/*")
            .multipart(form)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return GenerationResponse::failed(format!(
                    "Stability provider HTTP request error (v2): {}",
                    e
                ))
            }
        };

        if !resp.status().is_success() {
            return GenerationResponse::failed(Self::error_message(resp).await);
        }

        let seed = resp
            .headers()
            .get("seed")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match resp.bytes().await {
            Ok(bytes) if !bytes.is_empty() => GenerationResponse::succeeded(
                format!("data:image/png;base64,{}", STANDARD.encode(&bytes)),
                GenerationMetadata {
                    provider: "stability".to_string(),
                    model: route.v2_model_name().to_string(),
                    seed,
                },
            ),
            Ok(_) => GenerationResponse::failed("Stability API v2 returned an empty image"),
            Err(e) => GenerationResponse::failed(format!("Stability provider error (v2): {}", e)),
        }
    }
}

/// Reduce `width:height` to lowest terms
fn aspect_ratio(width: u32, height: u32) -> String {
    fn gcd(a: u32, b: u32) -> u32 {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }
    let divisor = gcd(width, height).max(1);
    format!("{}:{}", width / divisor, height / divisor)
}

#[async_trait]
impl ImageProvider for StabilityProvider {
    fn name(&self) -> &str {
        "stability"
    }

    async fn text_to_image(&self, request: &GenerationRequest) -> GenerationResponse {
        match Route::for_model(request.model.as_deref()) {
            Route::Engine(engine_id) => self.request_sdxl_text(&engine_id, request).await,
            route => self.request_v2(&route, request, false).await,
        }
    }

    async fn image_to_image(&self, request: &GenerationRequest) -> GenerationResponse {
        match Route::for_model(request.model.as_deref()) {
            Route::Engine(engine_id) => self.request_sdxl_image(&engine_id, request).await,
            route => self.request_v2(&route, request, true).await,
        }
    }

    fn list_models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }
}
