// SPDX-License-Identifier: MIT

//! Fal Provider - hosted SDXL endpoints

use super::{GenerationMetadata, GenerationRequest, GenerationResponse, ImageProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub const MODELS: &[&str] = &[
    "fast-sdxl",
    "sdxl-img2img",
    "flux-dev",
    "flux-schnell",
    "stable-diffusion-v3-medium",
];

/// Fal.ai implementation
pub struct FalProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FalProvider {
    pub fn new(client: Client, api_key: &str, base_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn text_to_image_body(request: &GenerationRequest) -> serde_json::Value {
        json!({
            "prompt": request.prompt,
            "image_size": format!("{}x{}", request.width, request.height),
            "num_inference_steps": request.steps,
            "guidance_scale": request.guidance_scale,
            "num_images": 1
        })
    }

    fn image_to_image_body(request: &GenerationRequest, image_url: &str) -> serde_json::Value {
        json!({
            "prompt": request.prompt,
            "image_url": image_url,
            "strength": request.strength,
            "num_inference_steps": request.steps,
            "guidance_scale": request.guidance_scale
        })
    }

    /// Parse `images[0].url` out of a Fal response
    fn parse_images_response(response: &serde_json::Value, model: &str) -> GenerationResponse {
        match response["images"]
            .as_array()
            .and_then(|i| i.first())
            .and_then(|i| i["url"].as_str())
        {
            Some(url) => GenerationResponse::succeeded(
                url,
                GenerationMetadata {
                    provider: "fal".to_string(),
                    model: model.to_string(),
                    seed: response["seed"].as_u64().map(|s| s.to_string()),
                },
            ),
            None => GenerationResponse::failed("Fal.ai provider error: no images in response"),
        }
    }

    async fn submit(&self, model: &str, body: &serde_json::Value) -> GenerationResponse {
        let url = format!("{}/{}", self.base_url, model);

        let resp = match self
            .client
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return GenerationResponse::failed(format!("Fal.ai provider error: {}", e)),
        };

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return GenerationResponse::failed(format!("Fal.ai API error: {}", text));
        }

        match resp.json::<serde_json::Value>().await {
            Ok(json) => Self::parse_images_response(&json, model),
            Err(e) => GenerationResponse::failed(format!("Fal.ai provider error: {}", e)),
        }
    }
}

#[async_trait]
impl ImageProvider for FalProvider {
    fn name(&self) -> &str {
        "fal"
    }

    async fn text_to_image(&self, request: &GenerationRequest) -> GenerationResponse {
        let model = request.model.as_deref().unwrap_or("fast-sdxl");
        self.submit(model, &Self::text_to_image_body(request)).await
    }

    async fn image_to_image(&self, request: &GenerationRequest) -> GenerationResponse {
        let Some(source) = &request.image else {
            return GenerationResponse::failed("Image URL is required for image-to-image.");
        };
        let image_url = match source.remote_url().await {
            Ok(url) => url,
            Err(e) => return GenerationResponse::failed(format!("Fal.ai provider error: {}", e)),
        };
        self.submit("sdxl-img2img", &Self::image_to_image_body(request, &image_url))
            .await
    }

    fn list_models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }
}
