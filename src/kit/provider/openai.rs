// SPDX-License-Identifier: MIT

//! OpenAI Provider - image generation API (DALL-E)

use super::{GenerationMetadata, GenerationRequest, GenerationResponse, ImageProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub const MODELS: &[&str] = &["dall-e-3", "dall-e-2"];

const DEFAULT_MODEL: &str = "dall-e-3";

/// OpenAI image generation implementation
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(client: Client, api_key: &str, base_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build the `images/generations` payload
    fn generation_body(request: &GenerationRequest) -> serde_json::Value {
        let model = request.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let mut body = json!({
            "model": model,
            "prompt": request.prompt,
            "n": 1,
            "size": format!("{}x{}", request.width, request.height),
            "response_format": "url"
        });
        // `quality` is only accepted by dall-e-3
        if model == "dall-e-3" {
            body["quality"] = json!("hd");
        }
        body
    }

    /// Parse an OpenAI response into a normalized response
    fn parse_generation_response(
        response: &serde_json::Value,
        model: &str,
    ) -> GenerationResponse {
        match response["data"]
            .as_array()
            .and_then(|d| d.first())
            .and_then(|d| d["url"].as_str())
        {
            Some(url) => GenerationResponse::succeeded(
                url,
                GenerationMetadata {
                    provider: "openai".to_string(),
                    model: model.to_string(),
                    seed: None,
                },
            ),
            None => GenerationResponse::failed("OpenAI provider error: no image URL in response"),
        }
    }
}

#[async_trait]
impl ImageProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn text_to_image(&self, request: &GenerationRequest) -> GenerationResponse {
        let url = format!("{}/images/generations", self.base_url);
        let body = Self::generation_body(request);

        log::debug!("OpenAI request body: {}", body);

        let resp = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return GenerationResponse::failed(format!("OpenAI provider error: {}", e)),
        };

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return GenerationResponse::failed(format!("OpenAI API error: {}", text));
        }

        match resp.json::<serde_json::Value>().await {
            Ok(json) => {
                let model = body["model"].as_str().unwrap_or(DEFAULT_MODEL);
                Self::parse_generation_response(&json, model)
            }
            Err(e) => GenerationResponse::failed(format!("OpenAI provider error: {}", e)),
        }
    }

    async fn image_to_image(&self, _request: &GenerationRequest) -> GenerationResponse {
        GenerationResponse::failed("Image-to-image not directly supported by DALL-E")
    }

    fn list_models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }
}
