// SPDX-License-Identifier: MIT

//! Groq Provider - text models only

use super::{GenerationRequest, GenerationResponse, ImageProvider};
use async_trait::async_trait;

pub const MODELS: &[&str] = &[
    "mixtral-8x7b-32768",
    "llama3-70b-8192",
    "llama3-8b-8192",
    "gemma-7b-it",
];

/// Groq has no image endpoints; both operations report failure
pub struct GroqProvider;

#[async_trait]
impl ImageProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn text_to_image(&self, _request: &GenerationRequest) -> GenerationResponse {
        GenerationResponse::failed(
            "Groq provider does not support text-to-image generation at this time.",
        )
    }

    async fn image_to_image(&self, _request: &GenerationRequest) -> GenerationResponse {
        GenerationResponse::failed(
            "Groq provider does not support image-to-image transformation at this time.",
        )
    }

    fn list_models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }
}
