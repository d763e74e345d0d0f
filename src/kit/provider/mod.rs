// SPDX-License-Identifier: MIT

//! Provider module - image generation backends
//!
//! This module provides the core [`ImageProvider`] trait and the normalized
//! request/response types every backend speaks. Adapters live in their own
//! submodules:
//! - [fal] - Fal.ai hosted SDXL
//! - [groq] - Groq (text-only, reports image operations as unsupported)
//! - [openai] - OpenAI image generation (DALL-E)
//! - [stability] - Stability AI v1 and v2beta endpoints
//!
//! Adapters never raise for remote failures: transport errors, non-2xx
//! statuses and malformed bodies all come back as a failed
//! [`GenerationResponse`].

pub mod fal;
pub mod groq;
pub mod openai;
pub mod stability;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::config::ProviderEndpoints;
use super::error::{CanvasError, Result};

/// Where the source image for image-to-image comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Remote `http(s)` URL or `data:` URI
    Url(String),
    /// File on local storage
    Local(PathBuf),
}

impl ImageSource {
    /// Raw bytes of the image
    pub async fn bytes(&self, client: &Client) -> std::result::Result<Vec<u8>, String> {
        match self {
            ImageSource::Local(path) => tokio::fs::read(path)
                .await
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e)),
            ImageSource::Url(url) => {
                if let Some((_, payload)) = url.strip_prefix("data:").and_then(|d| d.split_once(',')) {
                    return STANDARD
                        .decode(payload)
                        .map_err(|e| format!("Invalid base64 image data: {}", e));
                }
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| format!("Failed to download init image: {}", e))?;
                if !resp.status().is_success() {
                    return Err(format!("Failed to download init image: HTTP {}", resp.status()));
                }
                resp.bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(|e| format!("Failed to download init image: {}", e))
            }
        }
    }

    /// A URL a remote service can consume; local files become `data:` URIs
    pub async fn remote_url(&self) -> std::result::Result<String, String> {
        match self {
            ImageSource::Url(url) => Ok(url.clone()),
            ImageSource::Local(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
                Ok(format!(
                    "data:{};base64,{}",
                    self.mime_type(),
                    STANDARD.encode(bytes)
                ))
            }
        }
    }

    /// MIME type guessed from a `data:` header or the file extension; PNG otherwise
    pub fn mime_type(&self) -> &'static str {
        let extension = match self {
            ImageSource::Local(path) => path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ImageSource::Url(url) => match url.strip_prefix("data:") {
                Some(data) => data
                    .split([';', ','])
                    .next()
                    .and_then(|mime| mime.strip_prefix("image/"))
                    .unwrap_or_default()
                    .to_string(),
                None => url
                    .split(['?', '#'])
                    .next()
                    .and_then(|path| path.rsplit_once('/'))
                    .and_then(|(_, name)| name.rsplit_once('.'))
                    .map(|(_, ext)| ext.to_string())
                    .unwrap_or_default(),
            },
        };

        IMAGE_TYPES
            .iter()
            .find(|(ext, _)| extension.eq_ignore_ascii_case(ext))
            .map(|(_, mime)| *mime)
            .unwrap_or("image/png")
    }

    /// Upload file name with an extension matching [`mime_type`](Self::mime_type)
    pub fn file_name(&self, stem: &str) -> String {
        let mime = self.mime_type();
        let extension = IMAGE_TYPES
            .iter()
            .find(|(_, m)| *m == mime)
            .map(|(ext, _)| *ext)
            .unwrap_or("png");
        format!("{}.{}", stem, extension)
    }
}

/// Extension to MIME type; the first entry per type is its canonical extension
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
    ("tif", "image/tiff"),
];

/// Normalized generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f32,
    /// Source image for image-to-image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSource>,
    pub strength: f32,
    /// Provider-specific model id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            width: 1024,
            height: 1024,
            steps: 30,
            guidance_scale: 7.5,
            image: None,
            strength: 0.8,
            model: None,
        }
    }
}

/// Provenance reported alongside a generated image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

/// Normalized generation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    /// `http(s)` URL or `data:` URI of the image
    pub image_url: Option<String>,
    pub error: Option<String>,
    pub metadata: Option<GenerationMetadata>,
}

impl GenerationResponse {
    pub fn succeeded(image_url: impl Into<String>, metadata: GenerationMetadata) -> Self {
        Self {
            success: true,
            image_url: Some(image_url.into()),
            error: None,
            metadata: Some(metadata),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            image_url: None,
            error: Some(error.into()),
            metadata: None,
        }
    }
}

/// Core trait for image generation backends
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Lower-case provider name
    fn name(&self) -> &str;

    async fn text_to_image(&self, request: &GenerationRequest) -> GenerationResponse;

    async fn image_to_image(&self, request: &GenerationRequest) -> GenerationResponse;

    fn list_models(&self) -> Vec<String>;
}

/// The closed set of supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAI,
    Fal,
    Stability,
    Groq,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAI,
        ProviderKind::Fal,
        ProviderKind::Stability,
        ProviderKind::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Fal => "fal",
            ProviderKind::Stability => "stability",
            ProviderKind::Groq => "groq",
        }
    }

    /// Models advertised without contacting the backend
    pub fn models(&self) -> Vec<String> {
        let models: &[&str] = match self {
            ProviderKind::OpenAI => openai::MODELS,
            ProviderKind::Fal => fal::MODELS,
            ProviderKind::Stability => stability::MODELS,
            ProviderKind::Groq => groq::MODELS,
        };
        models.iter().map(|m| m.to_string()).collect()
    }

    /// Generation modes the backend implements
    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAI => &["text-to-image"],
            ProviderKind::Fal | ProviderKind::Stability => &["text-to-image", "image-to-image"],
            ProviderKind::Groq => &[],
        }
    }
}

impl FromStr for ProviderKind {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "fal" => Ok(ProviderKind::Fal),
            "stability" => Ok(ProviderKind::Stability),
            "groq" => Ok(ProviderKind::Groq),
            _ => Err(CanvasError::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request provider secrets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self(keys)
    }

    pub fn insert(&mut self, provider: impl Into<String>, key: impl Into<String>) {
        self.0.insert(provider.into(), key.into());
    }

    /// Look up a key by lower-case provider name, then by `<PROVIDER>_API_KEY`
    pub fn resolve(&self, provider: &str) -> Result<&str> {
        self.0
            .get(&provider.to_lowercase())
            .or_else(|| self.0.get(&format!("{}_API_KEY", provider.to_uppercase())))
            .map(String::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CanvasError::MissingCredential {
                provider: provider.to_string(),
            })
    }
}

impl FromIterator<(String, String)> for Credentials {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Builds provider instances; the seam tests replace with mocks
pub trait ProviderFactory: Send + Sync {
    fn create(&self, kind: ProviderKind, api_key: &str) -> Result<Box<dyn ImageProvider>>;
}

/// Factory for the real HTTP adapters
#[derive(Debug, Clone)]
pub struct HttpProviderFactory {
    endpoints: ProviderEndpoints,
    timeout: Duration,
}

impl HttpProviderFactory {
    pub fn new(endpoints: ProviderEndpoints, timeout: Duration) -> Self {
        Self { endpoints, timeout }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, kind: ProviderKind, api_key: &str) -> Result<Box<dyn ImageProvider>> {
        let endpoints = &self.endpoints;
        let provider: Box<dyn ImageProvider> = match kind {
            ProviderKind::OpenAI => Box::new(openai::OpenAIProvider::new(
                http_client(self.timeout)?,
                api_key,
                &endpoints.openai,
            )),
            ProviderKind::Fal => Box::new(fal::FalProvider::new(
                http_client(self.timeout)?,
                api_key,
                &endpoints.fal,
            )),
            ProviderKind::Stability => Box::new(stability::StabilityProvider::new(
                http_client(self.timeout)?,
                api_key,
                &endpoints.stability,
                &endpoints.stability_v2,
            )),
            ProviderKind::Groq => Box::new(groq::GroqProvider),
        };
        Ok(provider)
    }
}

/// Client sized for slow generation calls
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// A provider checked out for one node invocation
///
/// The underlying client is closed when the lease is dropped, whether the
/// call succeeded or not.
pub struct ProviderLease {
    inner: Box<dyn ImageProvider>,
}

impl ProviderLease {
    /// Resolve credentials and build a provider for `provider_name`
    pub fn acquire(
        factory: &dyn ProviderFactory,
        provider_name: &str,
        credentials: &Credentials,
    ) -> Result<Self> {
        let api_key = credentials.resolve(provider_name)?;
        let kind = ProviderKind::from_str(provider_name)?;
        let inner = factory.create(kind, api_key)?;
        log::debug!("Acquired {} provider client", inner.name());
        Ok(Self { inner })
    }
}

impl Deref for ProviderLease {
    type Target = dyn ImageProvider;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl Drop for ProviderLease {
    fn drop(&mut self) {
        log::debug!("Released {} provider client", self.inner.name());
    }
}
