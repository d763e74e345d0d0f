// SPDX-License-Identifier: MIT

//! Per-node dispatch
//!
//! [`NodeExecutor`] runs exactly one node: it resolves the node's typed
//! parameters, calls a provider or a local transform, and returns the
//! node's named outputs. Scheduling and input routing live in
//! [`graph`](super::graph).

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::params::{
    CropParams, GenerationParams, ImageInputParams, OutputParams, OverlayParams, Params,
    StyleParams,
};
use super::types::{Node, NodeKind, Values};
use crate::kit::error::{CanvasError, Result};
use crate::kit::provider::{
    Credentials, GenerationMetadata, GenerationRequest, ImageSource, ProviderFactory,
    ProviderLease,
};
use crate::kit::storage::Storage;
use crate::kit::transform::{CropMode, Origin, OverlayOptions, TransformService};

/// Output name shared by every image-producing node
pub const IMAGE: &str = "image";
pub const FINAL_IMAGE_PATH: &str = "final_image_path";
pub const FINAL_IMAGE_URL: &str = "final_image_url";
/// Category that direct (graph-less) generations are stored under
pub const DIRECT_SUBDIR: &str = "direct_generations";

/// Result of a direct generation request
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImage {
    #[serde(skip)]
    pub path: PathBuf,
    /// Public URL of the stored copy
    pub image_url: String,
    /// URL (or data URI) the provider answered with
    pub provider_image_url: String,
    pub metadata: Option<GenerationMetadata>,
}

pub struct NodeExecutor {
    storage: Storage,
    transforms: TransformService,
    providers: Arc<dyn ProviderFactory>,
}

impl NodeExecutor {
    pub fn new(transforms: TransformService, providers: Arc<dyn ProviderFactory>) -> Self {
        Self {
            storage: transforms.storage().clone(),
            transforms,
            providers,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Run one node with its resolved inputs
    pub async fn execute(
        &self,
        node: &Node,
        inputs: &Values,
        credentials: &Credentials,
        execution_id: &str,
    ) -> Result<Values> {
        let params = Params::new(node, inputs);
        let origin = Origin {
            execution_id,
            node_id: &node.id,
        };

        let image = match &node.kind {
            NodeKind::ImageInput => self.image_input(&params, origin).await?,
            NodeKind::TextToImage => self.generate(&params, credentials, false, origin).await?,
            NodeKind::ImageToImage => self.generate(&params, credentials, true, origin).await?,
            NodeKind::StyleTransfer => {
                let style = StyleParams::resolve(&params)?;
                let source = self.existing(&style.image)?;
                self.transforms
                    .apply_style(&source, &style.style, style.intensity, origin)
                    .await?
            }
            NodeKind::TextOverlay => {
                let overlay = OverlayParams::resolve(&params)?;
                let source = self.existing(&overlay.image)?;
                let options = OverlayOptions::new(
                    &overlay.text,
                    &overlay.position,
                    overlay.font_size,
                    &overlay.font_color,
                    &overlay.background_color,
                );
                self.transforms
                    .apply_text_overlay(&source, options, origin)
                    .await?
            }
            NodeKind::CropResize => {
                let crop = CropParams::resolve(&params)?;
                let source = self.existing(&crop.image)?;
                self.transforms
                    .crop_resize(
                        &source,
                        crop.width,
                        crop.height,
                        CropMode::parse(&crop.crop_type),
                        origin,
                    )
                    .await?
            }
            NodeKind::Output => return self.output(&params, origin).await,
            NodeKind::Other(kind) => {
                log::debug!("Node {} has unknown type '{}', passing inputs through", node.id, kind);
                return Ok(inputs.clone());
            }
        };

        let mut outputs = Values::new();
        outputs.insert(IMAGE.to_string(), path_value(&image));
        Ok(outputs)
    }

    async fn image_input(&self, params: &Params<'_>, origin: Origin<'_>) -> Result<PathBuf> {
        match ImageInputParams::resolve(params)? {
            ImageInputParams::Url(url) => {
                self.storage
                    .save_from_url(&url, origin.execution_id, origin.node_id)
                    .await
            }
            ImageInputParams::File(file) => self.existing(&file),
        }
    }

    async fn generate(
        &self,
        params: &Params<'_>,
        credentials: &Credentials,
        image_to_image: bool,
        origin: Origin<'_>,
    ) -> Result<PathBuf> {
        let args = GenerationParams::resolve(params, image_to_image)?;
        let source = args.image.as_deref().map(|r| self.existing(r)).transpose()?;

        let (width, height) = match (&source, args.width, args.height) {
            (_, Some(w), Some(h)) => (w, h),
            (Some(path), w, h) => {
                let (src_w, src_h) = self.transforms.dimensions(path).await?;
                (w.unwrap_or(src_w), h.unwrap_or(src_h))
            }
            (None, w, h) => (w.unwrap_or(1024), h.unwrap_or(1024)),
        };

        let request = GenerationRequest {
            prompt: args.prompt,
            width,
            height,
            steps: args.steps,
            guidance_scale: args.guidance_scale,
            image: source.map(ImageSource::Local),
            strength: args.strength,
            model: args.model,
        };

        let (image_url, _) = self
            .invoke(&args.provider, credentials, &request, image_to_image, origin.node_id)
            .await?;

        self.storage
            .save_from_url(&image_url, origin.execution_id, origin.node_id)
            .await
    }

    /// Generate outside any graph and store the result under [`DIRECT_SUBDIR`]
    ///
    /// `image` switches to image-to-image; it may be a URL, a data URI or
    /// a stored file reference.
    pub async fn generate_direct(
        &self,
        provider: &str,
        credentials: &Credentials,
        mut request: GenerationRequest,
        image: Option<&str>,
    ) -> Result<GeneratedImage> {
        let image_to_image = image.is_some();
        request.image = match image {
            Some(r) if is_remote(r) => Some(ImageSource::Url(r.to_string())),
            Some(r) => Some(ImageSource::Local(self.existing(r)?)),
            None => None,
        };
        let execution_id = if image_to_image { "direct_i2i" } else { "direct_gen" };

        let (provider_image_url, metadata) = self
            .invoke(provider, credentials, &request, image_to_image, execution_id)
            .await?;
        let path = self
            .storage
            .save_from_url_in(&provider_image_url, DIRECT_SUBDIR, execution_id, provider)
            .await?;

        Ok(GeneratedImage {
            image_url: self.storage.url_for(&path),
            path,
            provider_image_url,
            metadata,
        })
    }

    /// Call a provider under a lease and require an image back
    async fn invoke(
        &self,
        provider_name: &str,
        credentials: &Credentials,
        request: &GenerationRequest,
        image_to_image: bool,
        caller: &str,
    ) -> Result<(String, Option<GenerationMetadata>)> {
        let response = {
            let provider = ProviderLease::acquire(self.providers.as_ref(), provider_name, credentials)?;
            log::info!(
                "{} calling {} ({}x{}, model {})",
                caller,
                provider.name(),
                request.width,
                request.height,
                request.model.as_deref().unwrap_or("default")
            );
            if image_to_image {
                provider.image_to_image(request).await
            } else {
                provider.text_to_image(request).await
            }
        };

        if !response.success {
            return Err(CanvasError::provider(
                provider_name,
                response
                    .error
                    .unwrap_or_else(|| "Unknown provider error".to_string()),
            ));
        }
        let image_url = response
            .image_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CanvasError::provider(provider_name, "No image returned"))?;
        Ok((image_url, response.metadata))
    }

    async fn output(&self, params: &Params<'_>, origin: Origin<'_>) -> Result<Values> {
        let output = OutputParams::resolve(params)?;
        let source = self.existing(&output.image)?;
        let path = self
            .transforms
            .convert_format(&source, &output.format, output.quality, origin)
            .await?;

        let mut outputs = Values::new();
        outputs.insert(
            FINAL_IMAGE_URL.to_string(),
            Value::String(self.storage.url_for(&path)),
        );
        outputs.insert(FINAL_IMAGE_PATH.to_string(), path_value(&path));
        Ok(outputs)
    }

    /// Resolve a stored image reference and require that it exists
    fn existing(&self, reference: &str) -> Result<PathBuf> {
        let path = self.storage.resolve(reference);
        if path.is_file() {
            Ok(path)
        } else {
            Err(CanvasError::ResourceMissing(path))
        }
    }
}

fn is_remote(reference: &str) -> bool {
    ["http://", "https://", "data:"]
        .iter()
        .any(|scheme| reference.starts_with(scheme))
}

fn path_value(path: &std::path::Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::config::Settings;
    use crate::kit::error::ErrorKind;
    use crate::kit::provider::{
        GenerationMetadata, GenerationResponse, ImageProvider, ProviderKind,
    };
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use image::{Rgb, RgbImage};
    use serde_json::json;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn png_data_uri(width: u32, height: u32) -> String {
        let mut bytes = Cursor::new(Vec::new());
        RgbImage::from_pixel(width, height, Rgb([9, 99, 199]))
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()))
    }

    struct StubProvider {
        response: GenerationResponse,
        seen: Arc<Mutex<Vec<GenerationRequest>>>,
    }

    #[async_trait]
    impl ImageProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn text_to_image(&self, request: &GenerationRequest) -> GenerationResponse {
            self.seen.lock().unwrap().push(request.clone());
            self.response.clone()
        }

        async fn image_to_image(&self, request: &GenerationRequest) -> GenerationResponse {
            self.seen.lock().unwrap().push(request.clone());
            self.response.clone()
        }

        fn list_models(&self) -> Vec<String> {
            vec![]
        }
    }

    struct StubFactory {
        response: GenerationResponse,
        created: AtomicUsize,
        seen: Arc<Mutex<Vec<GenerationRequest>>>,
    }

    impl StubFactory {
        fn new(response: GenerationResponse) -> Arc<Self> {
            Arc::new(Self {
                response,
                created: AtomicUsize::new(0),
                seen: Arc::new(Mutex::new(Vec::new())),
            })
        }
    }

    impl ProviderFactory for StubFactory {
        fn create(&self, _kind: ProviderKind, _api_key: &str) -> Result<Box<dyn ImageProvider>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubProvider {
                response: self.response.clone(),
                seen: self.seen.clone(),
            }))
        }
    }

    fn executor(dir: &TempDir, factory: Arc<StubFactory>) -> NodeExecutor {
        let settings = Settings::default().with_upload_dir(dir.path());
        let storage = Storage::new(&settings).unwrap();
        NodeExecutor::new(TransformService::new(storage, None), factory)
    }

    fn creds() -> Credentials {
        [("openai".to_string(), "sk-test".to_string())]
            .into_iter()
            .collect()
    }

    fn sample(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(width, height, Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();
        path
    }

    fn ok_response(width: u32, height: u32) -> GenerationResponse {
        GenerationResponse::succeeded(
            png_data_uri(width, height),
            GenerationMetadata {
                provider: "openai".into(),
                model: "dall-e-3".into(),
                seed: None,
            },
        )
    }

    #[tokio::test]
    async fn test_text_to_image_stores_result() {
        let dir = TempDir::new().unwrap();
        let factory = StubFactory::new(ok_response(4, 4));
        let exec = executor(&dir, factory.clone());
        let node = Node::new("gen", "text_to_image")
            .with("provider", "openai")
            .with("prompt", "a lighthouse");

        let outputs = exec.execute(&node, &Values::new(), &creds(), "e1").await.unwrap();

        let path = PathBuf::from(outputs[IMAGE].as_str().unwrap());
        assert!(path.starts_with(dir.path().join("workflow_outputs")));
        assert!(path.is_file());
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        let seen = factory.seen.lock().unwrap();
        assert_eq!(seen[0].prompt, "a lighthouse");
        assert_eq!((seen[0].width, seen[0].height), (1024, 1024));
    }

    #[tokio::test]
    async fn test_missing_prompt_skips_provider() {
        let dir = TempDir::new().unwrap();
        let factory = StubFactory::new(ok_response(4, 4));
        let exec = executor(&dir, factory.clone());
        let node = Node::new("gen", "text_to_image").with("provider", "openai");

        let err = exec.execute(&node, &Values::new(), &creds(), "e1").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("prompt"));
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let dir = TempDir::new().unwrap();
        let factory = StubFactory::new(ok_response(4, 4));
        let exec = executor(&dir, factory.clone());
        let node = Node::new("gen", "text_to_image")
            .with("provider", "fal")
            .with("prompt", "x");

        let err = exec.execute(&node, &Values::new(), &creds(), "e1").await.unwrap_err();
        assert!(matches!(err, CanvasError::MissingCredential { .. }));
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_is_upstream_error() {
        let dir = TempDir::new().unwrap();
        let factory = StubFactory::new(GenerationResponse::failed("quota exceeded"));
        let exec = executor(&dir, factory);
        let node = Node::new("gen", "text_to_image")
            .with("provider", "openai")
            .with("prompt", "x");

        let err = exec.execute(&node, &Values::new(), &creds(), "e1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamProvider);
        assert!(err.to_string().contains("quota exceeded"));
        assert!(err.to_string().contains("openai"));
    }

    #[tokio::test]
    async fn test_image_to_image_defaults_to_source_size() {
        let dir = TempDir::new().unwrap();
        let factory = StubFactory::new(ok_response(4, 4));
        let exec = executor(&dir, factory.clone());
        let source = sample(&dir, "src.png", 40, 24);
        let node = Node::new("i2i", "image_to_image")
            .with("provider", "openai")
            .with("prompt", "as a painting");
        let inputs = json!({"image": source.to_string_lossy()})
            .as_object()
            .cloned()
            .unwrap();

        exec.execute(&node, &inputs, &creds(), "e1").await.unwrap();

        let seen = factory.seen.lock().unwrap();
        assert_eq!((seen[0].width, seen[0].height), (40, 24));
        assert_eq!(seen[0].image, Some(ImageSource::Local(source)));
        assert_eq!(seen[0].strength, 0.8);
    }

    #[tokio::test]
    async fn test_missing_upstream_image() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, StubFactory::new(ok_response(1, 1)));
        let node = Node::new("s", "style_transfer")
            .with("image", "gone.png")
            .with("style", "neon");

        let err = exec.execute(&node, &Values::new(), &creds(), "e1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceMissing);
    }

    #[tokio::test]
    async fn test_output_node_reports_url() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, StubFactory::new(ok_response(1, 1)));
        sample(&dir, "in.png", 8, 8);
        let node = Node::new("out", "output")
            .with("image", "in.png")
            .with("format", "webp");

        let outputs = exec.execute(&node, &Values::new(), &creds(), "e1").await.unwrap();

        let url = outputs[FINAL_IMAGE_URL].as_str().unwrap();
        assert!(url.starts_with("http://localhost:8000/uploads/"));
        assert!(url.ends_with(".webp"));
        assert!(PathBuf::from(outputs[FINAL_IMAGE_PATH].as_str().unwrap()).is_file());
    }

    #[tokio::test]
    async fn test_unknown_type_passes_inputs_through() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, StubFactory::new(ok_response(1, 1)));
        let node = Node::new("p", "sharpen").with("amount", 3);
        let inputs = json!({"image": "whatever.png"}).as_object().cloned().unwrap();

        let outputs = exec.execute(&node, &inputs, &creds(), "e1").await.unwrap();
        assert_eq!(outputs, inputs);
    }

    #[tokio::test]
    async fn test_direct_text_to_image() {
        let dir = TempDir::new().unwrap();
        let factory = StubFactory::new(ok_response(6, 6));
        let exec = executor(&dir, factory.clone());
        let request = GenerationRequest {
            width: 512,
            ..GenerationRequest::new("a fox")
        };

        let generated = exec
            .generate_direct("openai", &creds(), request, None)
            .await
            .unwrap();

        assert_eq!(generated.path.parent().unwrap(), dir.path().join(DIRECT_SUBDIR));
        let name = generated.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("direct_gen_openai_"), "{}", name);
        assert!(generated.image_url.contains("/uploads/direct_generations/"));
        assert!(generated.provider_image_url.starts_with("data:image/png"));
        assert_eq!(generated.metadata.unwrap().model, "dall-e-3");

        let seen = factory.seen.lock().unwrap();
        assert_eq!((seen[0].width, seen[0].height), (512, 1024));
        assert_eq!(seen[0].image, None);
    }

    #[tokio::test]
    async fn test_direct_image_to_image_sources() {
        let dir = TempDir::new().unwrap();
        let factory = StubFactory::new(ok_response(6, 6));
        let exec = executor(&dir, factory.clone());
        let local = sample(&dir, "src.png", 8, 8);

        let generated = exec
            .generate_direct("openai", &creds(), GenerationRequest::new("x"), Some("src.png"))
            .await
            .unwrap();
        let name = generated.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("direct_i2i_openai_"), "{}", name);

        exec.generate_direct(
            "openai",
            &creds(),
            GenerationRequest::new("x"),
            Some("https://cdn.example.com/a.png"),
        )
        .await
        .unwrap();

        let seen = factory.seen.lock().unwrap();
        assert_eq!(seen[0].image, Some(ImageSource::Local(local)));
        assert_eq!(
            seen[1].image,
            Some(ImageSource::Url("https://cdn.example.com/a.png".into()))
        );
    }

    #[tokio::test]
    async fn test_direct_generation_errors() {
        let dir = TempDir::new().unwrap();
        let factory = StubFactory::new(GenerationResponse::failed("content policy"));
        let exec = executor(&dir, factory.clone());

        let err = exec
            .generate_direct("openai", &creds(), GenerationRequest::new("x"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamProvider);
        assert!(err.to_string().contains("content policy"));

        let err = exec
            .generate_direct("openai", &creds(), GenerationRequest::new("x"), Some("gone.png"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceMissing);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }
}
