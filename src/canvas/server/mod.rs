// SPDX-License-Identifier: MIT

//! HTTP front end for the workflow engine

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::canvas::workflow::descriptor;
use crate::canvas::workflow::{
    EventSink, ExecutionEvent, FailureResponse, WorkflowEngine, WorkflowRequest, WorkflowResponse,
};
use crate::kit::error::{CanvasError, ErrorKind, Result};
use crate::kit::provider::{Credentials, GenerationRequest, ProviderKind};
use crate::kit::storage::AssetType;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<WorkflowEngine>,
}

/// Build the API router around a shared engine
pub fn router(engine: Arc<WorkflowEngine>) -> Router {
    let uploads = ServeDir::new(engine.storage().root());
    let state = AppState { engine };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/v1/execute-workflow", post(execute_workflow))
        .route("/api/v1/execute-workflow/stream", post(stream_workflow))
        .route("/api/v1/node-types", get(node_types))
        .route("/api/v1/providers/{name}/models", get(provider_models))
        .route("/api/v1/assets", get(list_assets))
        .route("/api/v1/assets/upload", post(upload_asset))
        .route("/api/v1/assets/{category}/{filename}", delete(delete_asset))
        .route("/api/v1/generate/text-to-image", post(generate_text_to_image))
        .route("/api/v1/generate/image-to-image", post(generate_image_to_image))
        .route("/api/v1/generate/providers", get(generation_providers))
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(engine: Arc<WorkflowEngine>, addr: SocketAddr) -> Result<()> {
    let app = router(engine);

    log::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// A failed request; carries the execution id when a run was started
struct ApiError {
    error: CanvasError,
    execution_id: Option<String>,
}

impl From<CanvasError> for ApiError {
    fn from(error: CanvasError) -> Self {
        Self {
            error,
            execution_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match (&self.error, self.error.kind()) {
            (CanvasError::UnknownProvider(_) | CanvasError::ResourceMissing(_), _) => {
                StatusCode::NOT_FOUND
            }
            (_, ErrorKind::Configuration | ErrorKind::GraphIntegrity) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = FailureResponse::new(&self.error, self.execution_id);
        (status, Json(body)).into_response()
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Canvas workflow API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn execute_workflow(
    State(state): State<AppState>,
    Json(request): Json<WorkflowRequest>,
) -> std::result::Result<Json<WorkflowResponse>, ApiError> {
    let execution_id = WorkflowEngine::new_execution_id();
    log::info!(
        "Executing workflow {:?} as {} ({} nodes)",
        request.name.as_deref().unwrap_or("unnamed"),
        execution_id,
        request.nodes.len()
    );

    state
        .engine
        .execute_with(
            &execution_id,
            &request.nodes,
            &request.edges,
            &request.credentials,
            &EventSink::none(),
        )
        .await
        .map(|outcome| Json(outcome.into()))
        .map_err(|error| ApiError {
            error,
            execution_id: Some(execution_id),
        })
}

async fn stream_workflow(
    State(state): State<AppState>,
    Json(request): Json<WorkflowRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let execution_id = WorkflowEngine::new_execution_id();
        log::info!("Starting streaming execution {}", execution_id);

        let result = state
            .engine
            .execute_with(
                &execution_id,
                &request.nodes,
                &request.edges,
                &request.credentials,
                &EventSink::new(tx),
            )
            .await;

        if let Err(e) = result {
            log::error!("Streaming execution {} failed: {}", execution_id, e);
        }
    });

    let stream = ReceiverStream::new(rx).map(|event: ExecutionEvent| {
        let frame = Event::default()
            .event(event.name())
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("failed").data(e.to_string()));
        Ok(frame)
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}

async fn node_types() -> Json<Value> {
    Json(descriptor::catalogue())
}

async fn provider_models(
    Path(name): Path<String>,
) -> std::result::Result<Json<Value>, ApiError> {
    let kind = ProviderKind::from_str(&name)?;
    Ok(Json(json!({
        "provider": kind.as_str(),
        "models": kind.models(),
    })))
}

/// Body of the direct generation routes
#[derive(Debug, Deserialize)]
struct GenerateRequest {
    provider: String,
    #[serde(default, alias = "credentials")]
    api_keys: Credentials,
    prompt: String,
    width: Option<u32>,
    height: Option<u32>,
    steps: Option<u32>,
    guidance_scale: Option<f32>,
    strength: Option<f32>,
    model: Option<String>,
    /// Source image for image-to-image: URL, data URI or stored file
    image_url: Option<String>,
}

impl GenerateRequest {
    fn generation(&self) -> Result<GenerationRequest> {
        if self.prompt.trim().is_empty() {
            return Err(CanvasError::config("Missing 'prompt' for generation"));
        }
        let defaults = GenerationRequest::default();
        Ok(GenerationRequest {
            prompt: self.prompt.clone(),
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            steps: self.steps.unwrap_or(defaults.steps),
            guidance_scale: self.guidance_scale.unwrap_or(defaults.guidance_scale),
            image: None,
            strength: self.strength.unwrap_or(defaults.strength),
            model: self.model.clone(),
        })
    }
}

async fn generate_text_to_image(
    State(state): State<AppState>,
    Json(payload): Json<GenerateRequest>,
) -> std::result::Result<Json<Value>, ApiError> {
    let generated = state
        .engine
        .generate(&payload.provider, &payload.api_keys, payload.generation()?, None)
        .await?;
    log::info!("Direct generation via {} stored at {}", payload.provider, generated.image_url);
    Ok(Json(json!({
        "success": true,
        "message": "Image generated successfully.",
        "data": generated,
    })))
}

async fn generate_image_to_image(
    State(state): State<AppState>,
    Json(payload): Json<GenerateRequest>,
) -> std::result::Result<Json<Value>, ApiError> {
    let image = payload
        .image_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| CanvasError::config("Missing 'image_url' for image-to-image generation"))?;
    let generated = state
        .engine
        .generate(&payload.provider, &payload.api_keys, payload.generation()?, Some(image))
        .await?;
    log::info!("Direct image-to-image via {} stored at {}", payload.provider, generated.image_url);
    Ok(Json(json!({
        "success": true,
        "message": "Image transformed successfully.",
        "data": generated,
    })))
}

/// Providers that can generate, with their models and modes
async fn generation_providers() -> Json<Value> {
    let providers: serde_json::Map<String, Value> = ProviderKind::ALL
        .iter()
        .filter(|kind| !kind.capabilities().is_empty())
        .map(|kind| {
            (
                kind.as_str().to_string(),
                json!({
                    "models": kind.models(),
                    "capabilities": kind.capabilities(),
                }),
            )
        })
        .collect();
    Json(json!({
        "success": true,
        "data": providers,
    }))
}

#[derive(Debug, Deserialize)]
struct AssetQuery {
    category: Option<String>,
    /// `image` or `template`; other values list everything
    file_type: Option<String>,
}

async fn list_assets(
    State(state): State<AppState>,
    Query(query): Query<AssetQuery>,
) -> std::result::Result<Json<Value>, ApiError> {
    let assets = state
        .engine
        .storage()
        .list_assets(
            query.category.as_deref(),
            query.file_type.as_deref().and_then(AssetType::parse),
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "total": assets.len(),
        "assets": assets,
    })))
}

async fn delete_asset(
    State(state): State<AppState>,
    Path((category, filename)): Path<(String, String)>,
) -> std::result::Result<Json<Value>, ApiError> {
    state.engine.storage().delete(&category, &filename).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Asset '{}' in category '{}' deleted successfully.", filename, category),
    })))
}

async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<Value>, ApiError> {
    let mut category = "general".to_string();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CanvasError::config(format!("Invalid upload: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "category" => {
                category = field
                    .text()
                    .await
                    .map_err(|e| CanvasError::config(format!("Invalid category: {}", e)))?;
            }
            "file" => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| CanvasError::config(format!("Invalid file: {}", e)))?;
                file = Some((name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (name, bytes) = file.ok_or_else(|| CanvasError::config("No file provided"))?;
    let storage = state.engine.storage();
    let path = storage.save_bytes(&bytes, &category, &name).await?;
    log::info!("Uploaded {} ({} bytes)", path.display(), bytes.len());

    Ok(Json(json!({
        "success": true,
        "filename": path.file_name().map(|n| n.to_string_lossy().into_owned()),
        "path": path.to_string_lossy(),
        "url": storage.url_for(&path),
        "category": category,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::config::Settings;
    use crate::kit::error::WorkflowError;
    use crate::kit::provider::{
        GenerationMetadata, GenerationResponse, ImageProvider, ProviderFactory,
    };
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use tempfile::TempDir;

    /// Answers every call with a tiny base64 PNG-ish payload
    struct EchoProvider;

    #[async_trait]
    impl ImageProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn text_to_image(&self, _request: &GenerationRequest) -> GenerationResponse {
            GenerationResponse::succeeded(
                format!("data:image/png;base64,{}", STANDARD.encode(b"png")),
                GenerationMetadata {
                    provider: "fal".into(),
                    model: "fal-ai/flux/dev".into(),
                    seed: Some("7".into()),
                },
            )
        }

        async fn image_to_image(&self, request: &GenerationRequest) -> GenerationResponse {
            match &request.image {
                Some(_) => self.text_to_image(request).await,
                None => GenerationResponse::failed("no source image"),
            }
        }

        fn list_models(&self) -> Vec<String> {
            vec![]
        }
    }

    struct EchoFactory;

    impl ProviderFactory for EchoFactory {
        fn create(&self, _kind: ProviderKind, _api_key: &str) -> Result<Box<dyn ImageProvider>> {
            Ok(Box::new(EchoProvider))
        }
    }

    fn app_state(dir: &TempDir) -> AppState {
        let settings = Settings::default().with_upload_dir(dir.path());
        let engine = WorkflowEngine::new(&settings, Arc::new(EchoFactory)).unwrap();
        AppState {
            engine: Arc::new(engine),
        }
    }

    fn payload(body: Value) -> Json<GenerateRequest> {
        Json(serde_json::from_value(body).unwrap())
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_graph_errors_are_bad_requests() {
        let err = ApiError {
            error: WorkflowError::Stranded(vec!["b".into()]).into(),
            execution_id: Some("e1".into()),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "graph_integrity");
        assert_eq!(body["execution_id"], "e1");
        assert_eq!(body["stranded"][0], "b");
    }

    #[tokio::test]
    async fn test_provider_errors_are_server_errors() {
        let err = ApiError::from(CanvasError::provider("fal", "boom"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error_kind"], "upstream_provider");
    }

    #[tokio::test]
    async fn test_models_endpoint() {
        let Json(body) = provider_models(Path("fal".to_string())).await.ok().unwrap();
        assert_eq!(body["provider"], "fal");
        assert!(!body["models"].as_array().unwrap().is_empty());

        let response = provider_models(Path("nope".to_string()))
            .await
            .err()
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_router_builds() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = Settings::default().with_upload_dir(dir.path());
        let engine = Arc::new(WorkflowEngine::from_settings(&settings).unwrap());
        let _ = router(engine);
    }

    #[tokio::test]
    async fn test_generate_text_to_image_route() {
        let dir = TempDir::new().unwrap();
        let Json(body) = generate_text_to_image(
            State(app_state(&dir)),
            payload(json!({
                "provider": "fal",
                "api_keys": {"fal": "key"},
                "prompt": "a red kite",
            })),
        )
        .await
        .ok()
        .unwrap();

        assert_eq!(body["success"], true);
        let url = body["data"]["image_url"].as_str().unwrap();
        assert!(url.contains("/uploads/direct_generations/direct_gen_fal_"), "{}", url);
        assert!(body["data"]["provider_image_url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png"));
        assert_eq!(body["data"]["metadata"]["seed"], "7");
        assert_eq!(std::fs::read_dir(dir.path().join("direct_generations")).unwrap().count(), 1);
    }

    #[test]
    fn test_generate_request_defaults() {
        let Json(request) = payload(json!({
            "provider": "stability",
            "credentials": {"STABILITY_API_KEY": "k"},
            "prompt": "dunes",
            "steps": 12,
        }));
        let generation = request.generation().unwrap();
        assert_eq!((generation.width, generation.height), (1024, 1024));
        assert_eq!(generation.steps, 12);
        assert_eq!(generation.guidance_scale, 7.5);
        assert_eq!(generation.strength, 0.8);
        assert!(request.api_keys.resolve("stability").is_ok());
    }

    #[tokio::test]
    async fn test_image_to_image_requires_source() {
        let dir = TempDir::new().unwrap();
        let response = generate_image_to_image(
            State(app_state(&dir)),
            payload(json!({
                "provider": "fal",
                "api_keys": {"fal": "key"},
                "prompt": "as watercolor",
            })),
        )
        .await
        .err()
        .unwrap()
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("image_url"));
    }

    #[tokio::test]
    async fn test_image_to_image_route() {
        let dir = TempDir::new().unwrap();
        let Json(body) = generate_image_to_image(
            State(app_state(&dir)),
            payload(json!({
                "provider": "stability",
                "api_keys": {"stability": "key"},
                "prompt": "as watercolor",
                "image_url": "https://cdn.example.com/in.png",
            })),
        )
        .await
        .ok()
        .unwrap();

        let url = body["data"]["image_url"].as_str().unwrap();
        assert!(url.contains("/direct_generations/direct_i2i_stability_"), "{}", url);
    }

    #[tokio::test]
    async fn test_generation_providers_lists_capabilities() {
        let Json(body) = generation_providers().await;
        let data = body["data"].as_object().unwrap();

        assert_eq!(data["openai"]["capabilities"], json!(["text-to-image"]));
        assert_eq!(
            data["fal"]["capabilities"],
            json!(["text-to-image", "image-to-image"])
        );
        assert!(!data["stability"]["models"].as_array().unwrap().is_empty());
        assert!(!data.contains_key("groq"));
    }

    #[tokio::test]
    async fn test_delete_asset_route() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir);
        state
            .engine
            .storage()
            .save_bytes(b"x", "brand", "logo.png")
            .await
            .unwrap();

        let Json(body) = delete_asset(
            State(state.clone()),
            Path(("brand".to_string(), "logo.png".to_string())),
        )
        .await
        .ok()
        .unwrap();
        assert_eq!(body["success"], true);
        assert!(!dir.path().join("brand").join("logo.png").exists());

        let response = delete_asset(
            State(state),
            Path(("brand".to_string(), "logo.png".to_string())),
        )
        .await
        .err()
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_assets_file_type_query() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir);
        let storage = state.engine.storage();
        storage.save_bytes(b"x", "brand", "logo.png").await.unwrap();
        storage.save_bytes(b"{}", "brand", "flow.json").await.unwrap();

        let Json(body) = list_assets(
            State(state.clone()),
            Query(AssetQuery {
                category: None,
                file_type: Some("template".into()),
            }),
        )
        .await
        .ok()
        .unwrap();
        assert_eq!(body["total"], 1);
        assert_eq!(body["assets"][0]["filename"], "flow.json");

        let Json(body) = list_assets(
            State(state),
            Query(AssetQuery {
                category: Some("brand".into()),
                file_type: Some("video".into()),
            }),
        )
        .await
        .ok()
        .unwrap();
        assert_eq!(body["total"], 2);
    }
}
