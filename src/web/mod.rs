pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod ui;

use crate::{
    diagnosis::{DiagnosisPipeline, CLASSES, SEVERITY_TABLE},
    image::ImagePreprocessor,
    models::ModelManager,
    utils::error::RetinaError,
    Config, Result,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    middleware::from_fn,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir};

/// State shared by every handler. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub models: Arc<ModelManager>,
    pub preprocessor: Arc<ImagePreprocessor>,
}

impl AppState {
    pub fn new(config: Config, models: ModelManager) -> Self {
        let preprocessor = ImagePreprocessor::new(config.preprocess.clone());
        Self {
            config: Arc::new(config),
            models: Arc::new(models),
            preprocessor: Arc::new(preprocessor),
        }
    }

    /// Inference pipeline over the loaded model, or `ModelNotLoaded`
    pub fn pipeline(&self) -> Result<DiagnosisPipeline> {
        let model = self.models.model()?;
        Ok(DiagnosisPipeline::new(
            model,
            Arc::clone(&self.preprocessor),
            self.config.server_config.max_request_size,
        ))
    }
}

pub async fn serve(config: Config) -> Result<()> {
    config.init_dirs()?;

    // load the classifier once; failure leaves the service degraded
    let models = ModelManager::load(&config);
    if !models.is_loaded() {
        tracing::warn!(
            "Model not loaded! Please ensure the checkpoint exists at: {}",
            config.model_path.display()
        );
    }

    let state = AppState::new(config, models);
    let app = create_app(state.clone());

    let addr: SocketAddr = state.config.bind_addr.parse().map_err(|e| {
        RetinaError::Config(format!(
            "Invalid bind address {}: {}",
            state.config.bind_addr, e
        ))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Model path: {}", state.config.model_path.display());
    tracing::info!("Model loaded: {}", state.models.is_loaded());
    tracing::info!("Device: {}", state.models.device());
    tracing::info!("API endpoints:");
    tracing::info!("  POST /api/predict   - Multipart file upload");
    tracing::info!("  GET  /api/classes   - Severity levels");
    tracing::info!("  GET  /api/health    - Health check");
    tracing::info!("  GET  /api/info      - Service information");
    tracing::info!("  GET  /demo          - Interactive demo");
    tracing::info!("  GET  /              - Web UI");

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| RetinaError::Internal(format!("Failed to bind to address {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| RetinaError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);
    let max_request_size = state.config.server_config.max_request_size;

    Router::new()
        // JSON API
        .route("/api/predict", post(handlers::predict_handler))
        .route("/api/classes", get(classes_handler))
        .route("/api/health", get(health_handler))
        .route("/api/info", get(info_handler))
        // interactive demo
        .route("/demo", get(ui::demo_page_handler))
        .route("/demo/analyze", post(ui::demo_analyze_handler))
        // bundled front-end at / and any other path
        .fallback_service(static_files)
        // oversized bodies fail while the multipart stream is read and come
        // back as a JSON `FileTooLarge`
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(CorsLayer::permissive())
        .layer(from_fn(middleware::request_logging))
        .with_state(state)
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.models.is_loaded(),
        "device": state.models.device().as_str(),
    }))
}

/// Severity levels endpoint
async fn classes_handler() -> Json<serde_json::Value> {
    Json(json!({
        "classes": CLASSES,
        "info": SEVERITY_TABLE,
    }))
}

/// Service information endpoint
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = &state.config;
    Json(json!({
        "service": "Diabetic Retinopathy Detection",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "model": state.models.get_stats(),
        "allowed_extensions": config.allowed_extensions,
        "max_upload_bytes": config.server_config.max_request_size,
        "preprocess": config.preprocess,
    }))
}
