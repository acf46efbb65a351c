use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use super::types::{ApiError, GenerateRequest, GenerateResponse, LoadModelRequest, LoadModelResponse, SuccessResponse};
use crate::config::{ModelCatalog, ModelFile};
use crate::voice::{AccelerationMode, StatusReport, SynthesisConfig, VoiceError, VoiceService};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VoiceService>,
    pub catalog: ModelCatalog,
    pub load_timeout: Duration,
    pub synthesis_timeout: Duration,
}

/// Build the API router.
///
/// - `GET /health`
/// - `GET /api/status`, `GET /api/models`
/// - `POST /api/load_model`, `POST /api/synthesis_config`, `POST /api/generate`
/// - `GET /audio/:filename`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/models", get(models))
        .route("/api/load_model", post(load_model))
        .route("/api/synthesis_config", post(synthesis_config))
        .route("/api/generate", post(generate))
        .route("/audio/:filename", get(audio))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let catalog = state.catalog.clone();
    let models_available = tokio::task::spawn_blocking(move || catalog.count()).await.unwrap_or_default();
    Json(state.service.status(models_available))
}

async fn models(State(state): State<AppState>) -> Json<Vec<ModelFile>> {
    let catalog = state.catalog.clone();
    Json(tokio::task::spawn_blocking(move || catalog.list()).await.unwrap_or_default())
}

/// POST /api/load_model: set the acceleration preference, then load.
async fn load_model(
    State(state): State<AppState>,
    payload: Result<Json<LoadModelRequest>, JsonRejection>,
) -> Result<Json<LoadModelResponse>, ApiError> {
    let Json(req) = payload?;
    if req.model_path.trim().is_empty() {
        return Err(ApiError::bad_request("No model path provided", "missing_model_path"));
    }

    if let Some(use_gpu) = req.use_gpu {
        state.service.set_acceleration_preference(use_gpu);
    }

    let config_path = req.config_path.filter(|p| !p.trim().is_empty()).map(PathBuf::from);
    let handle = state.service.load_voice_within(PathBuf::from(&req.model_path), config_path, state.load_timeout).await?;

    Ok(Json(LoadModelResponse {
        success: true,
        model_path: handle.model_path().to_string_lossy().to_string(),
        cuda_enabled: handle.acceleration() == AccelerationMode::Gpu,
    }))
}

/// POST /api/synthesis_config: replace the configuration for subsequent synthesis.
async fn synthesis_config(
    State(state): State<AppState>,
    payload: Result<Json<SynthesisConfig>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(config) = payload?;
    config.validate()?;
    state.service.set_configuration(config);
    Ok(Json(SuccessResponse::ok()))
}

/// POST /api/generate: synthesize text into a downloadable WAV.
async fn generate(State(state): State<AppState>, payload: Result<Json<GenerateRequest>, JsonRejection>) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(req) = payload?;
    let artifact = state.service.synthesize_within(req.text, state.synthesis_timeout).await?;
    info!("Generated {} for download", artifact.filename);
    Ok(Json(artifact.into()))
}

/// GET /audio/:filename: serve a finished artifact.
async fn audio(State(state): State<AppState>, Path(filename): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let resolved = state.service.artifacts().resolve(&filename)?;
    if !resolved.exists {
        debug!("Audio file not found: {}", filename);
        return Err(VoiceError::ArtifactNotFound(resolved.path).into());
    }

    let bytes = tokio::fs::read(&resolved.path).await.map_err(|_| VoiceError::ArtifactNotFound(resolved.path.clone()))?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes))
}
