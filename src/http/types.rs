//! Request and response bodies for the HTTP API.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::artifact::SynthesisArtifact;
use crate::voice::VoiceError;

/// `POST /api/load_model`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadModelRequest {
    pub model_path: String,
    pub use_gpu: Option<bool>,
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadModelResponse {
    pub success: bool,
    pub model_path: String,
    pub cuda_enabled: bool,
}

/// `POST /api/generate`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub audio_url: String,
    pub filename: String,
    pub file_size: u64,
}

impl From<SynthesisArtifact> for GenerateResponse {
    fn from(artifact: SynthesisArtifact) -> Self {
        Self {
            success: true,
            audio_url: format!("/audio/{}", artifact.filename),
            filename: artifact.filename,
            file_size: artifact.size_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Error body returned by every endpoint: `{success: false, error, code}`.
#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: &'static str,
}

/// A failed request, rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, code: &'static str) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into(), code }
    }
}

impl From<VoiceError> for ApiError {
    fn from(err: VoiceError) -> Self {
        let status = match &err {
            VoiceError::NoVoiceLoaded | VoiceError::EmptyInput | VoiceError::InvalidConfiguration(_) | VoiceError::InvalidPath(_) => {
                StatusCode::BAD_REQUEST
            }
            VoiceError::ModelNotFound(_) | VoiceError::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
            VoiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            VoiceError::EngineLoadFailed { .. } | VoiceError::EngineSynthesisFailed(_) | VoiceError::ArtifactWriteFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self { status, message: err.to_string(), code: err.code() }
    }
}

/// Malformed, mistyped or non-JSON request bodies.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self { status: rejection.status(), message: rejection.body_text(), code: "invalid_request" }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { success: false, error: self.message, code: self.code };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (VoiceError::NoVoiceLoaded, StatusCode::BAD_REQUEST),
            (VoiceError::EmptyInput, StatusCode::BAD_REQUEST),
            (VoiceError::InvalidPath("..".into()), StatusCode::BAD_REQUEST),
            (VoiceError::ModelNotFound(PathBuf::from("x.onnx")), StatusCode::NOT_FOUND),
            (VoiceError::ArtifactNotFound(PathBuf::from("x.wav")), StatusCode::NOT_FOUND),
            (VoiceError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
            (VoiceError::ArtifactWriteFailed("disk full".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_generate_response_from_artifact() {
        let artifact = SynthesisArtifact {
            filename: "tts-1-000001-abcdef01.wav".into(),
            path: PathBuf::from("/tmp/tts-1-000001-abcdef01.wav"),
            size_bytes: 1234,
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(GenerateResponse::from(artifact)).unwrap();
        assert_eq!(json["audioUrl"], "/audio/tts-1-000001-abcdef01.wav");
        assert_eq!(json["fileSize"], 1234);
        assert_eq!(json["success"], true);
    }

    #[test]
    fn test_load_request_defaults() {
        let req: LoadModelRequest = serde_json::from_str(r#"{"modelPath": "models/a.onnx"}"#).unwrap();
        assert_eq!(req.model_path, "models/a.onnx");
        assert!(req.use_gpu.is_none());

        let req: LoadModelRequest = serde_json::from_str("{}").unwrap();
        assert!(req.model_path.is_empty());
    }
}
