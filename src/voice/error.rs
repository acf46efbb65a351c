//! Errors surfaced by the voice service.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::tts::EngineError;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("failed to load voice model {}: {source}", .path.display())]
    EngineLoadFailed {
        path: PathBuf,
        #[source]
        source: EngineError,
    },
    #[error("no voice loaded, load a model first")]
    NoVoiceLoaded,
    #[error("text to synthesize is empty")]
    EmptyInput,
    #[error("synthesis failed: {0}")]
    EngineSynthesisFailed(#[source] EngineError),
    #[error("failed to write audio artifact: {0}")]
    ArtifactWriteFailed(String),
    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),
    #[error("invalid artifact path: {0}")]
    InvalidPath(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid synthesis configuration: {0}")]
    InvalidConfiguration(String),
}

impl VoiceError {
    /// Stable identifier for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            VoiceError::ModelNotFound(_) => "model_not_found",
            VoiceError::EngineLoadFailed { .. } => "engine_load_failed",
            VoiceError::NoVoiceLoaded => "no_voice_loaded",
            VoiceError::EmptyInput => "empty_input",
            VoiceError::EngineSynthesisFailed(_) => "engine_synthesis_failed",
            VoiceError::ArtifactWriteFailed(_) => "artifact_write_failed",
            VoiceError::ArtifactNotFound(_) => "artifact_not_found",
            VoiceError::InvalidPath(_) => "invalid_path",
            VoiceError::Timeout(_) => "timeout",
            VoiceError::InvalidConfiguration(_) => "invalid_configuration",
        }
    }

    pub(crate) fn write_failed(err: impl std::fmt::Display) -> Self {
        VoiceError::ArtifactWriteFailed(err.to_string())
    }
}
