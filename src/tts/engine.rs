//! Seam between the voice service and the synthesis engine that produces audio.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::voice::{AccelerationMode, SynthesisConfig};

/// Failure reported by a synthesis engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid voice config: {0}")]
    Config(String),
    #[error("speaker {speaker} out of range (model has {available} speaker(s))")]
    InvalidSpeaker { speaker: i64, available: u32 },
    #[error("synthesizer process failed: {0}")]
    Process(String),
    #[error("model error: {0}")]
    Model(String),
}

/// Everything an engine needs to load a voice model.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub model_path: PathBuf,
    pub config_path: PathBuf,
    pub acceleration: AccelerationMode,
}

/// Receives synthesized mono samples in the range [-1.0, 1.0].
pub trait AudioSink {
    fn write_samples(&mut self, samples: &[f32]) -> io::Result<()>;
}

impl AudioSink for Vec<f32> {
    fn write_samples(&mut self, samples: &[f32]) -> io::Result<()> {
        self.extend_from_slice(samples);
        Ok(())
    }
}

/// A voice model loaded by an engine.
///
/// Instances are shared behind `Arc` so a synthesis that captured one keeps it
/// alive even after a newer model replaces it.
pub trait LoadedVoice: Send + Sync {
    /// Sample rate of every sample passed to the sink.
    fn sample_rate(&self) -> u32;

    /// Synthesize `text` and stream the audio into `sink`.
    fn synthesize(&self, text: &str, config: &SynthesisConfig, sink: &mut dyn AudioSink) -> Result<(), EngineError>;
}

/// Loads voice models.
pub trait SynthesisEngine: Send + Sync {
    /// Short engine name used in logs.
    fn name(&self) -> &'static str;

    /// Load the model described by `request`. May block for a long time.
    fn load_model(&self, request: &LoadRequest) -> Result<Arc<dyn LoadedVoice>, EngineError>;

    /// Whether two loaded models may coexist.
    ///
    /// When `false`, loading a new model waits until every synthesis running
    /// against the current one has finished.
    fn supports_concurrent_models(&self) -> bool {
        true
    }
}
