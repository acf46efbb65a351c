//! Loaded voice model handles.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::tts::LoadedVoice;

/// Hardware used to run a loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationMode {
    /// General-purpose processor (default, always available)
    #[default]
    Cpu,
    /// Hardware accelerator (CUDA on Linux, CoreML on macOS)
    Gpu,
}

impl AccelerationMode {
    pub fn from_preference(use_gpu: bool) -> Self {
        if use_gpu { AccelerationMode::Gpu } else { AccelerationMode::Cpu }
    }
}

impl fmt::Display for AccelerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccelerationMode::Cpu => write!(f, "cpu"),
            AccelerationMode::Gpu => write!(f, "gpu"),
        }
    }
}

/// Default config location for a model: `<model_path>.json`.
pub fn default_config_path(model_path: &Path) -> PathBuf {
    let mut raw = model_path.as_os_str().to_owned();
    raw.push(".json");
    PathBuf::from(raw)
}

/// A successfully loaded voice model.
///
/// Immutable once built. A newer load supersedes it in the service, but
/// anyone still holding the `Arc` keeps the engine state alive.
pub struct VoiceModelHandle {
    model_path: PathBuf,
    config_path: PathBuf,
    acceleration: AccelerationMode,
    loaded_at: OffsetDateTime,
    engine: Arc<dyn LoadedVoice>,
}

impl VoiceModelHandle {
    pub(crate) fn new(model_path: PathBuf, config_path: PathBuf, acceleration: AccelerationMode, engine: Arc<dyn LoadedVoice>) -> Self {
        Self { model_path, config_path, acceleration, loaded_at: OffsetDateTime::now_utc(), engine }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn acceleration(&self) -> AccelerationMode {
        self.acceleration
    }

    pub fn loaded_at(&self) -> OffsetDateTime {
        self.loaded_at
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    pub(crate) fn engine(&self) -> &dyn LoadedVoice {
        self.engine.as_ref()
    }
}

impl fmt::Debug for VoiceModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceModelHandle")
            .field("model_path", &self.model_path)
            .field("config_path", &self.config_path)
            .field("acceleration", &self.acceleration)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}
