//! Piper voice model metadata (`<model>.onnx.json`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::engine::EngineError;
use crate::voice::SynthesisConfig;

/// Piper's default generator noise.
pub const DEFAULT_NOISE_SCALE: f32 = 0.667;
/// Piper's default phoneme width noise.
pub const DEFAULT_NOISE_W: f32 = 0.8;
/// Sample rate assumed when the config does not declare one.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

#[derive(Debug, Clone, Deserialize)]
pub struct PiperVoiceConfig {
    #[serde(default)]
    pub audio: AudioSection,
    #[serde(default)]
    pub inference: InferenceSection,
    #[serde(default = "one")]
    pub num_speakers: u32,
    #[serde(default)]
    speaker_id_map: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSection {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self { sample_rate: DEFAULT_SAMPLE_RATE }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceSection {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self { noise_scale: DEFAULT_NOISE_SCALE, length_scale: 1.0, noise_w: DEFAULT_NOISE_W }
    }
}

/// Noise and duration values for one synthesis call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveParams {
    pub length_scale: f32,
    pub noise_scale: f32,
    pub noise_w: f32,
}

impl PiperVoiceConfig {
    /// Read and parse a Piper voice config file.
    ///
    /// # Errors
    /// Returns `EngineError::Config` if the file is missing or malformed.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let raw = fs::read_to_string(path).map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&raw).map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Reject speaker ids the model does not have.
    pub fn check_speaker(&self, speaker: Option<i64>) -> Result<(), EngineError> {
        match speaker {
            Some(id) if id < 0 || id >= i64::from(self.num_speakers) => Err(EngineError::InvalidSpeaker { speaker: id, available: self.num_speakers }),
            _ => Ok(()),
        }
    }

    /// Named speakers ordered by id. Empty for single-speaker voices.
    pub fn speaker_names(&self) -> Vec<&str> {
        let mut named: Vec<_> = self.speaker_id_map.iter().collect();
        named.sort_by_key(|(name, id)| (**id, name.as_str()));
        named.into_iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Combine request settings with the model's inference defaults.
    ///
    /// `length_scale` always comes from the request; it is a multiplier the
    /// caller owns, applied on top of the model's own scale.
    pub fn effective_params(&self, config: &SynthesisConfig) -> EffectiveParams {
        EffectiveParams {
            length_scale: self.inference.length_scale * config.length_scale,
            noise_scale: config.noise_scale.unwrap_or(self.inference.noise_scale),
            noise_w: config.noise_w_scale.unwrap_or(self.inference.noise_w),
        }
    }
}

fn one() -> u32 {
    1
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_noise_scale() -> f32 {
    DEFAULT_NOISE_SCALE
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    DEFAULT_NOISE_W
}
