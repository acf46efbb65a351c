//! Synthesis configuration.

use serde::{Deserialize, Serialize};

use super::VoiceError;

/// Tunable generation parameters, independent of any loaded model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SynthesisConfig {
    /// Speaker index (multi-speaker voices only)
    pub speaker_id: Option<i64>,
    /// Phoneme length scale (< 1 is faster, > 1 is slower)
    pub length_scale: f32,
    /// Generator noise (`None` = model default)
    pub noise_scale: Option<f32>,
    /// Phoneme width noise (`None` = model default)
    pub noise_w_scale: Option<f32>,
    /// Scale samples to fit the full range
    pub normalize_audio: bool,
    /// Sample multiplier (< 1 is quieter, > 1 is louder)
    pub volume: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self { speaker_id: None, length_scale: 1.0, noise_scale: None, noise_w_scale: None, normalize_audio: true, volume: 1.0 }
    }
}

impl SynthesisConfig {
    /// Validate numeric ranges.
    ///
    /// Speaker ids are only checked by the engine that knows the model.
    pub fn validate(&self) -> Result<(), VoiceError> {
        if !(self.length_scale.is_finite() && self.length_scale > 0.0) {
            return Err(VoiceError::InvalidConfiguration(format!("lengthScale must be positive, got {}", self.length_scale)));
        }
        if !(self.volume.is_finite() && self.volume > 0.0) {
            return Err(VoiceError::InvalidConfiguration(format!("volume must be positive, got {}", self.volume)));
        }
        for (name, value) in [("noiseScale", self.noise_scale), ("noiseWScale", self.noise_w_scale)] {
            if let Some(v) = value
                && !(v.is_finite() && v >= 0.0)
            {
                return Err(VoiceError::InvalidConfiguration(format!("{name} must be non-negative, got {v}")));
            }
        }
        Ok(())
    }
}
