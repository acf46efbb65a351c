//! Sample post-processing shared by the engines.

use crate::voice::SynthesisConfig;

/// Peak level targeted by normalization (leaves a little headroom).
const NORMALIZE_PEAK: f32 = 0.95;

/// Apply normalization and volume from `config` in place.
///
/// Normalization scales the chunk so its peak reaches `NORMALIZE_PEAK`; silent
/// chunks are left untouched. Volume is applied afterwards and the result is
/// clamped to [-1.0, 1.0].
pub fn shape_samples(samples: &mut [f32], config: &SynthesisConfig) {
    let mut gain = config.volume;

    if config.normalize_audio {
        let peak = samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        if peak > f32::EPSILON {
            gain *= NORMALIZE_PEAK / peak;
        }
    }

    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }

    for sample in samples.iter_mut() {
        *sample = (*sample * gain).clamp(-1.0, 1.0);
    }
}

/// Decode raw little-endian 16-bit PCM into f32 samples.
///
/// A trailing odd byte is ignored.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(2).map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0).collect()
}
