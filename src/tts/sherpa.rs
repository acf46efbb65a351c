//! In-process Piper/VITS engine using sherpa-rs.
//!
//! Expects the sherpa-onnx layout for Piper voices: the model file, its
//! `<model>.onnx.json`, `tokens.txt` and an `espeak-ng-data/` directory side
//! by side.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use sherpa_rs::OnnxConfig;
use sherpa_rs::tts::{VitsTts, VitsTtsConfig};
use tracing::{debug, info, warn};

use super::dsp::shape_samples;
use super::engine::{AudioSink, EngineError, LoadRequest, LoadedVoice, SynthesisEngine};
use super::voice_config::PiperVoiceConfig;
use crate::voice::{AccelerationMode, SynthesisConfig};

/// Engine running VITS models inside the process.
pub struct SherpaEngine {
    num_threads: usize, // 0 = auto-detect
    debug: bool,
}

impl SherpaEngine {
    /// Create a new sherpa engine.
    ///
    /// # Arguments
    /// * `num_threads` - ONNX threads per model (0 = auto-detect)
    /// * `debug` - Enable sherpa-onnx debug output
    pub fn new(num_threads: usize, debug: bool) -> Self {
        Self { num_threads, debug }
    }

    /// Thread count for a model loaded with `acceleration`.
    ///
    /// With GPU acceleration one thread is used because the device handles
    /// parallelism internally; on CPU cores/3 leaves headroom for concurrent requests.
    fn effective_threads(&self, acceleration: AccelerationMode) -> i32 {
        let threads = match (self.num_threads, acceleration) {
            (0, AccelerationMode::Gpu) => 1,
            (0, AccelerationMode::Cpu) => (num_cpus::get() / 3).max(1),
            (n, _) => n,
        };
        threads.try_into().unwrap_or(2)
    }
}

/// Convert to sherpa-rs provider string.
fn sherpa_provider(acceleration: AccelerationMode) -> &'static str {
    match acceleration {
        AccelerationMode::Cpu => "cpu",
        AccelerationMode::Gpu if cfg!(target_os = "macos") => "coreml",
        AccelerationMode::Gpu => "cuda",
    }
}

fn sibling(model_path: &Path, name: &str) -> Result<String, EngineError> {
    let path = model_path.parent().unwrap_or_else(|| Path::new(".")).join(name);
    if !path.exists() {
        return Err(EngineError::Model(format!("required file not found: {}", path.display())));
    }
    Ok(path.to_string_lossy().to_string())
}

impl SynthesisEngine for SherpaEngine {
    fn name(&self) -> &'static str {
        "sherpa"
    }

    fn load_model(&self, request: &LoadRequest) -> Result<Arc<dyn LoadedVoice>, EngineError> {
        let voice = PiperVoiceConfig::from_file(&request.config_path)?;
        let provider = sherpa_provider(request.acceleration);

        info!("Initializing VITS synthesizer with {} provider", provider);

        let tts_config = VitsTtsConfig {
            model: request.model_path.to_string_lossy().to_string(),
            tokens: sibling(&request.model_path, "tokens.txt")?,
            data_dir: sibling(&request.model_path, "espeak-ng-data")?,
            length_scale: voice.inference.length_scale,
            noise_scale: voice.inference.noise_scale,
            noise_scale_w: voice.inference.noise_w,
            onnx_config: OnnxConfig {
                provider: provider.to_string(),
                num_threads: self.effective_threads(request.acceleration),
                debug: self.debug,
            },
            ..Default::default()
        };

        let tts = VitsTts::new(tts_config);
        info!("TTS sample rate: {} Hz", voice.audio.sample_rate);

        Ok(Arc::new(SherpaVoice { tts: Mutex::new(tts), voice }))
    }
}

struct SherpaVoice {
    tts: Mutex<VitsTts>, // create() needs exclusive access
    voice: PiperVoiceConfig,
}

impl LoadedVoice for SherpaVoice {
    fn sample_rate(&self) -> u32 {
        self.voice.audio.sample_rate
    }

    fn synthesize(&self, text: &str, config: &SynthesisConfig, sink: &mut dyn AudioSink) -> Result<(), EngineError> {
        self.voice.check_speaker(config.speaker_id)?;

        if config.noise_scale.is_some() || config.noise_w_scale.is_some() {
            warn!("sherpa engine fixes noise parameters at load time; request noise settings are not applied");
        }

        if text.trim().is_empty() {
            return Ok(());
        }

        debug!("Synthesizing: \"{}\"", text);

        let speaker = config.speaker_id.unwrap_or(0) as i32;
        // speed is the inverse of length_scale
        let speed = 1.0 / config.length_scale;
        let audio = self.tts.lock().create(text, speaker, speed).map_err(|e| EngineError::Model(format!("TTS generation failed: {}", e)))?;

        let mut samples = audio.samples;
        shape_samples(&mut samples, config);
        sink.write_samples(&samples)?;
        Ok(())
    }
}
