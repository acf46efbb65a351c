//! Engine that drives the `piper` command-line synthesizer.
//!
//! Each synthesis spawns one `piper --output_raw` process, feeds the text on
//! stdin and reads 16-bit PCM back from stdout. Loading a model only parses
//! and validates its JSON config, so any number of models can coexist.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::dsp::{pcm16_to_f32, shape_samples};
use super::engine::{AudioSink, EngineError, LoadRequest, LoadedVoice, SynthesisEngine};
use super::voice_config::PiperVoiceConfig;
use crate::voice::{AccelerationMode, SynthesisConfig};

/// Engine backed by an external `piper` executable.
#[derive(Debug, Clone)]
pub struct PiperEngine {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl PiperEngine {
    /// Create an engine that runs `program` with `extra_args` placed before
    /// the per-request arguments.
    pub fn new(program: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self { program: program.into(), extra_args }
    }
}

impl SynthesisEngine for PiperEngine {
    fn name(&self) -> &'static str {
        "piper"
    }

    fn load_model(&self, request: &LoadRequest) -> Result<Arc<dyn LoadedVoice>, EngineError> {
        let voice = PiperVoiceConfig::from_file(&request.config_path)?;
        if voice.num_speakers == 0 {
            return Err(EngineError::Config("num_speakers must be at least 1".to_string()));
        }

        info!(
            "Piper voice: {} Hz, {} speaker(s), {} acceleration",
            voice.audio.sample_rate, voice.num_speakers, request.acceleration
        );
        let speakers = voice.speaker_names();
        if !speakers.is_empty() {
            debug!("Speakers: {}", speakers.join(", "));
        }

        Ok(Arc::new(PiperVoice {
            program: self.program.clone(),
            extra_args: self.extra_args.clone(),
            model_path: request.model_path.clone(),
            config_path: request.config_path.clone(),
            acceleration: request.acceleration,
            voice,
        }))
    }
}

/// A model resolved for the piper executable.
struct PiperVoice {
    program: PathBuf,
    extra_args: Vec<String>,
    model_path: PathBuf,
    config_path: PathBuf,
    acceleration: AccelerationMode,
    voice: PiperVoiceConfig,
}

impl PiperVoice {
    fn command(&self, config: &SynthesisConfig) -> Command {
        let params = self.voice.effective_params(config);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args)
            .arg("--model")
            .arg(&self.model_path)
            .arg("--config")
            .arg(&self.config_path)
            .arg("--output_raw")
            .arg("--length_scale")
            .arg(params.length_scale.to_string())
            .arg("--noise_scale")
            .arg(params.noise_scale.to_string())
            .arg("--noise_w")
            .arg(params.noise_w.to_string());

        if let Some(speaker) = config.speaker_id {
            cmd.arg("--speaker").arg(speaker.to_string());
        }
        if self.acceleration == AccelerationMode::Gpu {
            cmd.arg("--cuda");
        }

        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

impl LoadedVoice for PiperVoice {
    fn sample_rate(&self) -> u32 {
        self.voice.audio.sample_rate
    }

    fn synthesize(&self, text: &str, config: &SynthesisConfig, sink: &mut dyn AudioSink) -> Result<(), EngineError> {
        self.voice.check_speaker(config.speaker_id)?;

        let start = Instant::now();
        let mut cmd = self.command(config);
        debug!("Running {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| EngineError::Process(format!("failed to launch {}: {}", self.program.display(), e)))?;

        // Feed stdin from its own thread so a long text cannot deadlock against a full stdout pipe
        let writer = child.stdin.take().map(|mut stdin| {
            let mut input = text.as_bytes().to_vec();
            input.push(b'\n');
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let output = child.wait_with_output()?;
        let write_result = writer.map(|handle| handle.join());

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("piper failed; program={} code={:?} stderr={}", self.program.display(), output.status.code(), stderr);
            return Err(EngineError::Process(format!("{} exited with code {:?}: {}", self.program.display(), output.status.code(), stderr)));
        }

        match write_result {
            Some(Ok(Err(e))) => return Err(EngineError::Io(e)),
            Some(Err(_)) => return Err(EngineError::Process("stdin writer panicked".to_string())),
            _ => {}
        }

        let mut samples = pcm16_to_f32(&output.stdout);
        shape_samples(&mut samples, config);
        sink.write_samples(&samples)?;

        debug!("piper produced {} samples in {:.2}s", samples.len(), start.elapsed().as_secs_f32());
        Ok(())
    }
}
