//! Application configuration and CLI argument parsing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use super::models::ModelCatalog;

/// Synthesis backend used to load voice models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum EngineKind {
    /// External `piper` executable, one process per synthesis (default)
    #[default]
    Piper,
    /// In-process sherpa-onnx VITS runtime (requires the `sherpa` feature)
    Sherpa,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Piper => write!(f, "piper"),
            EngineKind::Sherpa => write!(f, "sherpa"),
        }
    }
}

/// Voice service configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "voice-service")]
#[command(author, version, about = "HTTP text-to-speech service for Piper voice models", long_about = None)]
pub struct AppConfig {
    /// List the voice models found in the model directory and exit
    #[arg(long)]
    pub list_models: bool,

    /// Directory containing `.onnx` voice models and their `.onnx.json` configs
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value = "models")]
    pub model_dir: PathBuf,

    /// Directory where synthesized WAV files are written and served from
    #[arg(long, short = 'o', env = "AUDIO_DIR", default_value = "static/audio")]
    pub output_dir: PathBuf,

    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP server to
    #[arg(long, short = 'p', env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Synthesis engine
    #[arg(long, value_enum, default_value = "piper")]
    pub engine: EngineKind,

    /// Path to the piper executable
    #[arg(long, env = "PIPER_BIN", default_value = "piper")]
    pub piper_bin: PathBuf,

    /// Extra argument passed to every piper invocation (repeatable)
    #[arg(long = "piper-arg", allow_hyphen_values = true)]
    pub piper_args: Vec<String>,

    /// Initial GPU preference (auto-detected if not specified)
    #[arg(long)]
    pub use_gpu: Option<bool>,

    /// Number of inference threads for the sherpa engine (0 = auto-detect based on CPU cores)
    #[arg(long, default_value = "0")]
    pub num_threads: usize,

    /// Voice model to load at startup
    #[arg(long, short = 'm')]
    pub model: Option<PathBuf>,

    /// Reject blank text instead of synthesizing silence
    #[arg(long)]
    pub reject_empty_text: bool,

    /// Deadline for loading a voice model, in seconds
    #[arg(long, default_value = "300")]
    pub load_timeout_secs: u64,

    /// Deadline for a single synthesis, in seconds
    #[arg(long, default_value = "120")]
    pub synthesis_timeout_secs: u64,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let config = Self::parse();

        if config.list_models {
            ModelCatalog::new(&config.model_dir).print_models();
            std::process::exit(0);
        }

        config
    }

    /// Effective initial GPU preference.
    pub fn effective_use_gpu(&self) -> bool {
        self.use_gpu.unwrap_or_else(detect_gpu)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.model_dir.exists() {
            warn!("Model directory does not exist: {}", self.model_dir.display());
        }

        if let Some(ref model) = self.model
            && !model.is_file()
        {
            anyhow::bail!("Startup model not found: {}", model.display());
        }

        if self.load_timeout_secs == 0 || self.synthesis_timeout_secs == 0 {
            anyhow::bail!("Timeouts must be positive");
        }

        if self.port == 0 {
            anyhow::bail!("Port must be non-zero");
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Model directory: {}", self.model_dir.display());
        info!("  Output directory: {}", self.output_dir.display());
        info!("  Listen address: {}", self.bind_address());
        info!("  Engine: {}", self.engine);
        if self.engine == EngineKind::Piper {
            info!("  Piper binary: {}", self.piper_bin.display());
            if !self.piper_args.is_empty() {
                info!("  Piper extra args: {:?}", self.piper_args);
            }
        }
        info!("  GPU preference: {}", self.effective_use_gpu());
        if let Some(ref model) = self.model {
            info!("  Startup model: {}", model.display());
        }
        info!("  Reject empty text: {}", self.reject_empty_text);
        info!("  Timeouts: load={}s, synthesis={}s", self.load_timeout_secs, self.synthesis_timeout_secs);
    }
}

/// Auto-detect whether GPU acceleration is worth enabling.
fn detect_gpu() -> bool {
    #[cfg(target_os = "macos")]
    {
        info!("Detected macOS, preferring CoreML acceleration");
        true
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() {
            info!("Detected NVIDIA GPU, preferring CUDA acceleration");
            true
        } else {
            info!("No GPU detected, using CPU");
            false
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        info!("Using CPU");
        false
    }
}

/// Check if an NVIDIA GPU is available (Linux only).
#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    use std::path::Path;

    let nvidia_paths = [
        "/dev/nvidia0",
        "/dev/nvidiactl",
        "/dev/nvidia-uvm",
        // Jetson devices
        "/dev/nvhost-ctrl",
        "/dev/nvhost-ctrl-gpu",
        "/etc/nv_tegra_release",
    ];

    nvidia_paths.iter().any(|path| Path::new(path).exists())
}
