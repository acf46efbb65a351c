//! Text-to-speech engines.
//!
//! Provides the engine seam used by the voice service and its implementations:
//! - `piper` - drives the Piper command-line synthesizer (default)
//! - `sherpa` - in-process VITS inference via sherpa-rs (feature `sherpa`)

pub mod dsp;
mod engine;
mod piper;
#[cfg(feature = "sherpa")]
mod sherpa;
pub mod voice_config;

pub use engine::{AudioSink, EngineError, LoadRequest, LoadedVoice, SynthesisEngine};
pub use piper::PiperEngine;
#[cfg(feature = "sherpa")]
pub use sherpa::SherpaEngine;
