//! Voice Service - text-to-speech over HTTP for Piper voice models.
//!
//! The [`voice::VoiceService`] owns the active voice model and synthesis
//! configuration and writes each synthesis to a uniquely named WAV file in
//! the [`artifact::ArtifactStore`]. Models are loaded through a
//! [`tts::SynthesisEngine`]: the external `piper` executable by default, or
//! sherpa-onnx in-process with the `sherpa` feature.

pub mod artifact;
pub mod config;
pub mod http;
pub mod tts;
pub mod voice;
