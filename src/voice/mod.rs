//! Voice model lifecycle and synthesis orchestration.

mod error;
mod model;
mod service;
mod settings;
mod status;
#[cfg(test)]
mod testing;
mod ticket;

pub use error::VoiceError;
pub use model::{AccelerationMode, VoiceModelHandle, default_config_path};
pub use service::{ServiceOptions, VoiceService};
pub use settings::SynthesisConfig;
pub use status::StatusReport;
