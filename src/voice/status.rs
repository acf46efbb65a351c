use serde::Serialize;

/// Snapshot reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub voice_loaded: bool,
    /// Active model path, empty when no voice is loaded
    pub model_path: String,
    pub models_available: usize,
    /// Acceleration preference for the next load
    pub cuda_enabled: bool,
}
