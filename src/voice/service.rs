//! The voice service: owns the active model and configuration and turns text
//! into audio artifacts.
//!
//! Shared state lives behind a short-lived `RwLock`. Engine calls never run
//! while it is held: a slow load does not block synthesis against the
//! previous model, and a slow synthesis does not block loads or
//! configuration updates.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::model::{AccelerationMode, VoiceModelHandle, default_config_path};
use super::settings::SynthesisConfig;
use super::status::StatusReport;
use super::ticket::Ticket;
use super::VoiceError;
use crate::artifact::{ArtifactStore, SynthesisArtifact};
use crate::tts::{EngineError, LoadRequest, SynthesisEngine};

/// Characters of input text shown in logs.
const LOG_PREVIEW_CHARS: usize = 50;

/// Behaviour switches for [`VoiceService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceOptions {
    /// Fail fast with `EmptyInput` instead of forwarding blank text to the engine
    pub reject_empty_input: bool,
    /// Initial acceleration preference
    pub use_gpu: bool,
}

struct ServiceState {
    current: Option<Arc<VoiceModelHandle>>, // Active model, empty until the first load
    config: Arc<SynthesisConfig>,           // Captured by each synthesis at start
    use_gpu: bool,                          // Applies to the next load only
}

/// Orchestrates model loading and synthesis for concurrent callers.
pub struct VoiceService {
    engine: Arc<dyn SynthesisEngine>,
    store: Arc<ArtifactStore>,
    state: RwLock<ServiceState>,
    /// Serializes loads with each other
    load_gate: Mutex<()>,
    /// Held shared by synthesis and exclusively by load when the engine
    /// cannot keep two models loaded
    drain: RwLock<()>,
    reject_empty_input: bool,
}

impl VoiceService {
    pub fn new(engine: Arc<dyn SynthesisEngine>, store: Arc<ArtifactStore>, options: ServiceOptions) -> Self {
        info!("Voice service using {} engine, artifacts in {}", engine.name(), store.dir().display());
        Self {
            engine,
            store,
            state: RwLock::new(ServiceState { current: None, config: Arc::new(SynthesisConfig::default()), use_gpu: options.use_gpu }),
            load_gate: Mutex::new(()),
            drain: RwLock::new(()),
            reject_empty_input: options.reject_empty_input,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.store
    }

    /// Set whether the next load should use GPU acceleration.
    ///
    /// Never affects a model that is already loaded.
    pub fn set_acceleration_preference(&self, use_gpu: bool) {
        self.state.write().use_gpu = use_gpu;
        debug!("Acceleration preference set to {}", AccelerationMode::from_preference(use_gpu));
    }

    /// Replace the configuration used by synthesis calls that start from now on.
    pub fn set_configuration(&self, config: SynthesisConfig) {
        debug!("Synthesis configuration updated: {:?}", config);
        self.state.write().config = Arc::new(config);
    }

    pub fn configuration(&self) -> Arc<SynthesisConfig> {
        self.state.read().config.clone()
    }

    pub fn is_voice_loaded(&self) -> bool {
        self.state.read().current.is_some()
    }

    pub fn current_model_path(&self) -> Option<String> {
        self.state.read().current.as_ref().map(|h| h.model_path().to_string_lossy().to_string())
    }

    pub fn current_voice(&self) -> Option<Arc<VoiceModelHandle>> {
        self.state.read().current.clone()
    }

    /// Aggregate the status report; `models_available` comes from the model catalog.
    pub fn status(&self, models_available: usize) -> StatusReport {
        let state = self.state.read();
        StatusReport {
            voice_loaded: state.current.is_some(),
            model_path: state.current.as_ref().map(|h| h.model_path().to_string_lossy().to_string()).unwrap_or_default(),
            models_available,
            cuda_enabled: state.use_gpu,
        }
    }

    /// Load a voice model and make it current.
    ///
    /// # Arguments
    /// * `model_path` - Path to the `.onnx` voice model
    /// * `config_path` - Model config, defaults to `<model_path>.json`
    ///
    /// # Errors
    /// `ModelNotFound` if the model file does not exist, `EngineLoadFailed` if
    /// the engine rejects it. The current model is untouched on failure.
    pub fn load_voice(&self, model_path: impl AsRef<Path>, config_path: Option<&Path>) -> Result<Arc<VoiceModelHandle>, VoiceError> {
        self.load_voice_inner(model_path.as_ref().to_path_buf(), config_path.map(Path::to_path_buf), None)
    }

    /// [`load_voice`](Self::load_voice) bounded by `timeout`.
    ///
    /// A load that finishes after the deadline is discarded.
    pub async fn load_voice_within(
        self: &Arc<Self>,
        model_path: PathBuf,
        config_path: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Arc<VoiceModelHandle>, VoiceError> {
        let ticket = Arc::new(Ticket::new(timeout));
        let service = Arc::clone(self);
        let task_ticket = Arc::clone(&ticket);
        let path = model_path.clone();

        let task = tokio::task::spawn_blocking(move || service.load_voice_inner(model_path, config_path, Some(&task_ticket)));

        await_within(task, &ticket, move |e| VoiceError::EngineLoadFailed { path, source: EngineError::Model(format!("load task failed: {}", e)) }).await
    }

    /// Synthesize `text` into a new WAV artifact.
    ///
    /// The current model and configuration are captured at the start; loads
    /// and configuration changes made while the engine runs do not affect it.
    ///
    /// # Errors
    /// `NoVoiceLoaded`, `EmptyInput` (strict mode only), `EngineSynthesisFailed`
    /// or `ArtifactWriteFailed`. No partial file is left behind on failure.
    pub fn synthesize(&self, text: &str) -> Result<SynthesisArtifact, VoiceError> {
        self.synthesize_inner(text, None)
    }

    /// [`synthesize`](Self::synthesize) bounded by `timeout`.
    ///
    /// Audio that finishes after the deadline is discarded, never published.
    pub async fn synthesize_within(self: &Arc<Self>, text: String, timeout: Duration) -> Result<SynthesisArtifact, VoiceError> {
        let ticket = Arc::new(Ticket::new(timeout));
        let service = Arc::clone(self);
        let task_ticket = Arc::clone(&ticket);

        let task = tokio::task::spawn_blocking(move || service.synthesize_inner(&text, Some(&task_ticket)));

        await_within(task, &ticket, |e| VoiceError::EngineSynthesisFailed(EngineError::Model(format!("synthesis task failed: {}", e)))).await
    }

    fn load_voice_inner(&self, model_path: PathBuf, config_path: Option<PathBuf>, ticket: Option<&Ticket>) -> Result<Arc<VoiceModelHandle>, VoiceError> {
        if !model_path.is_file() {
            warn!("Model file not found: {}", model_path.display());
            return Err(VoiceError::ModelNotFound(model_path));
        }
        let config_path = config_path.unwrap_or_else(|| default_config_path(&model_path));

        let _gate = self.load_gate.lock();
        // Exclusive engines: wait for in-flight synthesis and keep new ones out until committed
        let _drained = (!self.engine.supports_concurrent_models()).then(|| self.drain.write());

        let acceleration = AccelerationMode::from_preference(self.state.read().use_gpu);
        info!("Loading voice {} ({} acceleration)...", model_path.display(), acceleration);

        let start = Instant::now();
        let request = LoadRequest { model_path, config_path, acceleration };
        let voice = match self.engine.load_model(&request) {
            Ok(voice) => voice,
            Err(source) => {
                error!("Failed to load voice model {}: {}", request.model_path.display(), source);
                return Err(VoiceError::EngineLoadFailed { path: request.model_path, source });
            }
        };

        let LoadRequest { model_path, config_path, acceleration } = request;
        let handle = Arc::new(VoiceModelHandle::new(model_path, config_path, acceleration, voice));

        {
            let mut state = self.state.write();
            if let Some(ticket) = ticket
                && !ticket.commit()
            {
                warn!("Voice {} loaded after its deadline, discarding", handle.model_path().display());
                return Err(VoiceError::Timeout(ticket.timeout()));
            }
            if let Some(previous) = state.current.replace(Arc::clone(&handle)) {
                debug!("Superseded voice {}", previous.model_path().display());
            }
        }

        info!("Voice loaded in {:.2}s: {}", start.elapsed().as_secs_f32(), handle.model_path().display());
        Ok(handle)
    }

    fn synthesize_inner(&self, text: &str, ticket: Option<&Ticket>) -> Result<SynthesisArtifact, VoiceError> {
        let _in_flight = (!self.engine.supports_concurrent_models()).then(|| self.drain.read());

        let (voice, config) = {
            let state = self.state.read();
            let voice = state.current.clone().ok_or(VoiceError::NoVoiceLoaded)?;
            (voice, state.config.clone())
        };

        if self.reject_empty_input && text.trim().is_empty() {
            return Err(VoiceError::EmptyInput);
        }

        info!("Synthesizing text: '{}'", preview(text));
        let start = Instant::now();

        let path = self.store.reserve()?;
        let mut pending = self.store.begin(&path, voice.sample_rate())?;

        if let Err(e) = voice.engine().synthesize(text, &config, &mut pending) {
            // Dropping `pending` removes the partial file
            if let Some(write_error) = pending.write_error() {
                error!("Failed to write audio for {}: {}", pending.target().display(), write_error);
                return Err(VoiceError::ArtifactWriteFailed(write_error.to_string()));
            }
            error!("Failed to synthesize voice: {}", e);
            return Err(VoiceError::EngineSynthesisFailed(e));
        }

        if let Some(ticket) = ticket
            && !ticket.commit()
        {
            warn!("Synthesis for {} finished after its deadline, discarding", path.display());
            return Err(VoiceError::Timeout(ticket.timeout()));
        }

        let artifact = pending.commit()?;
        info!(
            "Synthesis completed in {:.2}s: {} ({} bytes)",
            start.elapsed().as_secs_f32(),
            artifact.filename,
            artifact.size_bytes
        );
        Ok(artifact)
    }
}

/// Wait for a blocking task until the ticket's deadline.
///
/// If the task already committed when the deadline passes, its real result
/// is awaited and returned instead of `Timeout`.
async fn await_within<T>(
    mut task: JoinHandle<Result<T, VoiceError>>,
    ticket: &Ticket,
    on_join_error: impl FnOnce(JoinError) -> VoiceError,
) -> Result<T, VoiceError> {
    let joined = match tokio::time::timeout(ticket.timeout(), &mut task).await {
        Ok(joined) => joined,
        Err(_) if ticket.abandon() => {
            warn!("Operation exceeded its {:?} deadline", ticket.timeout());
            return Err(VoiceError::Timeout(ticket.timeout()));
        }
        Err(_) => task.await,
    };
    joined.map_err(on_join_error)?
}

fn preview(text: &str) -> String {
    let mut shown: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
    if text.chars().count() > LOG_PREVIEW_CHARS {
        shown.push_str("...");
    }
    shown
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::Ordering;
    use std::thread;

    use super::*;
    use crate::voice::testing::{StubEngine, write_model};

    fn service_with(engine: StubEngine, options: ServiceOptions) -> (tempfile::TempDir, Arc<StubEngine>, Arc<VoiceService>) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path().join("audio")).unwrap());
        let engine = Arc::new(engine);
        let service = Arc::new(VoiceService::new(engine.clone(), store, options));
        (dir, engine, service)
    }

    fn service() -> (tempfile::TempDir, Arc<StubEngine>, Arc<VoiceService>) {
        service_with(StubEngine::new(), ServiceOptions::default())
    }

    fn artifact_files(service: &VoiceService) -> Vec<PathBuf> {
        fs::read_dir(service.artifacts().dir()).unwrap().map(|e| e.unwrap().path()).collect()
    }

    fn sample_rate_of(path: &Path) -> u32 {
        hound::WavReader::open(path).unwrap().spec().sample_rate
    }

    #[test]
    fn test_synthesize_before_load_writes_nothing() {
        let (_dir, engine, service) = service();

        assert!(matches!(service.synthesize("hello"), Err(VoiceError::NoVoiceLoaded)));
        assert!(artifact_files(&service).is_empty());
        assert_eq!(engine.synth_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_model_scenario() {
        let (dir, _engine, service) = service();
        let model = write_model(dir.path(), "models/default.onnx");

        service.load_voice(&model, None).unwrap();
        assert!(service.is_voice_loaded());
        assert_eq!(service.current_model_path(), Some(model.to_string_lossy().to_string()));

        let artifact = service.synthesize("hello").unwrap();
        assert!(artifact.path.exists());
        assert!(artifact.size_bytes > 0);
        assert_eq!(artifact.path.parent().unwrap(), service.artifacts().dir());

        // Lenient mode forwards empty text and produces a silent artifact
        let silent = service.synthesize("").unwrap();
        assert!(silent.path.exists());
        assert_ne!(silent.filename, artifact.filename);
    }

    #[test]
    fn test_strict_mode_rejects_empty_text() {
        let (dir, engine, service) = service_with(StubEngine::new(), ServiceOptions { reject_empty_input: true, use_gpu: false });
        let model = write_model(dir.path(), "models/default.onnx");
        service.load_voice(&model, None).unwrap();

        assert!(matches!(service.synthesize(""), Err(VoiceError::EmptyInput)));
        assert!(matches!(service.synthesize("  \n"), Err(VoiceError::EmptyInput)));
        assert_eq!(engine.synth_calls.load(Ordering::SeqCst), 0);
        assert!(service.synthesize("hello").is_ok());
    }

    #[test]
    fn test_config_path_defaults_by_convention() {
        let (dir, engine, service) = service();
        let model = write_model(dir.path(), "voice.onnx");

        let handle = service.load_voice(&model, None).unwrap();
        assert_eq!(handle.config_path(), dir.path().join("voice.onnx.json"));

        let custom = dir.path().join("custom.json");
        let handle = service.load_voice(&model, Some(&custom)).unwrap();
        assert_eq!(handle.config_path(), custom);
        assert_eq!(engine.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_model_keeps_prior_state() {
        let (dir, engine, service) = service();

        let err = service.load_voice("does/not/exist.onnx", None).unwrap_err();
        assert!(matches!(err, VoiceError::ModelNotFound(_)));
        assert!(!service.is_voice_loaded());
        assert_eq!(engine.loads.load(Ordering::SeqCst), 0);

        let model = write_model(dir.path(), "a.onnx");
        service.load_voice(&model, None).unwrap();
        let before = service.current_model_path();

        assert!(matches!(service.load_voice("does/not/exist.onnx", None), Err(VoiceError::ModelNotFound(_))));
        assert!(service.is_voice_loaded());
        assert_eq!(service.current_model_path(), before);
    }

    #[test]
    fn test_engine_load_failure_keeps_previous_voice() {
        let (dir, _engine, service) = service();
        let good = write_model(dir.path(), "good.onnx");
        let broken = dir.path().join("broken.onnx");
        fs::write(&broken, b"broken").unwrap();

        service.load_voice(&good, None).unwrap();
        let err = service.load_voice(&broken, None).unwrap_err();
        assert!(matches!(err, VoiceError::EngineLoadFailed { .. }));
        assert!(err.to_string().contains("corrupt model"), "{err}");

        assert_eq!(service.current_model_path(), Some(good.to_string_lossy().to_string()));
        assert!(service.synthesize("still works").is_ok());
    }

    #[test]
    fn test_engine_failure_leaves_no_artifact() {
        let (dir, engine, service) = service();
        service.load_voice(write_model(dir.path(), "a.onnx"), None).unwrap();
        engine.fail_synthesis.store(true, Ordering::SeqCst);

        let err = service.synthesize("hello").unwrap_err();
        assert!(matches!(err, VoiceError::EngineSynthesisFailed(_)));
        assert!(artifact_files(&service).is_empty(), "partial files left behind: {:?}", artifact_files(&service));
    }

    #[test]
    fn test_write_failure_leaves_no_artifact() {
        let (dir, engine, service) = service();
        service.load_voice(write_model(dir.path(), "a.onnx"), None).unwrap();
        service.artifacts().fail_writes();

        let err = service.synthesize(&"x".repeat(1000)).unwrap_err();
        assert!(matches!(err, VoiceError::ArtifactWriteFailed(_)), "{err:?}");
        assert_eq!(engine.synth_calls.load(Ordering::SeqCst), 1);
        assert!(artifact_files(&service).is_empty(), "partial files left behind: {:?}", artifact_files(&service));
    }

    #[test]
    fn test_concurrent_synthesis_produces_distinct_artifacts() {
        let (dir, _engine, service) = service();
        service.load_voice(write_model(dir.path(), "a.onnx"), None).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                thread::spawn(move || service.synthesize("same text").unwrap())
            })
            .collect();
        let artifacts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_ne!(artifacts[0].filename, artifacts[1].filename);
        assert!(artifacts.iter().all(|a| a.path.exists()));
    }

    #[test]
    fn test_configuration_is_captured_per_call() {
        let (dir, engine, service) = service();
        service.load_voice(write_model(dir.path(), "a.onnx"), None).unwrap();

        let config = SynthesisConfig { speaker_id: Some(1), volume: 0.5, ..Default::default() };
        service.set_configuration(config.clone());
        service.synthesize("hello").unwrap();

        assert_eq!(engine.last_config.lock().clone(), Some(config.clone()));
        assert_eq!(*service.configuration(), config);
    }

    #[test]
    fn test_swap_during_synthesis_keeps_captured_voice() {
        let (dir, engine, service) = service();
        let first = write_model(dir.path(), "first.onnx");
        let second = write_model(dir.path(), "second.onnx");
        let first_rate = service.load_voice(&first, None).unwrap().sample_rate();

        let hold = engine.hold.lock();
        let worker = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.synthesize("long sentence").unwrap())
        };
        engine.wait_for_synth_start(1);

        // Load completes while the first synthesis is still running
        let second_rate = service.load_voice(&second, None).unwrap().sample_rate();
        assert_ne!(first_rate, second_rate);
        assert_eq!(service.current_model_path(), Some(second.to_string_lossy().to_string()));
        drop(hold);

        let artifact = worker.join().unwrap();
        assert_eq!(sample_rate_of(&artifact.path), first_rate);

        let next = service.synthesize("next").unwrap();
        assert_eq!(sample_rate_of(&next.path), second_rate);
    }

    #[test]
    fn test_exclusive_engine_load_waits_for_drain() {
        let (dir, engine, service) = service_with(StubEngine::exclusive(), ServiceOptions::default());
        service.load_voice(write_model(dir.path(), "first.onnx"), None).unwrap();
        let second = write_model(dir.path(), "second.onnx");

        let hold = engine.hold.lock();
        let synth = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.synthesize("draining").unwrap())
        };
        engine.wait_for_synth_start(1);

        let loader = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.load_voice(second, None).unwrap())
        };
        thread::sleep(Duration::from_millis(100));
        assert_eq!(engine.loads.load(Ordering::SeqCst), 1, "load must wait for in-flight synthesis");

        drop(hold);
        synth.join().unwrap();
        loader.join().unwrap();
        assert_eq!(engine.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_acceleration_preference_applies_to_next_load() {
        let (dir, engine, service) = service();
        let model = write_model(dir.path(), "a.onnx");
        assert!(!service.status(0).cuda_enabled);

        let cpu = service.load_voice(&model, None).unwrap();
        service.set_acceleration_preference(true);
        assert_eq!(cpu.acceleration(), AccelerationMode::Cpu);
        assert_eq!(service.current_voice().unwrap().acceleration(), AccelerationMode::Cpu);
        assert!(service.status(0).cuda_enabled);

        let gpu = service.load_voice(&model, None).unwrap();
        assert_eq!(gpu.acceleration(), AccelerationMode::Gpu);
        assert_eq!(*engine.last_acceleration.lock(), Some(AccelerationMode::Gpu));
    }

    #[test]
    fn test_status_reflects_state() {
        let (dir, _engine, service) = service();
        let status = service.status(3);
        assert!(!status.voice_loaded);
        assert_eq!(status.model_path, "");
        assert_eq!(status.models_available, 3);

        let model = write_model(dir.path(), "a.onnx");
        service.load_voice(&model, None).unwrap();
        let status = service.status(1);
        assert!(status.voice_loaded);
        assert_eq!(status.model_path, model.to_string_lossy());
    }

    #[tokio::test]
    async fn test_synthesis_deadline_discards_late_audio() {
        let (dir, _engine, service) = service_with(StubEngine::new().with_synth_delay(Duration::from_millis(300)), ServiceOptions::default());
        service.load_voice(write_model(dir.path(), "a.onnx"), None).unwrap();

        let err = service.synthesize_within("slow".to_string(), Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, VoiceError::Timeout(_)));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(artifact_files(&service).is_empty());
    }

    #[tokio::test]
    async fn test_load_deadline_discards_late_model() {
        let (dir, _engine, service) = service_with(StubEngine::new().with_load_delay(Duration::from_millis(300)), ServiceOptions::default());
        let model = write_model(dir.path(), "a.onnx");

        let err = service.load_voice_within(model, None, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, VoiceError::Timeout(_)));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!service.is_voice_loaded());
    }

    #[tokio::test]
    async fn test_operations_within_deadline_succeed() {
        let (dir, _engine, service) = service();
        let model = write_model(dir.path(), "a.onnx");

        service.load_voice_within(model.clone(), None, Duration::from_secs(5)).await.unwrap();
        assert_eq!(service.current_model_path(), Some(model.to_string_lossy().to_string()));

        let artifact = service.synthesize_within("hello".to_string(), Duration::from_secs(5)).await.unwrap();
        assert!(artifact.path.exists());
    }

    #[test]
    fn test_preview_truncates_long_text() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(80);
        assert_eq!(preview(&long).len(), LOG_PREVIEW_CHARS + 3);
    }
}
