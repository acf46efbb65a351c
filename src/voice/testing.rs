//! In-process engine used by the service tests.

use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{AccelerationMode, SynthesisConfig};
use crate::tts::{AudioSink, EngineError, LoadRequest, LoadedVoice, SynthesisEngine};

/// Write a model file the stub accepts and return its path.
pub(crate) fn write_model(dir: &Path, relative: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, b"stub model").unwrap();
    path
}

/// Counters and knobs shared between the engine and the voices it loads.
#[derive(Default)]
pub(crate) struct StubState {
    pub(crate) loads: AtomicUsize,
    pub(crate) synth_calls: AtomicUsize,
    pub(crate) fail_synthesis: AtomicBool,
    /// Synthesis blocks while a test holds this
    pub(crate) hold: Mutex<()>,
    pub(crate) last_config: Mutex<Option<SynthesisConfig>>,
    pub(crate) last_acceleration: Mutex<Option<AccelerationMode>>,
    load_delay: Option<Duration>,
    synth_delay: Option<Duration>,
}

/// Engine that emits ten samples per input byte.
///
/// Each loaded model gets a distinct sample rate so tests can tell which
/// model produced an artifact. Models whose file starts with `broken` fail
/// to load.
pub(crate) struct StubEngine {
    state: Arc<StubState>,
    concurrent: bool,
}

impl StubEngine {
    pub(crate) fn new() -> Self {
        Self { state: Arc::new(StubState::default()), concurrent: true }
    }

    /// Engine that cannot keep two models loaded.
    pub(crate) fn exclusive() -> Self {
        Self { concurrent: false, ..Self::new() }
    }

    pub(crate) fn with_load_delay(self, delay: Duration) -> Self {
        self.configure(|s| s.load_delay = Some(delay))
    }

    pub(crate) fn with_synth_delay(self, delay: Duration) -> Self {
        self.configure(|s| s.synth_delay = Some(delay))
    }

    fn configure(mut self, f: impl FnOnce(&mut StubState)) -> Self {
        let state = Arc::get_mut(&mut self.state).expect("configure before sharing the engine");
        f(state);
        self
    }

    /// Block until `count` synthesis calls have entered the engine.
    pub(crate) fn wait_for_synth_start(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.state.synth_calls.load(Ordering::SeqCst) < count {
            assert!(Instant::now() < deadline, "synthesis never started");
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Deref for StubEngine {
    type Target = StubState;

    fn deref(&self) -> &StubState {
        &self.state
    }
}

impl SynthesisEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn load_model(&self, request: &LoadRequest) -> Result<Arc<dyn LoadedVoice>, EngineError> {
        if let Some(delay) = self.state.load_delay {
            thread::sleep(delay);
        }
        let contents = fs::read(&request.model_path)?;
        if contents.starts_with(b"broken") {
            return Err(EngineError::Model(format!("corrupt model {}", request.model_path.display())));
        }

        let index = self.state.loads.fetch_add(1, Ordering::SeqCst) as u32;
        *self.state.last_acceleration.lock() = Some(request.acceleration);
        Ok(Arc::new(StubVoice { sample_rate: 16000 + index, state: self.state.clone() }))
    }

    fn supports_concurrent_models(&self) -> bool {
        self.concurrent
    }
}

struct StubVoice {
    sample_rate: u32,
    state: Arc<StubState>,
}

impl LoadedVoice for StubVoice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&self, text: &str, config: &SynthesisConfig, sink: &mut dyn AudioSink) -> Result<(), EngineError> {
        *self.state.last_config.lock() = Some(config.clone());
        self.state.synth_calls.fetch_add(1, Ordering::SeqCst);

        drop(self.state.hold.lock());
        if let Some(delay) = self.state.synth_delay {
            thread::sleep(delay);
        }
        if self.state.fail_synthesis.load(Ordering::SeqCst) {
            sink.write_samples(&[0.1; 64])?;
            return Err(EngineError::Model("stub synthesis failure".to_string()));
        }

        sink.write_samples(&vec![0.25_f32; text.len() * 10])?;
        Ok(())
    }
}
