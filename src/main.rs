//! Voice Service - an HTTP text-to-speech server for Piper voice models.
//!
//! Loads a voice model on request, synthesizes text into WAV files and
//! serves them for download.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use voice_service::artifact::ArtifactStore;
use voice_service::config::{AppConfig, EngineKind, ModelCatalog};
use voice_service::http::{self, AppState};
use voice_service::tts::{PiperEngine, SynthesisEngine};
use voice_service::voice::{ServiceOptions, VoiceService};

/// Build the synthesis engine selected on the command line.
fn build_engine(config: &AppConfig) -> Result<Arc<dyn SynthesisEngine>> {
    match config.engine {
        EngineKind::Piper => Ok(Arc::new(PiperEngine::new(config.piper_bin.clone(), config.piper_args.clone()))),
        #[cfg(feature = "sherpa")]
        EngineKind::Sherpa => Ok(Arc::new(voice_service::tts::SherpaEngine::new(config.num_threads, config.verbose))),
        #[cfg(not(feature = "sherpa"))]
        EngineKind::Sherpa => anyhow::bail!("the sherpa engine requires building with --features sherpa"),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown(shutdown: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
    }

    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if config.verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🎤 Voice Service v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }
    config.log_config();

    let engine = build_engine(&config)?;
    let store = Arc::new(ArtifactStore::new(&config.output_dir)?);
    let options = ServiceOptions { reject_empty_input: config.reject_empty_text, use_gpu: config.effective_use_gpu() };
    let service = Arc::new(VoiceService::new(engine, store, options));

    let catalog = ModelCatalog::new(&config.model_dir);
    info!("📂 {} voice model(s) available in {}", catalog.count(), catalog.dir().display());

    if let Some(model) = config.model.clone() {
        match service.load_voice_within(model, None, config.load_timeout()).await {
            Ok(handle) => info!("🔊 Startup voice ready: {}", handle.model_path().display()),
            Err(e) => warn!("⚠️  Startup voice failed to load, continuing without one: {}", e),
        }
    }

    let listener = TcpListener::bind(config.bind_address()).await.with_context(|| format!("failed to bind {}", config.bind_address()))?;
    let state = AppState {
        service,
        catalog,
        load_timeout: config.load_timeout(),
        synthesis_timeout: config.synthesis_timeout(),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    http::serve(listener, state, shutdown).await?;

    info!("✅ Voice service stopped");
    Ok(())
}
