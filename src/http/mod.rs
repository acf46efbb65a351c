//! HTTP API in front of the voice service.

mod routes;
mod types;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use routes::{AppState, router};
pub use types::{ApiError, GenerateRequest, GenerateResponse, LoadModelRequest, LoadModelResponse, SuccessResponse};

/// Serve the API on `listener` until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("HTTP API listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")?;

    info!("HTTP API stopped");
    Ok(())
}
