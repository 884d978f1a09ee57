//! Server bootstrap: optional model preload, bind and serve

use crate::{
    models::display_path,
    server::{routes::build_router, state::AppState},
};
use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serve `state` until Ctrl-C
///
/// With `SAM_PRELOAD` set the predictor is loaded before binding, and any
/// load failure aborts startup.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let config = Arc::clone(&state.config);
    let checkpoint = &config.segmentation.checkpoint;

    if config.segmentation.preload {
        info!(
            model_type = %config.segmentation.model_type,
            checkpoint = %display_path(checkpoint).display(),
            "Preloading SAM predictor"
        );
        let segmentation = Arc::clone(&state.segmentation);
        tokio::task::spawn_blocking(move || segmentation.preload())
            .await
            .context("SAM preload task failed")?
            .context("Failed to preload SAM predictor")?;
    } else if !checkpoint.is_file() {
        warn!(
            checkpoint = %display_path(checkpoint).display(),
            "SAM checkpoint not found; /sam_mask will answer 503"
        );
    }

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        addr = %listener.local_addr().context("Listener has no local address")?,
        max_upload_bytes = config.max_upload_bytes,
        provider = %config.runtime.execution_provider,
        "ClearCut API listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    info!("ClearCut API stopped");
    Ok(())
}

/// Serve with the ONNX Runtime pipelines
#[cfg(feature = "onnx")]
pub async fn run(config: crate::config::ServiceConfig) -> anyhow::Result<()> {
    serve(AppState::with_onnx(config)).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
