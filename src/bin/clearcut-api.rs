//! ClearCut API server
//!
//! HTTP service for background removal and prompted segmentation on
//! ONNX Runtime models.

#[cfg(feature = "cli")]
use clearcut::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `.env` is optional; values already in the environment win
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(anyhow::Error::new(e).context("Failed to load .env"));
        }
    }
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
