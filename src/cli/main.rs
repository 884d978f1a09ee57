//! ClearCut API server entry point
//!
//! Parses command-line overrides on top of the environment configuration,
//! sets up tracing and runs the HTTP server.

use super::config::CliConfigBuilder;
use crate::{
    config::ExecutionProvider,
    tracing_config::{TracingConfig, TracingFormat},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

/// Background removal and prompted segmentation HTTP service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "clearcut-api")]
pub struct Cli {
    /// Interface to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Execution provider (auto, cpu, cuda, coreml; `onnx:` prefix accepted)
    #[arg(short, long, env = "EXECUTION_PROVIDER")]
    pub execution_provider: Option<ExecutionProvider>,

    /// Load the SAM predictor before accepting requests
    #[arg(long)]
    pub preload_sam: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format (console, compact, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "console")]
    pub log_format: TracingFormat,

    /// Explicit tracing filter, overrides --verbose and RUST_LOG
    #[arg(long, env = "LOG_FILTER")]
    pub log_filter: Option<String>,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut tracing = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format);
    if let Some(filter) = &cli.log_filter {
        tracing = tracing.with_env_filter(filter);
    }
    tracing.init().context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        sam_model = %config.segmentation.model_type,
        removal_model = %config.removal.model_path.display(),
        "Starting ClearCut API"
    );

    #[cfg(feature = "onnx")]
    {
        crate::server::run(config).await
    }
    #[cfg(not(feature = "onnx"))]
    {
        let _ = config;
        anyhow::bail!("clearcut-api was built without the `onnx` feature; no model backend available")
    }
}

fn show_provider_diagnostics() {
    println!("Execution Provider Diagnostics");
    println!("------------------------------");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected\n");

    for provider_info in ExecutionProviderManager::list_all_providers() {
        let status = if provider_info.available {
            "available"
        } else {
            "not available"
        };
        println!(
            "  {:<8} {:<14} {}",
            provider_info.name, status, provider_info.description
        );
    }

    println!("\nUsage:");
    println!("  --execution-provider auto     # CUDA, then CoreML, then CPU (default)");
    println!("  --execution-provider cuda     # NVIDIA CUDA, CPU fallback when unavailable");
    println!("  --execution-provider coreml   # Apple CoreML, CPU fallback when unavailable");
    println!("  --execution-provider cpu      # Force CPU execution");
}
