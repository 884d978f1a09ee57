//! Conversion of CLI arguments into the service configuration

use crate::cli::main_impl::Cli;
use crate::config::ServiceConfig;
use crate::error::Result;

/// Layers CLI overrides on top of the environment configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the service configuration from the process environment and `cli`
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServiceConfig> {
        Self::apply(ServiceConfig::from_env()?, cli)
    }

    /// Apply the CLI overrides to `config` and re-validate
    pub(crate) fn apply(mut config: ServiceConfig, cli: &Cli) -> Result<ServiceConfig> {
        if let Some(host) = &cli.host {
            config.host.clone_from(host);
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(provider) = cli.execution_provider {
            config.runtime.execution_provider = provider;
        }
        if cli.preload_sam {
            config.segmentation.preload = true;
        }
        config.validate()?;
        Ok(config)
    }
}
