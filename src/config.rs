//! Configuration types for the ClearCut service
//!
//! Configuration is read once at startup (environment variables, optionally
//! seeded from a `.env` file) into an immutable [`ServiceConfig`] that is
//! handed to every component.

use crate::error::{ClearCutError, Result};
use crate::models::SamModelType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default upload ceiling (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    #[serde(rename = "coreml")]
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = ClearCutError;

    fn from_str(s: &str) -> Result<Self> {
        crate::utils::ExecutionProviderManager::parse_provider_string(s)
    }
}

/// Alpha matting parameters applied after the salient-object model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MattingConfig {
    /// Mask values above this are definite foreground
    pub foreground_threshold: u8,
    /// Mask values below this are definite background
    pub background_threshold: u8,
    /// Side of the square structuring element used to erode both trimap regions
    pub erode_size: u32,
}

impl Default for MattingConfig {
    fn default() -> Self {
        Self {
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size: 10,
        }
    }
}

/// Background removal pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// U²-Net family ONNX model
    pub model_path: PathBuf,
    pub matting: MattingConfig,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/u2net.onnx"),
            matting: MattingConfig::default(),
        }
    }
}

/// Prompted segmentation model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    pub model_type: SamModelType,
    /// Image encoder checkpoint
    pub checkpoint: PathBuf,
    /// Prompt decoder checkpoint; derived from the encoder path when unset
    pub decoder_checkpoint: Option<PathBuf>,
    /// Load the predictor during startup instead of on first request
    pub preload: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        let model_type = SamModelType::VitB;
        Self {
            model_type,
            checkpoint: PathBuf::from(format!("./models/{}", model_type.encoder_file_name())),
            decoder_checkpoint: None,
            preload: false,
        }
    }
}

impl SegmentationConfig {
    /// Decoder checkpoint path, falling back to `sam_<type>_decoder.onnx`
    /// next to the encoder checkpoint
    #[must_use]
    pub fn decoder_path(&self) -> PathBuf {
        self.decoder_checkpoint.clone().unwrap_or_else(|| {
            let dir = self.checkpoint.parent().unwrap_or_else(|| Path::new("."));
            dir.join(self.model_type.decoder_file_name())
        })
    }
}

/// ONNX Runtime session settings shared by both model pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    pub execution_provider: ExecutionProvider,
    /// Intra-op threads (0 = let ONNX Runtime decide)
    pub intra_threads: usize,
    /// Inter-op threads (0 = let ONNX Runtime decide)
    pub inter_threads: usize,
}

/// Immutable service configuration built once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Allowed CORS origins; `*` mirrors the request origin
    pub cors_origins: Vec<String>,
    pub removal: RemovalConfig,
    pub segmentation: SegmentationConfig,
    pub runtime: RuntimeConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origins: vec!["http://localhost:3000".to_string()],
            removal: RemovalConfig::default(),
            segmentation: SegmentationConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new configuration builder starting from defaults
    ///
    /// # Examples
    /// ```rust
    /// use clearcut::ServiceConfig;
    ///
    /// let config = ServiceConfig::builder()
    ///     .port(9000)
    ///     .max_upload_bytes(1024)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.port, 9000);
    /// ```
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Read configuration from the process environment
    ///
    /// # Errors
    /// - A variable is set but cannot be parsed
    /// - The resulting configuration fails [`ServiceConfig::validate`]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    ///
    /// Unset or empty variables keep their defaults.
    ///
    /// # Errors
    /// - A variable is set but cannot be parsed
    /// - The resulting configuration fails [`ServiceConfig::validate`]
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut builder = Self::builder();

        if let Some(host) = get("HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = get("PORT") {
            builder = builder.port(parse_var("PORT", &port)?);
        }
        if let Some(max) = get("MAX_UPLOAD_BYTES") {
            builder = builder.max_upload_bytes(parse_var("MAX_UPLOAD_BYTES", &max)?);
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            builder = builder.cors_origins(
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }

        let model_type = match get("SAM_MODEL_TYPE") {
            Some(raw) => raw.parse::<SamModelType>()?,
            None => SamModelType::VitB,
        };
        let checkpoint = get("SAM_CHECKPOINT").map_or_else(
            || PathBuf::from(format!("./models/{}", model_type.encoder_file_name())),
            PathBuf::from,
        );
        builder = builder.segmentation(SegmentationConfig {
            model_type,
            checkpoint,
            decoder_checkpoint: get("SAM_DECODER_CHECKPOINT").map(PathBuf::from),
            preload: match get("SAM_PRELOAD") {
                Some(raw) => parse_bool("SAM_PRELOAD", &raw)?,
                None => false,
            },
        });

        if let Some(model) = get("REMBG_MODEL") {
            builder = builder.removal_model(model);
        }
        if let Some(provider) = get("EXECUTION_PROVIDER") {
            builder = builder.execution_provider(provider.parse()?);
        }
        if let Some(threads) = get("INTRA_THREADS") {
            builder = builder.intra_threads(parse_var("INTRA_THREADS", &threads)?);
        }
        if let Some(threads) = get("INTER_THREADS") {
            builder = builder.inter_threads(parse_var("INTER_THREADS", &threads)?);
        }

        builder.build()
    }

    /// Validate configuration invariants
    ///
    /// # Errors
    /// - Zero upload ceiling
    /// - Empty host
    /// - Matting background threshold not below the foreground threshold
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(ClearCutError::invalid_config(
                "MAX_UPLOAD_BYTES must be greater than zero",
            ));
        }
        if self.host.trim().is_empty() {
            return Err(ClearCutError::invalid_config("HOST must not be empty"));
        }
        let matting = &self.removal.matting;
        if matting.background_threshold >= matting.foreground_threshold {
            return Err(ClearCutError::invalid_config(format!(
                "matting background threshold ({}) must be below foreground threshold ({})",
                matting.background_threshold, matting.foreground_threshold
            )));
        }
        Ok(())
    }

    /// `host:port` string suitable for binding a listener
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ClearCutError::invalid_config(format!("{key}={raw:?} is invalid: {e}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ClearCutError::invalid_config(format!(
            "{key}={raw:?} is not a boolean"
        ))),
    }
}

/// Builder for `ServiceConfig`
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Set bind host
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set bind port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the upload ceiling in bytes
    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Replace the allowed CORS origins
    #[must_use]
    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.config.cors_origins = origins;
        self
    }

    /// Set the background removal model path
    #[must_use]
    pub fn removal_model<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.removal.model_path = path.into();
        self
    }

    /// Override alpha matting parameters
    #[must_use]
    pub fn matting(mut self, matting: MattingConfig) -> Self {
        self.config.removal.matting = matting;
        self
    }

    /// Replace the segmentation model configuration
    #[must_use]
    pub fn segmentation(mut self, segmentation: SegmentationConfig) -> Self {
        self.config.segmentation = segmentation;
        self
    }

    /// Set the segmentation encoder checkpoint
    #[must_use]
    pub fn sam_checkpoint<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.segmentation.checkpoint = path.into();
        self
    }

    /// Set the segmentation model variant
    #[must_use]
    pub fn sam_model_type(mut self, model_type: SamModelType) -> Self {
        self.config.segmentation.model_type = model_type;
        self
    }

    /// Load the segmentation predictor at startup
    #[must_use]
    pub fn sam_preload(mut self, preload: bool) -> Self {
        self.config.segmentation.preload = preload;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.runtime.execution_provider = provider;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.runtime.intra_threads = threads;
        self
    }

    /// Set number of inter-op threads
    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.runtime.inter_threads = threads;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Configuration validation failures from [`ServiceConfig::validate`]
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.max_upload_bytes, 10_485_760);
        assert_eq!(config.cors_origins, vec!["http://localhost:3000".to_string()]);
        assert_eq!(config.segmentation.model_type, SamModelType::VitB);
        assert_eq!(config.removal.matting.foreground_threshold, 240);
        assert_eq!(config.removal.matting.background_threshold, 10);
        assert_eq!(config.removal.matting.erode_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_reads_variables() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("MAX_UPLOAD_BYTES", "2048"),
            ("CORS_ORIGINS", "http://a.test, http://b.test ,"),
            ("SAM_MODEL_TYPE", "vit_l"),
            ("SAM_CHECKPOINT", "/opt/sam/encoder.onnx"),
            ("SAM_PRELOAD", "true"),
            ("EXECUTION_PROVIDER", "cpu"),
            ("PORT", "9001"),
        ]))
        .unwrap();

        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.segmentation.model_type, SamModelType::VitL);
        assert_eq!(
            config.segmentation.checkpoint,
            PathBuf::from("/opt/sam/encoder.onnx")
        );
        assert_eq!(
            config.segmentation.decoder_path(),
            PathBuf::from("/opt/sam/sam_vit_l_decoder.onnx")
        );
        assert!(config.segmentation.preload);
        assert_eq!(config.runtime.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.port, 9001);
    }

    #[test]
    fn test_from_lookup_empty_values_keep_defaults() {
        let config =
            ServiceConfig::from_lookup(lookup_from(&[("MAX_UPLOAD_BYTES", ""), ("HOST", "  ")]))
                .unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ServiceConfig::from_lookup(lookup_from(&[("MAX_UPLOAD_BYTES", "ten")]))
            .unwrap_err();
        assert!(matches!(err, ClearCutError::InvalidConfig(_)));
        assert!(err.to_string().contains("MAX_UPLOAD_BYTES"));

        assert!(ServiceConfig::from_lookup(lookup_from(&[("SAM_PRELOAD", "maybe")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup_from(&[("SAM_MODEL_TYPE", "vit_x")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup_from(&[("MAX_UPLOAD_BYTES", "0")])).is_err());
    }

    #[test]
    fn test_explicit_decoder_checkpoint_wins() {
        let segmentation = SegmentationConfig {
            decoder_checkpoint: Some(PathBuf::from("/elsewhere/decoder.onnx")),
            ..SegmentationConfig::default()
        };
        assert_eq!(
            segmentation.decoder_path(),
            PathBuf::from("/elsewhere/decoder.onnx")
        );
    }

    #[test]
    fn test_builder_validation_error() {
        let result = ServiceConfig::builder()
            .matting(MattingConfig {
                foreground_threshold: 10,
                background_threshold: 240,
                erode_size: 10,
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_execution_provider_parsing() {
        assert_eq!(ExecutionProvider::default(), ExecutionProvider::Auto);
        assert_eq!("CUDA".parse::<ExecutionProvider>().unwrap(), ExecutionProvider::Cuda);
        assert_eq!(
            "onnx:coreml".parse::<ExecutionProvider>().unwrap(),
            ExecutionProvider::CoreMl
        );
        assert_eq!(ExecutionProvider::CoreMl.to_string(), "coreml");
        assert!("tpu".parse::<ExecutionProvider>().is_err());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = ServiceConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"execution_provider\":\"auto\""));
        let back: ServiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
