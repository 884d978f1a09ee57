//! Execution provider parsing and availability reporting

use crate::{
    config::ExecutionProvider,
    error::{ClearCutError, Result},
};

/// Information about an execution provider
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

/// Utility for parsing and managing execution providers
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse an execution provider name, optionally prefixed with the backend
    ///
    /// Accepts `auto`, `cpu`, `cuda`, `coreml` as well as the `onnx:<provider>`
    /// form. A bare `onnx` selects `auto`. Matching is case-insensitive.
    ///
    /// # Examples
    /// ```rust
    /// use clearcut::utils::ExecutionProviderManager;
    /// use clearcut::ExecutionProvider;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let provider = ExecutionProviderManager::parse_provider_string("onnx:cuda")?;
    /// assert_eq!(provider, ExecutionProvider::Cuda);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - Unknown backend prefix or provider name
    pub fn parse_provider_string(provider_str: &str) -> Result<ExecutionProvider> {
        let normalized = provider_str.trim().to_ascii_lowercase();
        let provider = match normalized.split_once(':') {
            Some(("onnx", provider)) => provider,
            Some((backend, _)) => {
                return Err(ClearCutError::invalid_config(format!(
                    "Unknown backend: {backend}. Supported backends: onnx"
                )));
            },
            None if normalized == "onnx" => "auto",
            None => normalized.as_str(),
        };

        match provider {
            "auto" => Ok(ExecutionProvider::Auto),
            "cpu" => Ok(ExecutionProvider::Cpu),
            "cuda" => Ok(ExecutionProvider::Cuda),
            "coreml" => Ok(ExecutionProvider::CoreMl),
            _ => Err(ClearCutError::invalid_config(format!(
                "Unknown ONNX provider: {provider}. Supported: auto, cpu, cuda, coreml"
            ))),
        }
    }

    /// List every provider with its actual availability on this machine
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        #[cfg(feature = "onnx")]
        let availability: std::collections::HashMap<String, bool> =
            crate::backends::onnx::list_providers()
                .into_iter()
                .map(|(name, available, _)| (name.to_lowercase(), available))
                .collect();

        #[cfg(not(feature = "onnx"))]
        let availability: std::collections::HashMap<String, bool> =
            std::collections::HashMap::new();

        let suffix = if cfg!(feature = "onnx") {
            ""
        } else {
            " (feature disabled)"
        };
        let is_available = |key: &str| availability.get(key).copied().unwrap_or(false);

        vec![
            ProviderInfo {
                name: "onnx:auto".to_string(),
                execution_provider: ExecutionProvider::Auto,
                available: availability.values().any(|&available| available),
                description: format!("ONNX Runtime with auto-selected provider{suffix}"),
            },
            ProviderInfo {
                name: "onnx:cpu".to_string(),
                execution_provider: ExecutionProvider::Cpu,
                available: is_available("cpu"),
                description: format!("ONNX Runtime CPU execution{suffix}"),
            },
            ProviderInfo {
                name: "onnx:cuda".to_string(),
                execution_provider: ExecutionProvider::Cuda,
                available: is_available("cuda"),
                description: format!("ONNX Runtime CUDA GPU acceleration{suffix}"),
            },
            ProviderInfo {
                name: "onnx:coreml".to_string(),
                execution_provider: ExecutionProvider::CoreMl,
                available: is_available("coreml"),
                description: format!("ONNX Runtime CoreML (Apple Silicon) acceleration{suffix}"),
            },
        ]
    }

    /// Validate a provider string without keeping the result
    #[must_use]
    pub fn is_valid_provider_string(provider_str: &str) -> bool {
        Self::parse_provider_string(provider_str).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_onnx_providers() {
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("onnx:auto").unwrap(),
            ExecutionProvider::Auto
        );
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("onnx:cpu").unwrap(),
            ExecutionProvider::Cpu
        );
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("cuda").unwrap(),
            ExecutionProvider::Cuda
        );
        assert_eq!(
            ExecutionProviderManager::parse_provider_string(" CoreML ").unwrap(),
            ExecutionProvider::CoreMl
        );
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("onnx").unwrap(),
            ExecutionProvider::Auto
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ExecutionProviderManager::parse_provider_string("invalid").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("onnx:invalid").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("tract:cpu").is_err());
        assert!(!ExecutionProviderManager::is_valid_provider_string(""));
    }

    #[test]
    fn test_list_all_providers() {
        let providers = ExecutionProviderManager::list_all_providers();
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["onnx:auto", "onnx:cpu", "onnx:cuda", "onnx:coreml"]);
        for info in &providers {
            assert!(ExecutionProviderManager::is_valid_provider_string(&info.name));
        }
    }
}
