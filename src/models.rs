//! Model variants, preprocessing constants and checkpoint resolution

use crate::error::{ClearCutError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Segment Anything backbone variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamModelType {
    #[serde(rename = "vit_b")]
    VitB,
    #[serde(rename = "vit_l")]
    VitL,
    #[serde(rename = "vit_h")]
    VitH,
}

impl SamModelType {
    /// Registry key of the variant
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VitB => "vit_b",
            Self::VitL => "vit_l",
            Self::VitH => "vit_h",
        }
    }

    /// Conventional encoder file name, e.g. `sam_vit_b_encoder.onnx`
    #[must_use]
    pub fn encoder_file_name(self) -> String {
        format!("sam_{}_encoder.onnx", self.as_str())
    }

    /// Conventional decoder file name, e.g. `sam_vit_b_decoder.onnx`
    #[must_use]
    pub fn decoder_file_name(self) -> String {
        format!("sam_{}_decoder.onnx", self.as_str())
    }
}

impl std::fmt::Display for SamModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SamModelType {
    type Err = ClearCutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vit_b" => Ok(Self::VitB),
            "vit_l" => Ok(Self::VitL),
            // the upstream registry aliases "default" to the largest backbone
            "vit_h" | "default" => Ok(Self::VitH),
            other => Err(ClearCutError::invalid_config(format!(
                "Unknown SAM model type '{other}'. Supported: vit_b, vit_l, vit_h"
            ))),
        }
    }
}

/// Input geometry and normalization of a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input side (U²-Net) or longest side (SAM)
    pub target_size: u32,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

impl PreprocessingConfig {
    /// U²-Net family: 320×320, ImageNet statistics on `[0, 1]` values
    pub const U2NET: Self = Self {
        target_size: 320,
        normalization_mean: [0.485, 0.456, 0.406],
        normalization_std: [0.229, 0.224, 0.225],
    };

    /// SAM image encoder: longest side 1024, statistics on `[0, 255]` values
    pub const SAM: Self = Self {
        target_size: 1024,
        normalization_mean: [123.675, 116.28, 103.53],
        normalization_std: [58.395, 57.12, 57.375],
    };
}

/// Side of the low-resolution mask prompt accepted by the SAM decoder
pub const SAM_MASK_INPUT_SIZE: usize = 256;

/// Ensure a model file exists and is a regular file
///
/// # Errors
/// - `ModelNotFound` carrying the offending path
pub fn ensure_model_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ClearCutError::ModelNotFound(path.to_path_buf()))
    }
}

/// Absolute form of a checkpoint path for logging; falls back to the path as given
#[must_use]
pub fn display_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_parsing() {
        assert_eq!("vit_b".parse::<SamModelType>().unwrap(), SamModelType::VitB);
        assert_eq!(" VIT_L ".parse::<SamModelType>().unwrap(), SamModelType::VitL);
        assert_eq!("default".parse::<SamModelType>().unwrap(), SamModelType::VitH);
        assert!("vit_t".parse::<SamModelType>().is_err());
    }

    #[test]
    fn test_conventional_file_names() {
        assert_eq!(SamModelType::VitB.encoder_file_name(), "sam_vit_b_encoder.onnx");
        assert_eq!(SamModelType::VitH.decoder_file_name(), "sam_vit_h_decoder.onnx");
        assert_eq!(SamModelType::VitL.to_string(), "vit_l");
    }

    #[test]
    fn test_ensure_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("model.onnx");
        std::fs::write(&present, b"onnx").unwrap();

        assert!(ensure_model_file(&present).is_ok());
        let err = ensure_model_file(&dir.path().join("missing.onnx")).unwrap_err();
        assert!(matches!(err, ClearCutError::ModelNotFound(_)));
        // a directory is not a checkpoint
        assert!(ensure_model_file(dir.path()).is_err());
    }

    #[test]
    fn test_display_path_is_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("enc.onnx");
        std::fs::write(&file, b"x").unwrap();
        assert!(display_path(&file).is_absolute());
        assert!(display_path(Path::new("relative/missing.onnx")).is_absolute());
    }
}
