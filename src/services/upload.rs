//! Upload guard: content-type allow-list and byte ceiling
//!
//! The guard never buffers more than `max_bytes + 1` bytes, so an oversized
//! upload is rejected before anything tries to decode it.

use crate::error::{ClearCutError, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Content types accepted for image uploads
pub const ALLOWED_CONTENT_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/jpg", "image/webp"];

/// Per-request upload validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadGuard {
    max_bytes: usize,
}

impl UploadGuard {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Check a declared content type against the allow-list
    ///
    /// The comparison is exact; parameters such as `; charset=` are not stripped.
    ///
    /// # Errors
    /// - `UnsupportedMediaType` for a missing or disallowed type
    pub fn check_content_type(content_type: Option<&str>) -> Result<()> {
        match content_type {
            Some(ct) if ALLOWED_CONTENT_TYPES.contains(&ct) => Ok(()),
            other => Err(ClearCutError::UnsupportedMediaType(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Validate the content type, then read at most `max_bytes + 1` bytes
    ///
    /// # Errors
    /// - `UnsupportedMediaType` before any byte is read
    /// - `PayloadTooLarge` when the source holds more than `max_bytes`
    /// - `InvalidRequest` when the source fails mid-read
    pub async fn check<R>(&self, content_type: Option<&str>, reader: R) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        Self::check_content_type(content_type)?;
        self.read_limited(reader).await
    }

    /// Read at most `max_bytes + 1` bytes from `reader`
    ///
    /// # Errors
    /// - `PayloadTooLarge` when the source holds more than `max_bytes`
    /// - `InvalidRequest` when the source fails mid-read
    pub async fn read_limited<R>(&self, reader: R) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let limit = (self.max_bytes as u64).saturating_add(1);
        let mut data = Vec::new();
        reader
            .take(limit)
            .read_to_end(&mut data)
            .await
            .map_err(|e| {
                log::debug!("Upload stream failed: {e}");
                ClearCutError::invalid_request("Could not read upload.")
            })?;

        if data.len() > self.max_bytes {
            return Err(ClearCutError::PayloadTooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(data)
    }
}
