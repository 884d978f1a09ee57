//! Request-path services
//!
//! Upload validation, image codec adapter and the two inference services.

pub mod codec;
pub mod removal;
pub mod segmentation;
pub mod upload;

pub use codec::{ColorMode, ImageCodec};
pub use removal::BackgroundRemovalService;
pub use segmentation::{PredictorHandle, SegmentationService};
pub use upload::{UploadGuard, ALLOWED_CONTENT_TYPES};
