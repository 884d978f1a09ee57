//! HTTP surface: routes, error mapping, shared state and bootstrap

pub mod errors;
pub mod routes;
pub mod startup;
pub mod state;

pub use errors::ApiError;
pub use routes::{build_router, cors_layer};
#[cfg(feature = "onnx")]
pub use startup::run;
pub use startup::serve;
pub use state::AppState;
