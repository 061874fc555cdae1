//! Fyvio Web - HTTP streaming gateway

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
//!
//! Serves range-addressable media streams over axum. Each request decodes
//! an access token, leases the least-loaded backend connection and streams
//! the requested bytes chunk by chunk as the client reads them.

pub mod error;
pub mod handlers;
pub mod server;

// Re-export main types
pub use error::ApiError;
pub use server::{AppState, create_router, run_server};
