//! HTTP request handlers organized by functionality

pub mod status;
pub mod streaming;

// Re-export handler functions
pub use status::{ServerStatus, server_status};
pub use streaming::stream_media;
