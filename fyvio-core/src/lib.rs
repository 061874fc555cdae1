//! Fyvio Core - Streaming gateway building blocks
//!
//! This crate turns an opaque access token and an optional HTTP `Range`
//! header into a lazily produced byte stream read from a pool of backend
//! connections: token decoding, least-loaded connection selection,
//! per-connection streamer caching, range resolution and chunk planning.

pub mod backend;
pub mod chunk;
pub mod config;
pub mod gateway;
pub mod media;
pub mod pool;
pub mod range;
pub mod streamer;
pub mod token;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use backend::{BackendConnection, BackendError, FileProperties};
pub use chunk::{ChunkPlan, ChunkStream, StreamError};
pub use config::{ConfigError, FyvioConfig, LoggingConfig};
pub use gateway::{GatewayError, StreamGateway, StreamResponse};
pub use pool::{ConnectionPool, PooledConnection, WorkloadLease};
pub use range::{ByteRange, RangeNotSatisfiable, ResolvedRange};
pub use streamer::{ByteStreamer, StreamerCache};
pub use token::{AccessToken, DecodeError};

/// Errors that can bubble up from any Fyvio subsystem.
#[derive(Debug, thiserror::Error)]
pub enum FyvioError {
    /// Access token could not be decoded.
    #[error("Token error: {0}")]
    Decode(#[from] DecodeError),

    /// Backend connection reported a failure.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Request could not be served by the gateway.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Byte stream terminated early.
    #[error("Streaming error: {0}")]
    Stream(#[from] StreamError),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Global log subscriber could not be installed.
    #[error("Logging error: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

impl FyvioError {
    /// Checks if this error is caused by client input rather than the server.
    pub fn is_user_error(&self) -> bool {
        match self {
            FyvioError::Decode(_) | FyvioError::Config(_) => true,
            FyvioError::Gateway(e) => e.is_client_error(),
            _ => false,
        }
    }
}

/// Result alias used across Fyvio crates.
pub type Result<T> = std::result::Result<T, FyvioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_classification() {
        let decode: FyvioError = DecodeError::Empty.into();
        assert!(decode.is_user_error());

        let hash: FyvioError = GatewayError::InvalidHash { message_id: 3 }.into();
        assert!(hash.is_user_error());

        let transport: FyvioError = GatewayError::Backend(BackendError::Transport {
            reason: "reset".to_string(),
        })
        .into();
        assert!(!transport.is_user_error());

        let io: FyvioError = std::io::Error::other("disk").into();
        assert!(!io.is_user_error());
    }
}
