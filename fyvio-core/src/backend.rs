//! Backend connection abstraction.
//!
//! A backend connection is one authenticated session to the messaging
//! platform that stores the media. Session provisioning lives outside this
//! crate; the gateway only needs to look up a message's file properties and
//! read raw, offset-addressed chunks of that file.

use async_trait::async_trait;
use bytes::Bytes;

use crate::token::HASH_LEN;

/// Errors reported by a backend connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The message does not exist or carries no media.
    #[error("Message {message_id} not found in chat {chat_id}")]
    NotFound { chat_id: i64, message_id: i64 },

    /// The connection is not allowed to read from the chat.
    #[error("Connection has no access to chat {chat_id}")]
    PermissionDenied { chat_id: i64 },

    /// Network or backend failure.
    #[error("Backend transport failure: {reason}")]
    Transport { reason: String },
}

/// Properties of a media file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProperties {
    /// Backend-form chat id the file was resolved from
    pub chat_id: i64,
    /// Message carrying the file
    pub message_id: i64,
    /// Stable unique identifier of the file on the backend
    pub unique_id: String,
    /// Total size in bytes
    pub file_size: u64,
    /// MIME type reported by the backend, if any
    pub mime_type: Option<String>,
    /// Original file name, if any
    pub file_name: Option<String>,
}

impl FileProperties {
    /// Checks a token hash against the leading characters of the unique id.
    pub fn matches_hash(&self, hash: &str) -> bool {
        let prefix: String = self.unique_id.chars().take(HASH_LEN).collect();
        prefix.chars().count() == HASH_LEN && prefix == hash
    }
}

/// One authenticated session to the media backend.
///
/// Implementations must be cheap to share behind an `Arc`; the pool hands the
/// same connection to many concurrent streams.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Resolves the media attached to a message.
    ///
    /// # Errors
    ///
    /// - `BackendError::NotFound` - Message absent or carries no media
    /// - `BackendError::PermissionDenied` - Connection cannot read the chat
    /// - `BackendError::Transport` - Network or backend failure
    async fn file_properties(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<FileProperties, BackendError>;

    /// Reads up to `limit` bytes of the file starting at `offset`.
    ///
    /// Returns fewer bytes only when the file ends before `offset + limit`.
    ///
    /// # Errors
    ///
    /// - `BackendError::Transport` - Network or backend failure
    /// - `BackendError::NotFound` - File disappeared since it was resolved
    async fn read_chunk(
        &self,
        file: &FileProperties,
        offset: u64,
        limit: usize,
    ) -> Result<Bytes, BackendError>;
}
