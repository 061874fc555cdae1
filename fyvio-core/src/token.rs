//! Opaque access tokens for stream links.
//!
//! A token is URL-safe base64 (no padding) over a compact JSON object
//! carrying the channel id, message id and the first [`HASH_LEN`]
//! characters of the file's unique id. Holding a token is the only access
//! check the gateway performs, so the hash prefix is what stops a client
//! from addressing arbitrary messages by counting ids.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Number of leading unique-id characters embedded in a token.
pub const HASH_LEN: usize = 6;

/// Upper bound on accepted token length; real tokens are well under 100 chars.
const MAX_TOKEN_LEN: usize = 512;

/// Errors produced when a token cannot be turned into an [`AccessToken`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Token is empty")]
    Empty,

    #[error("Token length {len} exceeds limit {max}")]
    TooLong { len: usize, max: usize },

    #[error("Token is not valid base64: {reason}")]
    Base64 { reason: String },

    #[error("Token payload is malformed: {reason}")]
    Payload { reason: String },

    #[error("Missing id or hash")]
    MissingField { field: &'static str },

    #[error("Hash must be {expected} characters, got {actual}")]
    HashLength { expected: usize, actual: usize },

    #[error("Channel id {chat_id} cannot be addressed on the backend")]
    ChatIdOutOfRange { chat_id: i64 },
}

/// Decoded contents of a stream link token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AccessToken {
    /// Channel id as stored in the token (short form, without the `-100` prefix)
    pub chat_id: i64,
    /// Message carrying the media
    #[serde(rename = "msg_id")]
    pub message_id: i64,
    /// Prefix of the media's unique id
    pub hash: String,
}

/// Wire shape with every field optional so missing fields surface as
/// `DecodeError::MissingField` instead of a generic parse failure.
#[derive(Deserialize)]
struct RawToken {
    chat_id: Option<i64>,
    msg_id: Option<i64>,
    hash: Option<String>,
}

impl AccessToken {
    /// Creates a token payload from its parts.
    pub fn new(chat_id: i64, message_id: i64, hash: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id,
            hash: hash.into(),
        }
    }

    /// Creates a token for a file, taking the hash from its unique id.
    pub fn for_file(chat_id: i64, message_id: i64, unique_id: &str) -> Self {
        let hash: String = unique_id.chars().take(HASH_LEN).collect();
        Self::new(chat_id, message_id, hash)
    }

    /// Encodes the payload into its opaque URL form.
    pub fn encode(&self) -> String {
        // Serializing a struct of integers and a string cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes an opaque token.
    ///
    /// Trailing `=` padding is tolerated. Pure: no I/O, no side effects.
    ///
    /// # Errors
    ///
    /// - `DecodeError::Empty` / `DecodeError::TooLong` - Token length out of bounds
    /// - `DecodeError::Base64` / `DecodeError::Payload` - Token is not a valid encoding
    /// - `DecodeError::MissingField` - Channel id, message id or hash absent (or zero/empty)
    /// - `DecodeError::HashLength` - Hash is not exactly [`HASH_LEN`] characters
    /// - `DecodeError::ChatIdOutOfRange` - Channel id has no backend form
    pub fn decode(token: &str) -> Result<Self, DecodeError> {
        let token = token.trim().trim_end_matches('=');
        if token.is_empty() {
            return Err(DecodeError::Empty);
        }
        if token.len() > MAX_TOKEN_LEN {
            return Err(DecodeError::TooLong {
                len: token.len(),
                max: MAX_TOKEN_LEN,
            });
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| DecodeError::Base64 {
                reason: e.to_string(),
            })?;
        let raw: RawToken = serde_json::from_slice(&bytes).map_err(|e| DecodeError::Payload {
            reason: e.to_string(),
        })?;

        let chat_id = raw
            .chat_id
            .ok_or(DecodeError::MissingField { field: "chat_id" })?;
        let message_id = raw
            .msg_id
            .filter(|id| *id != 0)
            .ok_or(DecodeError::MissingField { field: "msg_id" })?;
        let hash = raw
            .hash
            .filter(|hash| !hash.is_empty())
            .ok_or(DecodeError::MissingField { field: "hash" })?;

        let hash_chars = hash.chars().count();
        if hash_chars != HASH_LEN {
            return Err(DecodeError::HashLength {
                expected: HASH_LEN,
                actual: hash_chars,
            });
        }

        if backend_chat_id(chat_id).is_none() {
            return Err(DecodeError::ChatIdOutOfRange { chat_id });
        }

        Ok(Self {
            chat_id,
            message_id,
            hash,
        })
    }

    /// Channel id in the form the backend addresses it.
    ///
    /// Always `Some` for tokens produced by [`AccessToken::decode`].
    pub fn backend_chat_id(&self) -> Option<i64> {
        backend_chat_id(self.chat_id)
    }
}

/// Maps a short channel id to the backend's `-100`-prefixed peer id.
///
/// Negative ids are already in backend form and pass through unchanged.
/// Returns `None` when the prefixed id does not fit in an `i64`.
pub fn backend_chat_id(chat_id: i64) -> Option<i64> {
    if chat_id < 0 {
        return Some(chat_id);
    }
    let digits = chat_id.checked_ilog10().map_or(1, |log| log + 1);
    let prefix = 10i64.checked_pow(digits)?.checked_mul(100)?;
    prefix.checked_add(chat_id).map(|id| -id)
}

impl FromStr for AccessToken {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
