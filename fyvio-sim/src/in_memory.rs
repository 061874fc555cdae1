//! In-memory backend connection for simulation and tests
//!
//! Media is registered up front as [`MediaFixture`]s. Faults can be switched
//! on at any point to drive the gateway's failure handling deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fyvio_core::{BackendConnection, BackendError, FileProperties};
use parking_lot::RwLock;
use tracing::trace;

/// A media file to register with an [`InMemoryConnection`].
#[derive(Debug, Clone)]
pub struct MediaFixture {
    /// Backend-form chat id
    pub chat_id: i64,
    /// Message carrying the file
    pub message_id: i64,
    /// Unique file id; its first six characters form the token hash
    pub unique_id: String,
    /// File contents
    pub data: Bytes,
    /// Reported MIME type
    pub mime_type: Option<String>,
    /// Reported file name
    pub file_name: Option<String>,
}

impl MediaFixture {
    /// Creates a fixture without mime type or file name.
    pub fn new(
        chat_id: i64,
        message_id: i64,
        unique_id: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            chat_id,
            message_id,
            unique_id: unique_id.into(),
            data: data.into(),
            mime_type: None,
            file_name: None,
        }
    }

    /// Sets the reported MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the reported file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Properties the connection reports for this fixture.
    pub fn properties(&self) -> FileProperties {
        FileProperties {
            chat_id: self.chat_id,
            message_id: self.message_id,
            unique_id: self.unique_id.clone(),
            file_size: self.data.len() as u64,
            mime_type: self.mime_type.clone(),
            file_name: self.file_name.clone(),
        }
    }
}

/// Failure behavior injected into an [`InMemoryConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulatedFault {
    /// Serve everything normally
    #[default]
    None,
    /// Every chunk read after the first `n` successful ones fails
    FailReadsAfter(usize),
    /// Every file lookup fails with a transport error
    FailLookups,
}

/// Backend connection serving media from memory.
pub struct InMemoryConnection {
    name: String,
    media: RwLock<HashMap<(i64, i64), MediaFixture>>,
    denied_chats: RwLock<HashSet<i64>>,
    fault: RwLock<SimulatedFault>,
    read_delay: RwLock<Option<Duration>>,
    reads: AtomicUsize,
    lookups: AtomicUsize,
}

impl InMemoryConnection {
    /// Creates an empty connection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            media: RwLock::new(HashMap::new()),
            denied_chats: RwLock::new(HashSet::new()),
            fault: RwLock::new(SimulatedFault::None),
            read_delay: RwLock::new(None),
            reads: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Registers a media file, replacing any file on the same message.
    pub fn add_media(&self, fixture: MediaFixture) {
        self.media
            .write()
            .insert((fixture.chat_id, fixture.message_id), fixture);
    }

    /// Builder form of [`InMemoryConnection::add_media`].
    pub fn with_media(self, fixture: MediaFixture) -> Self {
        self.add_media(fixture);
        self
    }

    /// Makes every lookup in `chat_id` fail with `PermissionDenied`.
    pub fn deny_chat(&self, chat_id: i64) {
        self.denied_chats.write().insert(chat_id);
    }

    /// Switches the injected fault.
    pub fn set_fault(&self, fault: SimulatedFault) {
        *self.fault.write() = fault;
    }

    /// Delays every chunk read, to keep streams in flight during tests.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.write() = delay;
    }

    /// Number of chunk reads attempted so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of file lookups attempted so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for InMemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConnection")
            .field("name", &self.name)
            .field("media", &self.media.read().len())
            .field("fault", &*self.fault.read())
            .finish()
    }
}

#[async_trait]
impl BackendConnection for InMemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn file_properties(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<FileProperties, BackendError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if *self.fault.read() == SimulatedFault::FailLookups {
            return Err(BackendError::Transport {
                reason: format!("{}: simulated lookup failure", self.name),
            });
        }
        if self.denied_chats.read().contains(&chat_id) {
            return Err(BackendError::PermissionDenied { chat_id });
        }

        self.media
            .read()
            .get(&(chat_id, message_id))
            .map(MediaFixture::properties)
            .ok_or(BackendError::NotFound {
                chat_id,
                message_id,
            })
    }

    async fn read_chunk(
        &self,
        file: &FileProperties,
        offset: u64,
        limit: usize,
    ) -> Result<Bytes, BackendError> {
        let attempt = self.reads.fetch_add(1, Ordering::SeqCst);

        let delay = *self.read_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let fault = *self.fault.read();
        if let SimulatedFault::FailReadsAfter(n) = fault
            && attempt >= n
        {
            return Err(BackendError::Transport {
                reason: format!("{}: simulated read failure at offset {}", self.name, offset),
            });
        }

        let data = self
            .media
            .read()
            .get(&(file.chat_id, file.message_id))
            .map(|fixture| fixture.data.clone())
            .ok_or(BackendError::NotFound {
                chat_id: file.chat_id,
                message_id: file.message_id,
            })?;

        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(limit).min(data.len());
        trace!(
            "{} read {} bytes at offset {} of message {}",
            self.name,
            end - start,
            offset,
            file.message_id
        );
        Ok(data.slice(start..end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: i64 = -1001;

    fn connection() -> InMemoryConnection {
        InMemoryConnection::new("sim-0").with_media(
            MediaFixture::new(CHAT, 1, "abc123def", vec![1u8, 2, 3, 4, 5])
                .with_mime_type("video/mp4")
                .with_file_name("clip.mp4"),
        )
    }

    #[tokio::test]
    async fn test_lookup_and_read() {
        let conn = connection();
        let props = conn.file_properties(CHAT, 1).await.unwrap();
        assert_eq!(props.file_size, 5);
        assert_eq!(props.file_name.as_deref(), Some("clip.mp4"));

        assert_eq!(&conn.read_chunk(&props, 1, 2).await.unwrap()[..], &[2, 3]);
        assert_eq!(&conn.read_chunk(&props, 3, 10).await.unwrap()[..], &[4, 5]);
        assert!(conn.read_chunk(&props, 10, 10).await.unwrap().is_empty());
        assert_eq!(conn.read_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_and_denied() {
        let conn = connection();
        assert!(matches!(
            conn.file_properties(CHAT, 2).await,
            Err(BackendError::NotFound { message_id: 2, .. })
        ));

        conn.deny_chat(CHAT);
        assert!(matches!(
            conn.file_properties(CHAT, 1).await,
            Err(BackendError::PermissionDenied { chat_id: CHAT })
        ));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let conn = connection();
        let props = conn.file_properties(CHAT, 1).await.unwrap();

        conn.set_fault(SimulatedFault::FailReadsAfter(1));
        assert!(conn.read_chunk(&props, 0, 2).await.is_ok());
        assert!(matches!(
            conn.read_chunk(&props, 2, 2).await,
            Err(BackendError::Transport { .. })
        ));

        conn.set_fault(SimulatedFault::FailLookups);
        assert!(matches!(
            conn.file_properties(CHAT, 1).await,
            Err(BackendError::Transport { .. })
        ));
        assert_eq!(conn.lookup_count(), 2);
    }
}
