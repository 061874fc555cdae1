//! Local directory exposed as a simulated channel
//!
//! Every regular file under the root becomes a message. Message ids start at
//! 1 and follow sorted relative-path order, so links stay stable across
//! restarts as long as the directory does not change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fyvio_core::token::backend_chat_id;
use fyvio_core::{BackendConnection, BackendError, FileProperties};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

/// Errors raised while scanning a media directory.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    /// Directory listing or metadata lookup failed
    #[error("Failed to scan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Channel id overflows its backend form
    #[error("Channel id {channel_id} has no backend form")]
    InvalidChannel { channel_id: i64 },
}

/// One file of the library and the message it is published as.
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the library root, `/`-separated
    pub relative_path: String,
    /// Properties reported to the gateway
    pub properties: FileProperties,
}

/// Snapshot of a directory's files, published as one channel.
#[derive(Debug)]
pub struct LocalLibrary {
    root: PathBuf,
    channel_id: i64,
    backend_chat_id: i64,
    entries: Vec<LibraryEntry>,
}

impl LocalLibrary {
    /// Scans `root` recursively and assigns message ids.
    ///
    /// `channel_id` is the short id that goes into access tokens. Hidden
    /// files and directories are skipped.
    ///
    /// # Errors
    ///
    /// - `LibraryError::Io` - Root or a subdirectory could not be read
    /// - `LibraryError::InvalidChannel` - Channel id cannot be addressed
    pub async fn scan(root: impl AsRef<Path>, channel_id: i64) -> Result<Self, LibraryError> {
        let root = root.as_ref().to_path_buf();
        let backend_chat_id =
            backend_chat_id(channel_id).ok_or(LibraryError::InvalidChannel { channel_id })?;

        let mut files = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let io_error = |source: std::io::Error| LibraryError::Io {
                path: dir.clone(),
                source,
            };
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_error)?;

            while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
                let path = entry.path();
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                if hidden {
                    continue;
                }

                let file_type = entry.file_type().await.map_err(io_error)?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    match entry.metadata().await {
                        Ok(metadata) => files.push((path, metadata.len())),
                        Err(e) => warn!("Skipping {}: {}", path.display(), e),
                    }
                }
            }
        }

        let mut files: Vec<(String, PathBuf, u64)> = files
            .into_iter()
            .map(|(path, size)| (relative_path(&root, &path), path, size))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let entries = files
            .into_iter()
            .zip(1i64..)
            .map(|((relative_path, path, size), message_id)| {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                let mime_type = mime_guess::from_path(&path).first_raw().map(str::to_string);

                LibraryEntry {
                    properties: FileProperties {
                        chat_id: backend_chat_id,
                        message_id,
                        unique_id: unique_id(&relative_path),
                        file_size: size,
                        mime_type,
                        file_name,
                    },
                    path,
                    relative_path,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            "Scanned {} file(s) under {} into channel {}",
            entries.len(),
            root.display(),
            channel_id
        );

        Ok(Self {
            root,
            channel_id,
            backend_chat_id,
            entries,
        })
    }

    /// Directory the library was scanned from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Short channel id used in tokens.
    pub fn channel_id(&self) -> i64 {
        self.channel_id
    }

    /// Channel id as the backend addresses it.
    pub fn backend_chat_id(&self) -> i64 {
        self.backend_chat_id
    }

    /// All files in message id order.
    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    /// Entry published as `message_id`.
    pub fn entry(&self, message_id: i64) -> Option<&LibraryEntry> {
        let index = usize::try_from(message_id.checked_sub(1)?).ok()?;
        self.entries.get(index)
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory held no files.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn unique_id(relative_path: &str) -> String {
    hex::encode(Sha1::digest(relative_path.as_bytes()))
}

/// Backend connection reading files of a [`LocalLibrary`] from disk.
///
/// Several connections can share one library to exercise load balancing.
#[derive(Debug, Clone)]
pub struct LocalLibraryConnection {
    name: String,
    library: Arc<LocalLibrary>,
}

impl LocalLibraryConnection {
    /// Creates a named connection over `library`.
    pub fn new(name: impl Into<String>, library: Arc<LocalLibrary>) -> Self {
        Self {
            name: name.into(),
            library,
        }
    }

    /// Library served by this connection.
    pub fn library(&self) -> &Arc<LocalLibrary> {
        &self.library
    }

    fn entry_for(&self, chat_id: i64, message_id: i64) -> Result<&LibraryEntry, BackendError> {
        if chat_id != self.library.backend_chat_id {
            return Err(BackendError::PermissionDenied { chat_id });
        }
        self.library
            .entry(message_id)
            .ok_or(BackendError::NotFound {
                chat_id,
                message_id,
            })
    }
}

#[async_trait]
impl BackendConnection for LocalLibraryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn file_properties(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<FileProperties, BackendError> {
        self.entry_for(chat_id, message_id)
            .map(|entry| entry.properties.clone())
    }

    async fn read_chunk(
        &self,
        file: &FileProperties,
        offset: u64,
        limit: usize,
    ) -> Result<Bytes, BackendError> {
        let entry = self.entry_for(file.chat_id, file.message_id)?;
        let transport = |e: std::io::Error| BackendError::Transport {
            reason: format!("{}: {}", entry.path.display(), e),
        };

        let mut handle = tokio::fs::File::open(&entry.path)
            .await
            .map_err(transport)?;
        handle
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(transport)?;

        let remaining = usize::try_from(file.file_size.saturating_sub(offset)).unwrap_or(usize::MAX);
        let mut buffer = Vec::with_capacity(limit.min(remaining));
        handle
            .take(limit as u64)
            .read_to_end(&mut buffer)
            .await
            .map_err(transport)?;
        Ok(Bytes::from(buffer))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn library_with(files: &[(&str, &[u8])]) -> (TempDir, Arc<LocalLibrary>) {
        let dir = TempDir::new().unwrap();
        for (name, data) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.unwrap();
            }
            tokio::fs::write(&path, data).await.unwrap();
        }
        let library = LocalLibrary::scan(dir.path(), 42).await.unwrap();
        (dir, Arc::new(library))
    }

    #[tokio::test]
    async fn test_scan_assigns_ids_in_path_order() {
        let (_dir, library) = library_with(&[
            ("b.mkv", b"bbbb"),
            ("a.mp4", b"aa"),
            ("shows/ep1.mp4", b"e"),
            (".hidden", b"x"),
        ])
        .await;

        let names: Vec<_> = library
            .entries()
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect();
        assert_eq!(names, ["a.mp4", "b.mkv", "shows/ep1.mp4"]);
        assert_eq!(library.backend_chat_id(), -10042);

        let first = &library.entry(1).unwrap().properties;
        assert_eq!(first.file_size, 2);
        assert_eq!(first.mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(first.unique_id.len(), 40);
        assert!(library.entry(0).is_none());
        assert!(library.entry(4).is_none());
    }

    #[tokio::test]
    async fn test_unique_ids_are_stable() {
        let (_a, first) = library_with(&[("movie.mp4", b"1")]).await;
        let (_b, second) = library_with(&[("movie.mp4", b"2")]).await;
        assert_eq!(
            first.entry(1).unwrap().properties.unique_id,
            second.entry(1).unwrap().properties.unique_id
        );
    }

    #[tokio::test]
    async fn test_connection_reads_offsets() {
        let data: Vec<u8> = (0..100u8).collect();
        let (_dir, library) = library_with(&[("clip.mp4", &data)]).await;
        let conn = LocalLibraryConnection::new("local-0", Arc::clone(&library));

        let props = conn
            .file_properties(library.backend_chat_id(), 1)
            .await
            .unwrap();
        assert_eq!(props.file_name.as_deref(), Some("clip.mp4"));

        let chunk = conn.read_chunk(&props, 32, 32).await.unwrap();
        assert_eq!(&chunk[..], &data[32..64]);

        let tail = conn.read_chunk(&props, 96, 32).await.unwrap();
        assert_eq!(&tail[..], &data[96..]);
    }

    #[tokio::test]
    async fn test_oversized_limit_reads_only_the_file() {
        let (_dir, library) = library_with(&[("clip.mp4", b"0123456789")]).await;
        let conn = LocalLibraryConnection::new("local-0", Arc::clone(&library));
        let props = conn
            .file_properties(library.backend_chat_id(), 1)
            .await
            .unwrap();

        let chunk = conn.read_chunk(&props, 4, usize::MAX).await.unwrap();
        assert_eq!(&chunk[..], b"456789");

        let past_end = conn.read_chunk(&props, 64, usize::MAX).await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_connection_rejects_unknown_messages() {
        let (_dir, library) = library_with(&[("clip.mp4", b"abc")]).await;
        let conn = LocalLibraryConnection::new("local-0", Arc::clone(&library));

        assert!(matches!(
            conn.file_properties(library.backend_chat_id(), 9).await,
            Err(BackendError::NotFound { message_id: 9, .. })
        ));
        assert!(matches!(
            conn.file_properties(-1009, 1).await,
            Err(BackendError::PermissionDenied { chat_id: -1009 })
        ));
    }

    #[tokio::test]
    async fn test_scan_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            LocalLibrary::scan(&missing, 1).await,
            Err(LibraryError::Io { .. })
        ));
    }
}
