//! Chunk-aligned range streaming.
//!
//! The backend only serves reads aligned to a fixed chunk size, so a byte
//! range is widened to chunk boundaries, read one chunk at a time, and the
//! surplus is cut from the first and last chunk before the bytes go out.
//!
//! The resulting stream is pull-driven: a chunk is requested from the
//! backend only when the HTTP body asks for the next item, so a slow client
//! never causes more than the chunk it is currently receiving to sit in
//! memory, and dropping the body drops the pending read with it.

use std::num::NonZeroU64;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, stream};
use tracing::{debug, trace};

use crate::backend::{BackendConnection, BackendError, FileProperties};
use crate::range::ByteRange;

/// Default backend read size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: NonZeroU64 = match NonZeroU64::new(1024 * 1024) {
    Some(size) => size,
    None => panic!("chunk size must be non-zero"),
};

/// Largest accepted backend read size: 8 MiB.
pub const MAX_CHUNK_SIZE: NonZeroU64 = match NonZeroU64::new(8 * 1024 * 1024) {
    Some(size) => size,
    None => panic!("chunk size must be non-zero"),
};

/// Boxed chunk stream handed to the HTTP body.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Errors that end a chunk stream early.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Backend read failed; bytes already sent cannot be recalled.
    #[error("Backend read failed at offset {offset}: {source}")]
    Transport {
        offset: u64,
        #[source]
        source: BackendError,
    },

    /// Backend returned fewer bytes than the plan needs from this chunk.
    #[error("Short read for chunk {index}: needed {needed} bytes, got {actual}")]
    ShortRead {
        index: u64,
        needed: usize,
        actual: usize,
    },
}

/// Chunk-aligned read plan for an inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Size of every backend read
    pub chunk_size: u64,
    /// File offset of the first read, aligned down to a chunk boundary
    pub offset: u64,
    /// Bytes dropped from the front of the first chunk
    pub first_trim: u64,
    /// Bytes kept from the front of the last chunk
    pub last_trim: u64,
    /// Number of backend reads
    pub chunk_count: u64,
}

impl ChunkPlan {
    /// Plans the reads covering `range`.
    pub fn new(range: ByteRange, chunk_size: NonZeroU64) -> Self {
        let chunk_size = chunk_size.get();
        let from = range.start;
        let until = range.end;

        let offset = from - (from % chunk_size);
        let first_trim = from - offset;
        let last_trim = (until % chunk_size) + 1;
        let chunk_count = until / chunk_size - offset / chunk_size + 1;

        Self {
            chunk_size,
            offset,
            first_trim,
            last_trim,
            chunk_count,
        }
    }

    /// File offset of the read for chunk `index`.
    pub fn chunk_offset(&self, index: u64) -> u64 {
        self.offset + index * self.chunk_size
    }

    /// Total bytes the plan yields after trimming.
    pub fn content_length(&self) -> u64 {
        if self.chunk_count == 1 {
            self.last_trim - self.first_trim
        } else {
            (self.chunk_count - 1) * self.chunk_size - self.first_trim + self.last_trim
        }
    }

    /// Slice of chunk `index` that belongs to the requested range.
    pub fn slice_bounds(&self, index: u64) -> (usize, usize) {
        let start = if index == 0 { self.first_trim } else { 0 };
        let end = if index + 1 == self.chunk_count {
            self.last_trim
        } else {
            self.chunk_size
        };
        (start as usize, end as usize)
    }

    /// Cuts chunk `index` down to the bytes inside the requested range.
    ///
    /// # Errors
    ///
    /// - `StreamError::ShortRead` - Chunk ends before the bytes the plan needs
    pub fn trim(&self, index: u64, chunk: Bytes) -> Result<Bytes, StreamError> {
        let (start, end) = self.slice_bounds(index);
        if chunk.len() < end {
            return Err(StreamError::ShortRead {
                index,
                needed: end,
                actual: chunk.len(),
            });
        }
        if start == 0 && end == chunk.len() {
            return Ok(chunk);
        }
        Ok(chunk.slice(start..end))
    }
}

struct ChunkCursor {
    connection: Arc<dyn BackendConnection>,
    file: Arc<FileProperties>,
    plan: ChunkPlan,
    index: u64,
}

/// Streams the bytes described by `plan`, one backend read per item.
///
/// The first error ends the stream; it is never retried.
pub fn chunk_stream(
    connection: Arc<dyn BackendConnection>,
    file: Arc<FileProperties>,
    plan: ChunkPlan,
) -> impl Stream<Item = Result<Bytes, StreamError>> + Send + 'static {
    debug!(
        "Streaming message {} via {}: offset={} chunks={} first_trim={} last_trim={}",
        file.message_id,
        connection.name(),
        plan.offset,
        plan.chunk_count,
        plan.first_trim,
        plan.last_trim
    );

    let cursor = ChunkCursor {
        connection,
        file,
        plan,
        index: 0,
    };

    stream::unfold(Some(cursor), |cursor| async move {
        let mut cursor = cursor?;
        if cursor.index >= cursor.plan.chunk_count {
            return None;
        }

        let offset = cursor.plan.chunk_offset(cursor.index);
        let read = cursor
            .connection
            .read_chunk(&cursor.file, offset, cursor.plan.chunk_size as usize)
            .await;

        let chunk = match read {
            Ok(chunk) => chunk,
            Err(source) => return Some((Err(StreamError::Transport { offset, source }), None)),
        };

        match cursor.plan.trim(cursor.index, chunk) {
            Ok(bytes) => {
                trace!(
                    "Chunk {}/{} of message {}: {} bytes",
                    cursor.index + 1,
                    cursor.plan.chunk_count,
                    cursor.file.message_id,
                    bytes.len()
                );
                cursor.index += 1;
                Some((Ok(bytes), Some(cursor)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}
