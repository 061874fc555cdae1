//! Request orchestration: token in, headered byte stream out.
//!
//! [`StreamGateway::open`] runs every step that can fail before the first
//! body byte is produced, so an HTTP layer only has to map a
//! [`GatewayError`] to a status or turn a [`StreamResponse`] into headers
//! plus a streamed body.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, stream};
use tracing::{debug, info};

use crate::backend::BackendError;
use crate::chunk::{ChunkPlan, ChunkStream, StreamError};
use crate::config::StreamingConfig;
use crate::media::MediaPresentation;
use crate::pool::{ConnectionPool, WorkloadLease};
use crate::range::{RangeNotSatisfiable, ResolvedRange, resolve_range};
use crate::streamer::StreamerCache;
use crate::token::{AccessToken, DecodeError};

/// Reasons a stream request is refused before any body byte is sent.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid token: {0}")]
    Decode(#[from] DecodeError),

    #[error("No backend connections available")]
    NoConnections,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Invalid hash for message {message_id}")]
    InvalidHash { message_id: i64 },

    #[error(transparent)]
    RangeNotSatisfiable(#[from] RangeNotSatisfiable),
}

impl GatewayError {
    /// Whether the request itself is at fault.
    pub fn is_client_error(&self) -> bool {
        match self {
            GatewayError::Decode(_)
            | GatewayError::InvalidHash { .. }
            | GatewayError::RangeNotSatisfiable(_) => true,
            GatewayError::Backend(e) => !matches!(e, BackendError::Transport { .. }),
            GatewayError::NoConnections => false,
        }
    }
}

/// Everything needed to write a successful response.
pub struct StreamResponse {
    /// Served interval and whether it is partial
    pub range: ResolvedRange,
    /// Total size of the underlying file
    pub file_size: u64,
    /// Content type and file name
    pub media: MediaPresentation,
    /// Lazily produced body; holds the connection's workload lease
    pub body: ChunkStream,
}

impl StreamResponse {
    /// `Content-Range` value for partial responses.
    pub fn content_range(&self) -> Option<String> {
        match self.range {
            ResolvedRange::Partial(range) => Some(range.content_range(self.file_size)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("range", &self.range)
            .field("file_size", &self.file_size)
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}

/// Chunk stream that keeps its connection's workload lease alive.
struct LeasedBody {
    chunks: ChunkStream,
    _lease: WorkloadLease,
}

impl Stream for LeasedBody {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.as_mut().poll_next(cx)
    }
}

/// Shared entry point for stream requests.
#[derive(Debug)]
pub struct StreamGateway {
    pool: Arc<ConnectionPool>,
    cache: StreamerCache,
    config: StreamingConfig,
}

impl StreamGateway {
    /// Creates a gateway over a fixed connection pool.
    pub fn new(pool: Arc<ConnectionPool>, config: StreamingConfig) -> Self {
        Self {
            cache: StreamerCache::new(config.properties_cache_capacity),
            pool,
            config,
        }
    }

    /// Connection pool requests are balanced over.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Per-connection streamers created so far.
    pub fn streamers(&self) -> &StreamerCache {
        &self.cache
    }

    /// Validates a request and prepares its response body.
    ///
    /// The least-loaded connection is leased for as long as the returned
    /// body lives. On error the lease is released before returning.
    ///
    /// # Errors
    ///
    /// - `GatewayError::Decode` - Token malformed or incomplete
    /// - `GatewayError::NoConnections` - Pool is empty
    /// - `GatewayError::Backend` - File lookup failed
    /// - `GatewayError::InvalidHash` - Token hash does not match the file
    /// - `GatewayError::RangeNotSatisfiable` - Range header cannot be served
    pub async fn open(
        &self,
        token: &str,
        range_header: Option<&str>,
        client: Option<SocketAddr>,
    ) -> Result<StreamResponse, GatewayError> {
        let token = AccessToken::decode(token)?;
        let chat_id = token
            .backend_chat_id()
            .ok_or(DecodeError::ChatIdOutOfRange {
                chat_id: token.chat_id,
            })?;

        let lease = self.pool.acquire().ok_or(GatewayError::NoConnections)?;
        let connection_index = lease.connection().index();
        if self.config.multi_client {
            match client {
                Some(addr) => debug!("Connection {} is now serving {}", connection_index, addr),
                None => debug!("Connection {} is now serving a client", connection_index),
            }
        }

        let streamer = self.cache.get_or_create(lease.connection());
        let file = streamer.file_properties(chat_id, token.message_id).await?;

        if !file.matches_hash(&token.hash) {
            debug!(
                "Invalid hash for message with ID {} in chat {}",
                token.message_id, chat_id
            );
            return Err(GatewayError::InvalidHash {
                message_id: token.message_id,
            });
        }

        let range = resolve_range(range_header, file.file_size)?;
        let media = MediaPresentation::from_properties(&file);
        info!(
            "{}, {}, inline (message {}, {} bytes, connection {})",
            media.mime_type,
            media.file_name,
            token.message_id,
            range.content_length(),
            connection_index
        );

        let body: ChunkStream = match range.byte_range() {
            Some(byte_range) => {
                let plan = ChunkPlan::new(byte_range, self.config.chunk_size);
                Box::pin(LeasedBody {
                    chunks: streamer.stream(Arc::clone(&file), plan),
                    _lease: lease,
                })
            }
            None => Box::pin(stream::empty()),
        };

        Ok(StreamResponse {
            range,
            file_size: file.file_size,
            media,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::num::NonZeroU64;

    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;
    use crate::backend::{BackendConnection, FileProperties};
    use crate::range::ByteRange;

    const CHAT: i64 = 1234;
    const BACKEND_CHAT: i64 = -1001234;

    struct MapConnection {
        files: HashMap<i64, (FileProperties, Vec<u8>)>,
    }

    #[async_trait]
    impl BackendConnection for MapConnection {
        fn name(&self) -> &str {
            "map"
        }

        async fn file_properties(
            &self,
            chat_id: i64,
            message_id: i64,
        ) -> Result<FileProperties, BackendError> {
            if chat_id != BACKEND_CHAT {
                return Err(BackendError::PermissionDenied { chat_id });
            }
            self.files
                .get(&message_id)
                .map(|(props, _)| props.clone())
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
            let (_, data) = &self.files[&file.message_id];
            let start = (offset as usize).min(data.len());
            let end = (start + limit).min(data.len());
            Ok(Bytes::copy_from_slice(&data[start..end]))
        }
    }

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    fn gateway_with(sizes: &[(i64, usize)]) -> StreamGateway {
        let files = sizes
            .iter()
            .map(|&(message_id, size)| {
                let props = FileProperties {
                    chat_id: BACKEND_CHAT,
                    message_id,
                    unique_id: format!("abc123{message_id}"),
                    file_size: size as u64,
                    mime_type: Some("video/mp4".to_string()),
                    file_name: Some(format!("clip{message_id}.mp4")),
                };
                (message_id, (props, data(size)))
            })
            .collect();
        let connection: Arc<dyn BackendConnection> = Arc::new(MapConnection { files });
        let pool = ConnectionPool::new(vec![connection]);
        let config = crate::config::FyvioConfig::for_testing(NonZeroU64::new(64).unwrap());
        StreamGateway::new(Arc::new(pool), config.streaming)
    }

    fn token(message_id: i64, hash: &str) -> String {
        AccessToken::new(CHAT, message_id, hash).encode()
    }

    async fn drain(response: StreamResponse) -> Result<Vec<u8>, StreamError> {
        let mut body = response.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_full_file_without_range() {
        let gateway = gateway_with(&[(1, 500)]);
        let response = gateway.open(&token(1, "abc123"), None, None).await.unwrap();

        assert_eq!(
            response.range,
            ResolvedRange::Full(ByteRange { start: 0, end: 499 })
        );
        assert!(response.content_range().is_none());
        assert_eq!(response.media.file_name, "clip1.mp4");
        assert_eq!(drain(response).await.unwrap(), data(500));
    }

    #[tokio::test]
    async fn test_partial_range_body() {
        let gateway = gateway_with(&[(1, 500)]);
        let response = gateway
            .open(&token(1, "abc123"), Some("bytes=100-299"), None)
            .await
            .unwrap();

        assert_eq!(
            response.content_range().as_deref(),
            Some("bytes 100-299/500")
        );
        assert_eq!(drain(response).await.unwrap(), data(500)[100..300].to_vec());
    }

    #[tokio::test]
    async fn test_hash_mismatch_is_rejected() {
        let gateway = gateway_with(&[(1, 500)]);
        let err = gateway
            .open(&token(1, "xyz999"), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidHash { message_id: 1 }));
        assert!(err.is_client_error());
        assert_eq!(gateway.pool().workloads(), vec![(0, 0)]);
    }

    #[tokio::test]
    async fn test_missing_message_is_not_found() {
        let gateway = gateway_with(&[(1, 500)]);
        let err = gateway
            .open(&token(2, "abc123"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Backend(BackendError::NotFound { message_id: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_token_never_touches_pool() {
        let gateway = gateway_with(&[(1, 500)]);
        let err = gateway.open("%%%", None, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
        assert!(gateway.streamers().is_empty());
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let gateway = gateway_with(&[(1, 500)]);
        let err = gateway
            .open(&token(1, "abc123"), Some("bytes=10000-20000"), None)
            .await
            .unwrap_err();

        match err {
            GatewayError::RangeNotSatisfiable(e) => assert_eq!(e.content_range(), "bytes */500"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gateway.pool().workloads(), vec![(0, 0)]);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let gateway = gateway_with(&[(1, 0)]);
        let response = gateway.open(&token(1, "abc123"), None, None).await.unwrap();
        assert_eq!(response.range, ResolvedRange::Empty);
        assert!(drain(response).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lease_lives_as_long_as_body() {
        let gateway = gateway_with(&[(1, 500)]);
        let response = gateway.open(&token(1, "abc123"), None, None).await.unwrap();
        assert_eq!(gateway.pool().workloads(), vec![(0, 1)]);

        drop(response);
        assert_eq!(gateway.pool().workloads(), vec![(0, 0)]);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let gateway = StreamGateway::new(
            Arc::new(ConnectionPool::default()),
            StreamingConfig::default(),
        );
        let err = gateway
            .open(&token(1, "abc123"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoConnections));
        assert!(!err.is_client_error());
    }
}
