//! Per-connection byte streamers and their cache.
//!
//! A [`ByteStreamer`] wraps one backend connection together with a small
//! LRU of resolved file properties, so repeated range requests for the same
//! message (players seek constantly) skip the metadata round trip.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::backend::{BackendConnection, BackendError, FileProperties};
use crate::chunk::{ChunkPlan, ChunkStream, chunk_stream};
use crate::pool::PooledConnection;

type PropertiesKey = (i64, i64);

/// Streams file bytes over a single backend connection.
pub struct ByteStreamer {
    connection: Arc<dyn BackendConnection>,
    properties: Mutex<LruCache<PropertiesKey, Arc<FileProperties>>>,
}

impl ByteStreamer {
    /// Creates a streamer bound to `connection`.
    pub fn new(connection: Arc<dyn BackendConnection>, cache_capacity: NonZeroUsize) -> Self {
        Self {
            connection,
            properties: Mutex::new(LruCache::new(cache_capacity)),
        }
    }

    /// Backend session this streamer reads through.
    pub fn connection(&self) -> &Arc<dyn BackendConnection> {
        &self.connection
    }

    /// Resolves the file attached to a message, consulting the cache first.
    ///
    /// `chat_id` must already be in backend form.
    ///
    /// # Errors
    ///
    /// - `BackendError::NotFound` - Message absent or carries no media
    /// - `BackendError::PermissionDenied` - Connection cannot read the chat
    /// - `BackendError::Transport` - Network or backend failure
    pub async fn file_properties(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Arc<FileProperties>, BackendError> {
        let key = (chat_id, message_id);
        if let Some(hit) = self.properties.lock().get(&key) {
            debug!("Properties cache hit for {}/{}", chat_id, message_id);
            return Ok(Arc::clone(hit));
        }

        debug!(
            "Resolving {}/{} via {}",
            chat_id,
            message_id,
            self.connection.name()
        );
        let resolved = Arc::new(self.connection.file_properties(chat_id, message_id).await?);
        self.properties.lock().put(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Number of cached file properties.
    pub fn cached_properties(&self) -> usize {
        self.properties.lock().len()
    }

    /// Starts a lazy stream of the bytes described by `plan`.
    pub fn stream(&self, file: Arc<FileProperties>, plan: ChunkPlan) -> ChunkStream {
        Box::pin(chunk_stream(Arc::clone(&self.connection), file, plan))
    }
}

impl std::fmt::Debug for ByteStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStreamer")
            .field("connection", &self.connection.name())
            .field("cached_properties", &self.cached_properties())
            .finish()
    }
}

/// Lazily built streamers, one per pooled connection.
///
/// Entries live for the process lifetime; the pool is fixed so the map never
/// grows past the number of connections.
#[derive(Debug)]
pub struct StreamerCache {
    streamers: Mutex<HashMap<usize, Arc<ByteStreamer>>>,
    properties_capacity: NonZeroUsize,
}

impl StreamerCache {
    /// Creates an empty cache whose streamers hold `properties_capacity`
    /// resolved files each.
    pub fn new(properties_capacity: NonZeroUsize) -> Self {
        Self {
            streamers: Mutex::new(HashMap::new()),
            properties_capacity,
        }
    }

    /// Returns the streamer for `connection`, creating it on first use.
    ///
    /// Concurrent callers for the same connection always observe the same
    /// instance.
    pub fn get_or_create(&self, connection: &PooledConnection) -> Arc<ByteStreamer> {
        let mut streamers = self.streamers.lock();
        let streamer = streamers.entry(connection.index()).or_insert_with(|| {
            debug!(
                "Creating streamer for connection {} ({})",
                connection.index(),
                connection.connection().name()
            );
            Arc::new(ByteStreamer::new(
                Arc::clone(connection.connection()),
                self.properties_capacity,
            ))
        });
        Arc::clone(streamer)
    }

    /// Existing streamer for the connection at `index`, if one was created.
    pub fn get(&self, index: usize) -> Option<Arc<ByteStreamer>> {
        self.streamers.lock().get(&index).cloned()
    }

    /// Number of streamers created so far.
    pub fn len(&self) -> usize {
        self.streamers.lock().len()
    }

    /// Whether no streamer has been created yet.
    pub fn is_empty(&self) -> bool {
        self.streamers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::pool::ConnectionPool;

    #[derive(Default)]
    struct CountingConnection {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl BackendConnection for CountingConnection {
        fn name(&self) -> &str {
            "counting"
        }

        async fn file_properties(
            &self,
            chat_id: i64,
            message_id: i64,
        ) -> Result<FileProperties, BackendError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if message_id == 404 {
                return Err(BackendError::NotFound {
                    chat_id,
                    message_id,
                });
            }
            Ok(FileProperties {
                chat_id,
                message_id,
                unique_id: format!("uid{message_id:06}"),
                file_size: 64,
                mime_type: Some("video/mp4".to_string()),
                file_name: None,
            })
        }

        async fn read_chunk(
            &self,
            _file: &FileProperties,
            offset: u64,
            limit: usize,
        ) -> Result<Bytes, BackendError> {
            let len = (limit as u64).min(64u64.saturating_sub(offset)) as usize;
            Ok(Bytes::from(vec![7u8; len]))
        }
    }

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_properties_are_cached() {
        let backend = Arc::new(CountingConnection::default());
        let streamer = ByteStreamer::new(backend.clone(), capacity(4));

        let first = streamer.file_properties(-1001, 5).await.unwrap();
        let second = streamer.file_properties(-1001, 5).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(streamer.cached_properties(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookups_are_not_cached() {
        let backend = Arc::new(CountingConnection::default());
        let streamer = ByteStreamer::new(backend.clone(), capacity(4));

        assert!(streamer.file_properties(-1001, 404).await.is_err());
        assert!(streamer.file_properties(-1001, 404).await.is_err());
        assert_eq!(backend.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(streamer.cached_properties(), 0);
    }

    #[tokio::test]
    async fn test_properties_cache_evicts_least_recent() {
        let backend = Arc::new(CountingConnection::default());
        let streamer = ByteStreamer::new(backend.clone(), capacity(2));

        streamer.file_properties(-1001, 1).await.unwrap();
        streamer.file_properties(-1001, 2).await.unwrap();
        streamer.file_properties(-1001, 3).await.unwrap();
        assert_eq!(streamer.cached_properties(), 2);

        streamer.file_properties(-1001, 1).await.unwrap();
        assert_eq!(backend.lookups.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_cache_returns_same_streamer_per_connection() {
        let pool = ConnectionPool::new(vec![
            Arc::new(CountingConnection::default()) as Arc<dyn BackendConnection>,
            Arc::new(CountingConnection::default()),
        ]);
        let cache = StreamerCache::new(capacity(8));
        assert!(cache.is_empty());

        let a = cache.get_or_create(pool.get(0).unwrap());
        let b = cache.get_or_create(pool.get(1).unwrap());
        let a_again = cache.get_or_create(pool.get(0).unwrap());

        assert!(Arc::ptr_eq(&a, &a_again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(0).is_some());
        assert!(cache.get(2).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_yields_one_instance() {
        let pool = Arc::new(ConnectionPool::new(vec![
            Arc::new(CountingConnection::default()) as Arc<dyn BackendConnection>,
        ]));
        let cache = Arc::new(StreamerCache::new(capacity(8)));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_or_create(pool.get(0).unwrap()) })
            })
            .collect();

        let mut streamers = Vec::new();
        for task in tasks {
            streamers.push(task.await.unwrap());
        }

        assert_eq!(cache.len(), 1);
        assert!(streamers.iter().all(|s| Arc::ptr_eq(s, &streamers[0])));
    }
}
