//! Shared fixtures for Fyvio integration and end-to-end tests.

use std::num::NonZeroU64;
use std::sync::Arc;

use fyvio_core::config::FyvioConfig;
use fyvio_core::{AccessToken, BackendConnection, ConnectionPool};
use fyvio_sim::{InMemoryConnection, MediaFixture};
use fyvio_web::AppState;

/// Short channel id used in test tokens.
pub const CHANNEL: i64 = 1234;

/// `CHANNEL` as the backend addresses it.
pub const BACKEND_CHAT: i64 = -1001234;

/// Deterministic file contents: byte `i` is `i % 251`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// A media fixture in the test channel whose unique id starts with `abc123`.
pub fn video(message_id: i64, len: usize) -> MediaFixture {
    MediaFixture::new(
        BACKEND_CHAT,
        message_id,
        format!("abc123-{message_id}"),
        pattern(len),
    )
    .with_mime_type("video/mp4")
    .with_file_name(format!("video{message_id}.mp4"))
}

/// Token that unlocks `video(message_id, _)`.
pub fn token_for(message_id: i64) -> String {
    AccessToken::new(CHANNEL, message_id, "abc123").encode()
}

/// Stream path for `video(message_id, _)`.
pub fn stream_path(message_id: i64) -> String {
    format!("/stream/{}/video{message_id}.mp4", token_for(message_id))
}

/// Gateway state over in-memory connections that all hold the same media.
pub struct TestGateway {
    /// State to build a router from
    pub state: AppState,
    /// Connections in registration order
    pub connections: Vec<Arc<InMemoryConnection>>,
}

impl TestGateway {
    /// Builds `connection_count` connections, each serving `media`.
    pub fn new(connection_count: usize, chunk_size: u64, media: &[MediaFixture]) -> Self {
        let connections: Vec<Arc<InMemoryConnection>> = (0..connection_count)
            .map(|n| {
                let connection = InMemoryConnection::new(format!("sim-{n}"));
                for fixture in media {
                    connection.add_media(fixture.clone());
                }
                Arc::new(connection)
            })
            .collect();

        let backends = connections
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn BackendConnection>)
            .collect();
        let chunk_size = NonZeroU64::new(chunk_size).expect("chunk size must be non-zero");
        let state = AppState::new(
            FyvioConfig::for_testing(chunk_size),
            Arc::new(ConnectionPool::new(backends)),
        );

        Self { state, connections }
    }

    /// Router over this gateway's state.
    pub fn router(&self) -> axum::Router {
        fyvio_web::create_router(self.state.clone())
    }

    /// Workload per connection, in registration order.
    pub fn workloads(&self) -> Vec<usize> {
        self.state
            .gateway
            .pool()
            .workloads()
            .into_iter()
            .map(|(_, load)| load)
            .collect()
    }
}
