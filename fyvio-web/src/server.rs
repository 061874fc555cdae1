//! Axum server wiring for the streaming gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use chrono::{DateTime, Utc};
use fyvio_core::config::FyvioConfig;
use fyvio_core::{ConnectionPool, StreamGateway};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers::{server_status, stream_media};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Request orchestrator, shared by all in-flight streams
    pub gateway: Arc<StreamGateway>,
    /// Monotonic start time for uptime reporting
    pub server_started_at: Instant,
    /// Wall-clock start time reported by the status route
    pub server_started_at_utc: DateTime<Utc>,
}

impl AppState {
    /// Builds state around a connection pool.
    pub fn new(config: FyvioConfig, pool: Arc<ConnectionPool>) -> Self {
        let gateway = StreamGateway::new(pool, config.streaming);
        Self {
            gateway: Arc::new(gateway),
            server_started_at: Instant::now(),
            server_started_at_utc: Utc::now(),
        }
    }
}

/// Creates the application router.
///
/// `/dl/...` is kept as an alias of `/stream/...` so previously shared links
/// keep working.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(server_status))
        .route("/stream/{token}/{name}", get(stream_media))
        .route("/dl/{token}/{name}", get(stream_media))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the configured address and serves until the process exits.
///
/// # Errors
///
/// - `std::io::Error` - Address could not be bound or the listener failed
pub async fn run_server(config: FyvioConfig, pool: Arc<ConnectionPool>) -> std::io::Result<()> {
    let addr = config.server.listen_addr();
    let connections = pool.len();
    let app = create_router(AppState::new(config, pool));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Fyvio gateway listening on http://{} with {} backend connection(s)",
        listener.local_addr()?,
        connections
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use fyvio_core::{AccessToken, BackendConnection};
    use fyvio_sim::{InMemoryConnection, MediaFixture};
    use tower::ServiceExt;

    use super::*;

    fn state() -> AppState {
        let connection = InMemoryConnection::new("sim-0").with_media(
            MediaFixture::new(-1001234, 9, "qwerty-uid", vec![42u8; 300])
                .with_mime_type("audio/mpeg"),
        );
        let pool = ConnectionPool::new(vec![Arc::new(connection) as Arc<dyn BackendConnection>]);
        AppState::new(
            FyvioConfig::for_testing(NonZeroU64::new(128).unwrap()),
            Arc::new(pool),
        )
    }

    #[tokio::test]
    async fn test_routes_are_mounted() {
        let token = AccessToken::new(1234, 9, "qwerty").encode();
        let app = create_router(state());

        for prefix in ["stream", "dl"] {
            let request = Request::builder()
                .uri(format!("/{prefix}/{token}/song.mp3"))
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(body.len(), 300);
        }

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let request = Request::builder()
            .uri("/stream/only-one-segment")
            .body(Body::empty())
            .unwrap();
        let response = create_router(state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
