//! Serving a local directory through the full router

use std::num::NonZeroU64;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{Request, StatusCode};
use fyvio_core::config::FyvioConfig;
use fyvio_core::{AccessToken, BackendConnection, ConnectionPool};
use fyvio_sim::{LocalLibrary, LocalLibraryConnection};
use fyvio_tests::pattern;
use fyvio_web::{AppState, create_router};
use tempfile::TempDir;
use tower::ServiceExt;

async fn library_router(files: &[(&str, Vec<u8>)]) -> (TempDir, Arc<LocalLibrary>, axum::Router) {
    let dir = TempDir::new().unwrap();
    for (name, data) in files {
        tokio::fs::write(dir.path().join(name), data).await.unwrap();
    }

    let library = Arc::new(LocalLibrary::scan(dir.path(), 7).await.unwrap());
    let backends: Vec<Arc<dyn BackendConnection>> = (0..2)
        .map(|n| {
            Arc::new(LocalLibraryConnection::new(
                format!("local-{n}"),
                Arc::clone(&library),
            )) as Arc<dyn BackendConnection>
        })
        .collect();

    let config = FyvioConfig::for_testing(NonZeroU64::new(1000).unwrap());
    let state = AppState::new(config, Arc::new(ConnectionPool::new(backends)));
    (dir, library, create_router(state))
}

fn token(library: &LocalLibrary, message_id: i64) -> String {
    let entry = library.entry(message_id).unwrap();
    AccessToken::for_file(
        library.channel_id(),
        message_id,
        &entry.properties.unique_id,
    )
    .encode()
}

#[tokio::test]
async fn test_range_over_file_on_disk() {
    let movie = pattern(10_000);
    let (_dir, library, router) =
        library_router(&[("movie.mp4", movie.clone()), ("notes.txt", b"hi".to_vec())]).await;

    let request = Request::builder()
        .uri(format!("/stream/{}/movie.mp4", token(&library, 1)))
        .header(RANGE, "bytes=1500-7999")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 1500-7999/10000");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, movie[1500..8000].to_vec());
}

#[tokio::test]
async fn test_token_for_other_file_is_rejected() {
    let (_dir, library, router) = library_router(&[
        ("a.mp4", pattern(100)),
        ("b.mp4", pattern(200)),
    ])
    .await;

    // Hash of file 2 presented for message 1
    let forged = AccessToken::for_file(
        library.channel_id(),
        1,
        &library.entry(2).unwrap().properties.unique_id,
    )
    .encode();

    let request = Request::builder()
        .uri(format!("/stream/{forged}/a.mp4"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
