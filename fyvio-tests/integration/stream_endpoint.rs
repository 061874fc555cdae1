//! HTTP contract of the streaming and status routes

use axum::body::{Body, to_bytes};
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::Response;
use fyvio_core::AccessToken;
use fyvio_sim::{MediaFixture, SimulatedFault};
use fyvio_tests::{BACKEND_CHAT, CHANNEL, TestGateway, pattern, stream_path, token_for, video};
use tower::ServiceExt;

async fn get(gateway: &TestGateway, uri: &str, range: Option<&str>) -> Response {
    let mut request = Request::builder().uri(uri);
    if let Some(range) = range {
        request = request.header(RANGE, range);
    }
    gateway
        .router()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn error_message(response: Response) -> String {
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    json["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_full_file_without_range() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    let response = get(&gateway, &stream_path(1), None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_LENGTH], "500");
    assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        "inline; filename=\"video1.mp4\""
    );
    assert!(response.headers().get(CONTENT_RANGE).is_none());
    assert_eq!(body_bytes(response).await, pattern(500));
}

#[tokio::test]
async fn test_open_ended_range() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    let response = get(&gateway, &stream_path(1), Some("bytes=0-")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 0-499/500");
    assert_eq!(response.headers()[CONTENT_LENGTH], "500");
    assert_eq!(body_bytes(response).await, pattern(500));
}

#[tokio::test]
async fn test_mid_file_range_is_trimmed_exactly() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    let response = get(&gateway, &stream_path(1), Some("bytes=70-200")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 70-200/500");
    assert_eq!(response.headers()[CONTENT_LENGTH], "131");
    assert_eq!(body_bytes(response).await, pattern(500)[70..=200].to_vec());
}

#[tokio::test]
async fn test_over_range_is_416_with_empty_body() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    let response = get(&gateway, &stream_path(1), Some("bytes=10000-20000")).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes */500");
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(gateway.connections[0].read_count(), 0);
}

#[tokio::test]
async fn test_non_ascii_range_is_416() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    let request = Request::builder()
        .uri(stream_path(1))
        .header(RANGE, HeaderValue::from_bytes(b"bytes=0-1\xff").unwrap())
        .body(Body::empty())
        .unwrap();
    let response = gateway.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes */500");
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(gateway.connections[0].read_count(), 0);
}

#[tokio::test]
async fn test_hash_mismatch_sends_no_bytes() {
    let fixture = MediaFixture::new(BACKEND_CHAT, 1, "xyz999qqq", pattern(500));
    let gateway = TestGateway::new(1, 64, &[fixture]);
    let response = get(&gateway, &stream_path(1), None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "Invalid hash");
    assert_eq!(gateway.connections[0].read_count(), 0);
    assert_eq!(gateway.workloads(), vec![0]);
}

#[tokio::test]
async fn test_malformed_tokens_are_400() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);

    let response = get(&gateway, "/stream/not-a-token!/x.mp4", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing_hash = AccessToken::new(CHANNEL, 1, "").encode();
    let response = get(&gateway, &format!("/stream/{missing_hash}/x.mp4"), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "Missing id or hash");

    assert_eq!(gateway.connections[0].lookup_count(), 0);
}

#[tokio::test]
async fn test_unknown_message_is_404() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    let response = get(&gateway, &stream_path(2), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_denied_chat_is_403() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    gateway.connections[0].deny_chat(BACKEND_CHAT);
    let response = get(&gateway, &stream_path(1), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_backend_lookup_failure_is_502() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    gateway.connections[0].set_fault(SimulatedFault::FailLookups);
    let response = get(&gateway, &stream_path(1), None).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(gateway.workloads(), vec![0]);
}

#[tokio::test]
async fn test_empty_pool_is_503() {
    let gateway = TestGateway::new(0, 64, &[]);
    let response = get(&gateway, &stream_path(1), None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_mid_stream_failure_aborts_body() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    gateway.connections[0].set_fault(SimulatedFault::FailReadsAfter(2));

    let response = get(&gateway, &stream_path(1), None).await;
    // Headers were committed before the failing read
    assert_eq!(response.status(), StatusCode::OK);
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
    assert_eq!(gateway.connections[0].read_count(), 3);
    assert_eq!(gateway.workloads(), vec![0]);
}

#[tokio::test]
async fn test_legacy_dl_route() {
    let gateway = TestGateway::new(1, 64, &[video(1, 500)]);
    let uri = format!("/dl/{}/whatever.mp4", token_for(1));
    let response = get(&gateway, &uri, Some("bytes=490-")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(response).await, pattern(500)[490..].to_vec());
}

#[tokio::test]
async fn test_zero_length_file() {
    let gateway = TestGateway::new(1, 64, &[video(1, 0)]);

    let response = get(&gateway, &stream_path(1), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_LENGTH], "0");
    assert!(body_bytes(response).await.is_empty());

    let response = get(&gateway, &stream_path(1), Some("bytes=0-")).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes */0");
}

#[tokio::test]
async fn test_synthesized_file_name() {
    let fixture = MediaFixture::new(BACKEND_CHAT, 1, "abc123zz", pattern(10))
        .with_mime_type("video/webm");
    let gateway = TestGateway::new(1, 64, &[fixture]);
    let response = get(&gateway, &stream_path(1), None).await;

    let disposition = response.headers()[CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("inline; filename=\""));
    assert!(disposition.ends_with(".webm\""));
    assert_eq!(disposition.len(), "inline; filename=\"abcd.webm\"".len());
}

#[tokio::test]
async fn test_status_route() {
    let gateway = TestGateway::new(3, 64, &[video(1, 500)]);
    let response = get(&gateway, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["server_status"], "running");
    assert_eq!(json["connected_connections"], 3);
    assert_eq!(json["loads"]["connection1"], 0);
    assert_eq!(json["loads"]["connection3"], 0);
    assert!(json["uptime"].as_str().unwrap().ends_with('s'));
    assert!(json["version"].is_string());
}
