//! End-to-end tests for Fyvio
//!
//! Run the gateway on a real socket and talk to it with an HTTP client, so
//! connection info, chunked transfer and client disconnects behave as they
//! do in production.

use std::net::SocketAddr;
use std::time::Duration;

use fyvio_tests::{TestGateway, pattern, stream_path, video};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};

async fn serve(gateway: &TestGateway) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = gateway
        .router()
        .into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn wait_for_workloads(gateway: &TestGateway, expected: &[usize]) {
    for _ in 0..500 {
        if gateway.workloads() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "workloads stuck at {:?}, expected {:?}",
        gateway.workloads(),
        expected
    );
}

#[tokio::test]
async fn test_partial_download_over_socket() {
    let gateway = TestGateway::new(2, 4096, &[video(1, 100_000)]);
    let base = serve(&gateway).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}{}", stream_path(1)))
        .header(RANGE, "bytes=5000-54999")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[CONTENT_RANGE], "bytes 5000-54999/100000");
    assert_eq!(response.headers()[CONTENT_LENGTH], "50000");
    let body = response.bytes().await.unwrap();
    assert_eq!(body.to_vec(), pattern(100_000)[5000..55000].to_vec());

    wait_for_workloads(&gateway, &[0, 0]).await;
}

#[tokio::test]
async fn test_status_reports_in_flight_stream() {
    let gateway = TestGateway::new(2, 1024, &[video(1, 64 * 1024)]);
    gateway.connections[0].set_read_delay(Some(Duration::from_millis(20)));
    let base = serve(&gateway).await;
    let client = reqwest::Client::new();

    let mut response = client
        .get(format!("{base}{}", stream_path(1)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.chunk().await.unwrap().is_some());

    let status: serde_json::Value = client
        .get(format!("{base}/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["connected_connections"], 2);
    assert_eq!(status["loads"]["connection1"], 1);
    assert_eq!(status["loads"]["connection2"], 0);

    drop(response);
}

#[tokio::test]
async fn test_client_disconnect_releases_workload() {
    let gateway = TestGateway::new(1, 1024, &[video(1, 256 * 1024)]);
    gateway.connections[0].set_read_delay(Some(Duration::from_millis(20)));
    let base = serve(&gateway).await;

    let mut response = reqwest::get(format!("{base}{}", stream_path(1)))
        .await
        .unwrap();
    assert!(response.chunk().await.unwrap().is_some());
    assert_eq!(gateway.workloads(), vec![1]);

    drop(response);
    wait_for_workloads(&gateway, &[0]).await;

    // 256 chunks at 20ms each would take seconds; the reads stopped early
    let reads_after_disconnect = gateway.connections[0].read_count();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gateway.connections[0].read_count(), reads_after_disconnect);
    assert!(reads_after_disconnect < 256);
}
