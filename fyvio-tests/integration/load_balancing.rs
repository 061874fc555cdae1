//! Workload-based connection selection across requests

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use fyvio_tests::{TestGateway, pattern, stream_path, video};
use tower::ServiceExt;

async fn open(gateway: &TestGateway, message_id: i64) -> Response {
    let request = Request::builder()
        .uri(stream_path(message_id))
        .body(Body::empty())
        .unwrap();
    let response = gateway.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response
}

#[tokio::test]
async fn test_in_flight_streams_spread_across_connections() {
    let gateway = TestGateway::new(3, 64, &[video(1, 500)]);

    let first = open(&gateway, 1).await;
    let second = open(&gateway, 1).await;
    let third = open(&gateway, 1).await;
    assert_eq!(gateway.workloads(), vec![1, 1, 1]);

    let fourth = open(&gateway, 1).await;
    assert_eq!(gateway.workloads(), vec![2, 1, 1]);

    drop(second);
    assert_eq!(gateway.workloads(), vec![2, 0, 1]);

    // The freed connection is preferred next
    let fifth = open(&gateway, 1).await;
    assert_eq!(gateway.workloads(), vec![2, 1, 1]);

    for response in [first, third, fourth, fifth] {
        assert_eq!(
            to_bytes(response.into_body(), usize::MAX).await.unwrap(),
            pattern(500)
        );
    }
    assert_eq!(gateway.workloads(), vec![0, 0, 0]);
}

#[tokio::test]
async fn test_one_streamer_per_connection() {
    let gateway = TestGateway::new(2, 64, &[video(1, 500), video(2, 300)]);

    for message_id in [1, 2, 1, 2, 1] {
        let response = open(&gateway, message_id).await;
        to_bytes(response.into_body(), usize::MAX).await.unwrap();
    }

    // Sequential requests always find connection 0 idle
    let streamers = gateway.state.gateway.streamers();
    assert_eq!(streamers.len(), 1);
    assert_eq!(streamers.get(0).unwrap().cached_properties(), 2);
    assert_eq!(gateway.connections[0].lookup_count(), 2);
    assert_eq!(gateway.connections[1].lookup_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_release_all_workload() {
    let gateway = Arc::new(TestGateway::new(4, 64, &[video(1, 500)]));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let router = gateway.router();
            tokio::spawn(async move {
                let request = Request::builder()
                    .uri(stream_path(1))
                    .header("range", "bytes=100-399")
                    .body(Body::empty())
                    .unwrap();
                let response = router.oneshot(request).await.unwrap();
                assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
                to_bytes(response.into_body(), usize::MAX).await.unwrap()
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), pattern(500)[100..400].to_vec());
    }

    assert_eq!(gateway.workloads(), vec![0, 0, 0, 0]);
    // Range 100..=399 with 64-byte chunks spans chunks 1 through 6
    let total_reads: usize = gateway.connections.iter().map(|c| c.read_count()).sum();
    assert_eq!(total_reads, 32 * 6);
}
