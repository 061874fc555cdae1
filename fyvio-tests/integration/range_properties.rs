//! Property tests: any accepted range yields exactly the requested bytes

use axum::body::{Body, to_bytes};
use axum::http::header::{CONTENT_LENGTH, RANGE};
use axum::http::{Request, StatusCode};
use fyvio_tests::{TestGateway, pattern, stream_path, video};
use proptest::prelude::*;
use tower::ServiceExt;

const FILE_SIZE: usize = 2_000;

fn fetch(
    runtime: &tokio::runtime::Runtime,
    gateway: &TestGateway,
    range: &str,
) -> (StatusCode, Option<u64>, Vec<u8>) {
    runtime.block_on(async {
        let request = Request::builder()
            .uri(stream_path(1))
            .header(RANGE, range)
            .body(Body::empty())
            .unwrap();
        let response = gateway.router().oneshot(request).await.unwrap();
        let status = response.status();
        let length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, length, body.to_vec())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_body_matches_requested_range(
        chunk_size in 1u64..700,
        start in 0usize..FILE_SIZE,
        len in 1usize..FILE_SIZE,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let gateway = TestGateway::new(2, chunk_size, &[video(1, FILE_SIZE)]);
        let end = (start + len - 1).min(FILE_SIZE - 1);

        let (status, length, body) = fetch(&runtime, &gateway, &format!("bytes={start}-{end}"));

        prop_assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        prop_assert_eq!(length, Some((end - start + 1) as u64));
        prop_assert_eq!(body, pattern(FILE_SIZE)[start..=end].to_vec());
        prop_assert_eq!(gateway.workloads(), vec![0, 0]);
    }

    #[test]
    fn prop_start_past_end_is_unsatisfiable(
        start in FILE_SIZE..FILE_SIZE * 4,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let gateway = TestGateway::new(1, 64, &[video(1, FILE_SIZE)]);

        let (status, _, body) = fetch(&runtime, &gateway, &format!("bytes={start}-"));

        prop_assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        prop_assert!(body.is_empty());
    }
}
