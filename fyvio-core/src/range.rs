//! HTTP `Range` resolution against a known file size.
//!
//! Only the single-range `bytes=<start>-[<end>]` form is served. Anything
//! else that arrives in a `Range` header is answered with 416 rather than
//! silently falling back to the full body, since a player that sent a range
//! expects the bytes it asked for.

use axum::http::StatusCode;

/// Inclusive, zero-based byte interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered, `end - start + 1`.
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a 206 response.
    pub fn content_range(&self, file_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, file_size)
    }
}

/// Outcome of resolving a request against a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedRange {
    /// No `Range` header: the whole file, status 200.
    Full(ByteRange),
    /// Valid `Range` header, status 206.
    Partial(ByteRange),
    /// No `Range` header on a zero-length file: empty 200.
    Empty,
}

impl ResolvedRange {
    /// Bytes to send, if any.
    pub fn byte_range(&self) -> Option<ByteRange> {
        match self {
            ResolvedRange::Full(range) | ResolvedRange::Partial(range) => Some(*range),
            ResolvedRange::Empty => None,
        }
    }

    /// Value of the `Content-Length` header.
    pub fn content_length(&self) -> u64 {
        self.byte_range().map_or(0, |range| range.content_length())
    }

    /// Response status for this outcome.
    pub fn status(&self) -> StatusCode {
        match self {
            ResolvedRange::Partial(_) => StatusCode::PARTIAL_CONTENT,
            ResolvedRange::Full(_) | ResolvedRange::Empty => StatusCode::OK,
        }
    }

    /// Whether this is a partial-content response.
    pub fn is_partial(&self) -> bool {
        matches!(self, ResolvedRange::Partial(_))
    }
}

/// The requested range cannot be served from this file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Range not satisfiable for file of {file_size} bytes")]
pub struct RangeNotSatisfiable {
    pub file_size: u64,
}

impl RangeNotSatisfiable {
    /// `Content-Range` header value for a 416 response.
    pub fn content_range(&self) -> String {
        format!("bytes */{}", self.file_size)
    }
}

/// Resolves an optional raw `Range` header against `file_size`.
///
/// The upper bound check is `end > file_size` (one past the last byte is
/// still accepted) and `end` is clamped to the last byte afterwards.
///
/// # Errors
///
/// - `RangeNotSatisfiable` - Header is malformed, starts past the end, is
///   inverted, or targets a zero-length file
pub fn resolve_range(
    header: Option<&str>,
    file_size: u64,
) -> Result<ResolvedRange, RangeNotSatisfiable> {
    let unsatisfiable = RangeNotSatisfiable { file_size };

    let Some(header) = header else {
        if file_size == 0 {
            return Ok(ResolvedRange::Empty);
        }
        return Ok(ResolvedRange::Full(ByteRange {
            start: 0,
            end: file_size - 1,
        }));
    };

    if file_size == 0 {
        return Err(unsatisfiable);
    }

    let (start, end) = parse_bytes_spec(header).ok_or(unsatisfiable)?;
    let end = end.unwrap_or(file_size - 1);

    if end > file_size || end < start {
        return Err(unsatisfiable);
    }

    let end = end.min(file_size - 1);
    // `bytes=N-N` with N == file_size passes the check above but leaves nothing to send
    if start > end {
        return Err(unsatisfiable);
    }

    Ok(ResolvedRange::Partial(ByteRange { start, end }))
}

/// Splits `bytes=<start>-[<end>]` into its numbers.
fn parse_bytes_spec(header: &str) -> Option<(u64, Option<u64>)> {
    let spec = header.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;

    let start = start.trim().parse::<u64>().ok()?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse::<u64>().ok()?),
    };

    Some((start, end))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_no_header_is_full_content() {
        let resolved = resolve_range(None, 500).unwrap();
        assert_eq!(resolved, ResolvedRange::Full(ByteRange { start: 0, end: 499 }));
        assert_eq!(resolved.status(), StatusCode::OK);
        assert_eq!(resolved.content_length(), 500);
        assert!(!resolved.is_partial());
    }

    #[test]
    fn test_open_ended_range() {
        let resolved = resolve_range(Some("bytes=0-"), 500).unwrap();
        let range = resolved.byte_range().unwrap();
        assert_eq!(resolved.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(range.content_range(500), "bytes 0-499/500");
        assert_eq!(resolved.content_length(), 500);
    }

    #[test]
    fn test_closed_range() {
        let resolved = resolve_range(Some("bytes=100-199"), 1000).unwrap();
        assert_eq!(
            resolved,
            ResolvedRange::Partial(ByteRange {
                start: 100,
                end: 199
            })
        );
        assert_eq!(resolved.content_length(), 100);
    }

    #[test]
    fn test_over_range_is_unsatisfiable() {
        let err = resolve_range(Some("bytes=10000-20000"), 500).unwrap_err();
        assert_eq!(err.content_range(), "bytes */500");
    }

    #[test]
    fn test_end_equal_to_size_is_clamped() {
        let resolved = resolve_range(Some("bytes=100-500"), 500).unwrap();
        assert_eq!(
            resolved.byte_range(),
            Some(ByteRange {
                start: 100,
                end: 499
            })
        );
    }

    #[test]
    fn test_start_at_size_is_unsatisfiable() {
        assert!(resolve_range(Some("bytes=500-500"), 500).is_err());
        assert!(resolve_range(Some("bytes=500-"), 500).is_err());
    }

    #[test]
    fn test_inverted_range_is_unsatisfiable() {
        assert!(resolve_range(Some("bytes=200-100"), 500).is_err());
    }

    #[test]
    fn test_malformed_headers_are_unsatisfiable() {
        for header in [
            "bytes=-100",
            "bytes=a-b",
            "items=0-10",
            "bytes=0-10,20-30",
            "bytes=-5-10",
            "",
        ] {
            assert!(
                resolve_range(Some(header), 500).is_err(),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_zero_length_file() {
        assert_eq!(resolve_range(None, 0).unwrap(), ResolvedRange::Empty);
        assert_eq!(resolve_range(None, 0).unwrap().content_length(), 0);
        assert!(resolve_range(Some("bytes=0-"), 0).is_err());
    }

    #[test]
    fn test_whitespace_is_tolerated() {
        let resolved = resolve_range(Some(" bytes= 5 - 9 "), 100).unwrap();
        assert_eq!(resolved.byte_range(), Some(ByteRange { start: 5, end: 9 }));
    }

    proptest! {
        #[test]
        fn prop_accepted_ranges_stay_in_bounds(
            file_size in 1u64..10_000_000,
            start in 0u64..10_000_000,
            end in proptest::option::of(0u64..10_000_000),
        ) {
            let header = match end {
                Some(end) => format!("bytes={start}-{end}"),
                None => format!("bytes={start}-"),
            };
            if let Ok(resolved) = resolve_range(Some(&header), file_size) {
                let range = resolved.byte_range().unwrap();
                prop_assert!(range.start <= range.end);
                prop_assert!(range.end < file_size);
                prop_assert_eq!(resolved.content_length(), range.end - range.start + 1);
            }
        }
    }
}
