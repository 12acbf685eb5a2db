//! `Range` header resolution against a known content length.

/// Byte interval to serve for one request.
///
/// When `has_range` is set, `start <= end <= size - 1` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub has_range: bool,
    pub start: u64,
    pub end: u64,
}

impl RangeRequest {
    pub fn full(size: u64) -> Self {
        Self {
            has_range: false,
            start: 0,
            end: size.saturating_sub(1),
        }
    }

    /// Number of bytes covered; zero for a full request on an empty file.
    pub fn len(&self, size: u64) -> u64 {
        if self.has_range {
            self.end - self.start + 1
        } else {
            size
        }
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Resolve a raw `Range` header.
///
/// Only `bytes=<start>-<end>` and `bytes=<start>-` are honoured. Anything else
/// (absent, other units, suffix ranges, multiple ranges, garbage, a start
/// past EOF) degrades to the full file. An end past EOF is clamped.
pub fn resolve_range(header: Option<&str>, size: u64) -> RangeRequest {
    header
        .and_then(|h| parse_bounds(h, size))
        .map(|(start, end)| RangeRequest {
            has_range: true,
            start,
            end,
        })
        .unwrap_or_else(|| RangeRequest::full(size))
}

fn parse_bounds(header: &str, size: u64) -> Option<(u64, u64)> {
    if size == 0 {
        return None;
    }
    let bounds = header.trim().strip_prefix("bytes=")?;
    let (start, end) = bounds.split_once('-')?;

    let start: u64 = start.trim().parse().ok()?;
    let last = size - 1;
    let end = match end.trim() {
        "" => last,
        e => e.parse::<u64>().ok()?.min(last),
    };

    (start <= end).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranged(start: u64, end: u64) -> RangeRequest {
        RangeRequest {
            has_range: true,
            start,
            end,
        }
    }

    #[test]
    fn closed_range() {
        let r = resolve_range(Some("bytes=200-299"), 1000);
        assert_eq!(r, ranged(200, 299));
        assert_eq!(r.len(1000), 100);
        assert_eq!(r.content_range(1000), "bytes 200-299/1000");
    }

    #[test]
    fn open_end_runs_to_eof() {
        let r = resolve_range(Some("bytes=900-"), 1000);
        assert_eq!(r, ranged(900, 999));
        assert_eq!(r.len(1000), 100);
    }

    #[test]
    fn end_past_eof_is_clamped() {
        assert_eq!(resolve_range(Some("bytes=0-5000"), 1000), ranged(0, 999));
        assert_eq!(
            resolve_range(Some(&format!("bytes=10-{}", u64::MAX)), 1000),
            ranged(10, 999)
        );
    }

    #[test]
    fn single_byte_ranges() {
        assert_eq!(resolve_range(Some("bytes=0-0"), 1000), ranged(0, 0));
        assert_eq!(resolve_range(Some("bytes=999-"), 1000), ranged(999, 999));
    }

    #[test]
    fn absent_header_is_full_file() {
        let r = resolve_range(None, 1000);
        assert!(!r.has_range);
        assert_eq!(r.len(1000), 1000);
    }

    #[test]
    fn malformed_headers_fall_back_to_full_file() {
        for header in [
            "",
            "bytes",
            "bytes=",
            "bytes=-",
            "bytes=-500",
            "bytes=abc-def",
            "bytes=10-abc",
            "items=0-10",
            "bytes=0-1,5-6",
            "bytes=500-100",
            "bytes=1000-",
            "bytes=5000-6000",
        ] {
            let r = resolve_range(Some(header), 1000);
            assert!(!r.has_range, "{header:?} should not produce a range");
            assert_eq!(r.start, 0);
            assert_eq!(r.end, 999);
        }
    }

    #[test]
    fn empty_file_never_ranges() {
        let r = resolve_range(Some("bytes=0-0"), 0);
        assert!(!r.has_range);
        assert_eq!(r.len(0), 0);
    }

    #[test]
    fn tolerates_whitespace() {
        assert_eq!(resolve_range(Some(" bytes=1 - 2 "), 10), ranged(1, 2));
    }
}
