use std::fmt;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::ContentRange;
use axum_extra::TypedHeader;

/// A closed byte interval `[start, end]` within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a new byte range. Both bounds are inclusive.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        ByteRange { start, end }
    }

    /// The range covering every byte of a non-empty file.
    pub fn whole(size: u64) -> Option<Self> {
        size.checked_sub(1).map(|last| ByteRange::new(0, last))
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` for this span of a file of `size` bytes.
    pub fn content_range(&self, size: u64) -> ContentRange {
        ContentRange::bytes(self.start..=self.end, size)
            .unwrap_or_else(|_| ContentRange::unsatisfied_bytes(size))
    }

    /// Value for an outbound `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A client `Range` header that parsed, but has not yet been checked
/// against the size of the file it addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// `bytes=<start>-` or `bytes=<start>-<end>`
    From { start: u64, end: Option<u64> },
    /// `bytes=-<n>`: the final `n` bytes.
    Suffix(u64),
}

/// The `Range` header could not be parsed at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed range header: {0:?}")]
pub struct MalformedRange(pub String);

impl RangeRequest {
    pub fn from_header(value: &HeaderValue) -> Result<Self, MalformedRange> {
        let value = value
            .to_str()
            .map_err(|_| MalformedRange(String::from_utf8_lossy(value.as_bytes()).into_owned()))?;
        Self::parse(value)
    }

    /// Parse a `Range` header value.
    ///
    /// Only the first spec of a multi-range set is kept; a single-part
    /// response covering one of the requested ranges is a valid answer.
    pub fn parse(header: &str) -> Result<Self, MalformedRange> {
        let malformed = || MalformedRange(header.to_string());

        let (unit, set) = header.trim().split_once('=').ok_or_else(malformed)?;
        if !unit.trim().eq_ignore_ascii_case("bytes") {
            return Err(malformed());
        }

        let first = set.split(',').next().unwrap_or_default().trim();
        let (start, end) = first.split_once('-').ok_or_else(malformed)?;
        let (start, end) = (start.trim(), end.trim());

        match (start.is_empty(), end.is_empty()) {
            (true, true) => Err(malformed()),
            (true, false) => {
                let n = parse_pos(end).ok_or_else(malformed)?;
                Ok(RangeRequest::Suffix(n))
            }
            (false, true) => {
                let start = parse_pos(start).ok_or_else(malformed)?;
                Ok(RangeRequest::From { start, end: None })
            }
            (false, false) => {
                let start = parse_pos(start).ok_or_else(malformed)?;
                let end = parse_pos(end).ok_or_else(malformed)?;
                if start > end {
                    return Err(malformed());
                }
                Ok(RangeRequest::From { start, end: Some(end) })
            }
        }
    }

    /// Check the request against a file of `size` bytes.
    ///
    /// A last-byte-pos at or past the end of the file is clamped to the
    /// final byte. A first-byte-pos at or past the end is unsatisfiable, as
    /// is every range against an empty file.
    pub fn resolve(self, size: u64) -> Result<ByteRange, RangeNotSatisfiable> {
        let unsatisfiable = || RangeNotSatisfiable::for_size(size);
        let last = size.checked_sub(1).ok_or_else(unsatisfiable)?;

        match self {
            RangeRequest::From { start, end } => {
                if start > last {
                    return Err(unsatisfiable());
                }
                let end = end.map_or(last, |end| end.min(last));
                if start > end {
                    return Err(unsatisfiable());
                }
                Ok(ByteRange::new(start, end))
            }
            RangeRequest::Suffix(0) => Err(unsatisfiable()),
            RangeRequest::Suffix(n) => Ok(ByteRange::new(size.saturating_sub(n), last)),
        }
    }
}

fn parse_pos(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
#[derive(Debug, Clone, PartialEq)]
pub struct RangeNotSatisfiable(pub ContentRange);

impl RangeNotSatisfiable {
    pub fn for_size(size: u64) -> Self {
        RangeNotSatisfiable(ContentRange::unsatisfied_bytes(size))
    }
}

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let status = StatusCode::RANGE_NOT_SATISFIABLE;
        let header = TypedHeader(self.0);
        (status, header, ()).into_response()
    }
}
