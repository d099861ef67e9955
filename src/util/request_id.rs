//! Request ids for correlating log lines, upstream requests and responses.

use hyper::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest incoming id that is honoured.
const MAX_INCOMING_LEN: usize = 128;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a UUID v4 request id.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a process-local id, `req-` followed by 16 hex digits.
pub fn generate_short_request_id() -> String {
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{:016x}", count)
}

/// Identifier of one proxied request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// A new UUID-based id.
    pub fn new() -> Self {
        Self(generate_request_id())
    }

    /// A new short, process-local id.
    pub fn short() -> Self {
        Self(generate_short_request_id())
    }

    /// Wrap an existing id.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The id sent by the client, if it is present, printable and not oversized.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= MAX_INCOMING_LEN)
            .map(Self::from_string)
    }

    /// The client's id, or a fresh short one.
    pub fn from_headers_or_short(headers: &HeaderMap) -> Self {
        Self::from_headers(headers).unwrap_or_else(Self::short)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use std::collections::HashSet;

    #[test]
    fn test_generate_request_id() {
        let id1 = generate_request_id();
        let id2 = generate_request_id();

        assert_ne!(id1, id2);
        assert!(Uuid::parse_str(&id1).is_ok());
    }

    #[test]
    fn test_short_request_id_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            let id = generate_short_request_id();
            assert!(id.starts_with("req-"));
            assert_eq!(id.len(), 20);
            assert!(ids.insert(id), "duplicate ID generated");
        }
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(RequestId::from_headers(&headers), None);

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static(" abc-123 "));
        assert_eq!(
            RequestId::from_headers(&headers),
            Some(RequestId::from_string("abc-123"))
        );
    }

    #[test]
    fn test_from_headers_rejects_blank_and_oversized() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(RequestId::from_headers(&headers), None);

        let long = "x".repeat(MAX_INCOMING_LEN + 1);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(&long).unwrap());
        assert!(
            RequestId::from_headers_or_short(&headers)
                .as_str()
                .starts_with("req-")
        );
    }

    #[test]
    fn test_display() {
        let id = RequestId::from_string("test-id-123");
        assert_eq!(id.to_string(), "test-id-123");
    }
}
