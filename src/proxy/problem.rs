//! RFC 7807 problem responses.

use crate::proxy::ProxyBody;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Content type of problem responses.
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Problem details body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub instance: String,
}

impl ProblemDetails {
    /// Describe a failure with `status` for the request at `instance`.
    pub fn new(status: StatusCode, detail: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            problem_type: format!("https://httpstatuses.io/{}", status.as_u16()),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            status: status.as_u16(),
            detail: detail.into(),
            instance: instance.into(),
        }
    }
}

/// Build a `application/problem+json` response.
pub fn problem_response(
    status: StatusCode,
    detail: impl Into<String>,
    instance: impl Into<String>,
) -> Response<ProxyBody> {
    let problem = ProblemDetails::new(status, detail, instance);
    // Serializing a struct of strings and integers cannot fail.
    let body = serde_json::to_vec(&problem).unwrap_or_default();

    let mut response = Response::new(
        Full::new(Bytes::from(body))
            .map_err(|never| match never {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_problem_response() {
        let resp = problem_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no server available",
            "/api/orders",
        );
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            PROBLEM_CONTENT_TYPE
        );

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let problem: ProblemDetails = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem.status, 503);
        assert_eq!(problem.title, "Service Unavailable");
        assert_eq!(problem.problem_type, "https://httpstatuses.io/503");
        assert_eq!(problem.detail, "no server available");
        assert_eq!(problem.instance, "/api/orders");
    }
}
