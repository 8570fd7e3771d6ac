use bytes::Bytes;
use hyper::{HeaderMap, StatusCode};

use crate::error::GatewayError;

/// Represents a response leaving the gateway
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// HTTP status code
    pub status: StatusCode,

    /// HTTP headers
    pub headers: HeaderMap,

    /// Response body
    pub body: Bytes,

    /// Target that produced the response, if any. Simulated responses carry
    /// the target name with a "mock:" prefix.
    pub target: Option<String>,

    /// Time taken to produce the response in milliseconds
    pub latency_ms: u64,
}

impl GatewayResponse {
    /// Create a new GatewayResponse
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            target: None,
            latency_ms: 0,
        }
    }

    /// Create a JSON response with the given status
    pub fn json(status: StatusCode, body: serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );

        Self::new(status, headers, Bytes::from(body.to_string()))
    }

    /// Create the caller-visible error response for a gateway error.
    ///
    /// The body always carries a machine-readable kind next to the message so
    /// callers can assert on the kind instead of free text.
    pub fn from_error(error: &GatewayError) -> Self {
        let status =
            StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        Self::json(
            status,
            serde_json::json!({
                "error": {
                    "kind": error.kind(),
                    "message": error.to_string(),
                }
            }),
        )
    }

    /// Attach the producing target name
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attach the observed latency
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response_sets_content_type() {
        let response = GatewayResponse::json(StatusCode::OK, serde_json::json!({"ok": true}));

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.headers.get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_error_response_carries_kind() {
        let error = GatewayError::InvalidCredential("no credential presented".to_string());
        let response = GatewayResponse::from_error(&error);

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"]["kind"], "invalid_credential");
        assert!(body["error"]["message"].as_str().unwrap().contains("credential"));
    }

    #[test]
    fn test_with_target_and_latency() {
        let response = GatewayResponse::json(StatusCode::OK, serde_json::json!({}))
            .with_target("registry")
            .with_latency_ms(12);

        assert_eq!(response.target.as_deref(), Some("registry"));
        assert_eq!(response.latency_ms, 12);
    }
}
