use std::net::IpAddr;
use std::time::SystemTime;

use bytes::Bytes;
use hyper::{HeaderMap, Method, Uri};

/// Represents a request entering the gateway
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// HTTP method
    pub method: Method,

    /// Request URI
    pub uri: Uri,

    /// HTTP headers
    pub headers: HeaderMap,

    /// Request body
    pub body: Bytes,

    /// Client IP address
    pub client_ip: Option<IpAddr>,

    /// Request timestamp
    pub timestamp: SystemTime,

    /// Request ID for tracing
    pub request_id: String,
}

impl GatewayRequest {
    /// Create a new GatewayRequest
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        client_ip: Option<IpAddr>,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            client_ip,
            timestamp: SystemTime::now(),
            request_id: generate_request_id(),
        }
    }

    /// Get a header value as a string
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    /// Virtual host the request was addressed to, without any port suffix.
    ///
    /// The Host header wins over the URI authority; routing rules match on
    /// this value.
    pub fn host(&self) -> Option<String> {
        self.header("host")
            .or_else(|| self.uri.authority().map(|a| a.to_string()))
            .map(|h| match h.rsplit_once(':') {
                Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
                _ => h,
            })
    }
}

/// Generate a unique request ID
fn generate_request_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::UNIX_EPOCH;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    format!("{:x}-{:x}", timestamp, counter)
}
