use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::WebhookConfig;
use crate::error::GatewayError;

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "x-gateway-signature-256";

type HmacSha256 = Hmac<Sha256>;

/// Compute the signature header value for a payload: `sha256=<hex>`
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a `sha256=<hex>` signature against a payload.
///
/// Receivers must call this before trusting a notification. Comparison is
/// constant time via the HMAC verifier.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Emits signed notifications after successful write-class operations
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::InternalError(format!("webhook client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            secret: config.secret.clone(),
        })
    }

    /// Send a signed notification. Failures are logged, never surfaced to the
    /// caller whose request already succeeded.
    pub async fn notify(&self, payload: serde_json::Value) {
        let body = payload.to_string();
        let signature = sign(&self.secret, body.as_bytes());

        let result = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(url = %self.url, "webhook delivered");
            }
            Ok(response) => {
                tracing::warn!(
                    url = %self.url,
                    status = response.status().as_u16(),
                    "webhook receiver returned non-success"
                );
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "webhook delivery failed");
            }
        }
    }
}
