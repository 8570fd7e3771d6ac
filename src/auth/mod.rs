pub mod validator;

use std::fmt;

use sha2::{Digest, Sha256};

use crate::config::AuthorityConfig;
use crate::core::request::GatewayRequest;

/// Where a credential was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Custom API-key header
    ApiKeyHeader,

    /// Standard `Authorization: Bearer` header
    BearerHeader,

    /// Query parameter fallback (only when explicitly enabled)
    QueryParam,
}

/// A caller-supplied credential, normalized from any of the accepted schemes.
///
/// Created per request and discarded with it; never persisted. The raw value
/// never appears in Debug output or logs, only the fingerprint.
#[derive(Clone)]
pub struct Credential {
    raw: String,
    source: CredentialSource,
}

impl Credential {
    pub fn new(raw: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            raw: raw.into(),
            source,
        }
    }

    /// The secret token value
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Full SHA-256 of the token, used as the validation cache key
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.raw.as_bytes()))
    }

    /// Short hash prefix safe to put in log lines
    pub fn fingerprint(&self) -> String {
        self.hash()[..12].to_string()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("fingerprint", &self.fingerprint())
            .field("source", &self.source)
            .finish()
    }
}

/// Extract a credential from an inbound request.
///
/// Schemes are checked in fixed priority order: custom API-key header, bearer
/// authorization header, query parameter (only when enabled). Absence is not
/// an error; the matched route's policy decides what absence means.
pub fn extract_credential(
    request: &GatewayRequest,
    config: &AuthorityConfig,
) -> Option<Credential> {
    if let Some(value) = request.header(&config.api_key_header) {
        let value = value.trim();
        if !value.is_empty() {
            return Some(Credential::new(value, CredentialSource::ApiKeyHeader));
        }
    }

    if let Some(auth_header) = request.header("authorization") {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(Credential::new(token, CredentialSource::BearerHeader));
            }
        }
    }

    if config.allow_query_credential {
        if let Some(query) = request.uri.query() {
            for pair in query.split('&') {
                if let Some((name, value)) = pair.split_once('=') {
                    if name == config.query_param && !value.is_empty() {
                        return Some(Credential::new(value, CredentialSource::QueryParam));
                    }
                }
            }
        }
    }

    None
}
