use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use crate::auth::Credential;
use crate::config::AuthorityConfig;
use crate::error::GatewayError;

/// Outcome of validating a credential against the authority
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Principal (service or user) the credential belongs to
    pub principal: String,

    /// Scopes granted to the credential
    pub scopes: Vec<String>,

    /// Expiry as a Unix timestamp, if the authority reports one
    pub expires_at: Option<u64>,

    /// True when the result was synthesized in optional-dependency mode
    /// rather than confirmed by the authority
    pub degraded: bool,
}

impl ValidationResult {
    /// Result used when the authority is unreachable and the deployment is
    /// configured to degrade instead of failing closed.
    pub fn degraded() -> Self {
        Self {
            principal: "degraded".to_string(),
            scopes: Vec::new(),
            expires_at: None,
            degraded: true,
        }
    }
}

/// Credential validation interface
#[async_trait]
pub trait KeyValidator: Send + Sync {
    /// Validate a credential and return the associated principal and scopes
    async fn validate(&self, credential: &Credential) -> Result<ValidationResult, GatewayError>;
}

struct CacheEntry {
    result: ValidationResult,
    expires_at: Instant,
}

/// Bounded-TTL cache for validation results, keyed by credential hash.
///
/// Entries are evicted on expiry and never updated in place. Concurrent
/// populations of the same key are last-writer-safe; both writers store the
/// same successful result.
pub struct ValidationCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ValidationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<ValidationResult> {
        {
            let entries = self.entries.read().expect("validation cache lock poisoned");
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.result.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it so the map does not accumulate dead entries.
        let mut entries = self.entries.write().expect("validation cache lock poisoned");
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= Instant::now() {
                entries.remove(key);
            }
        }
        None
    }

    pub fn insert(&self, key: String, result: ValidationResult) {
        let mut entries = self.entries.write().expect("validation cache lock poisoned");

        // Sweep on insert so entries for keys never presented again do not
        // accumulate for the process lifetime.
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);

        entries.insert(
            key,
            CacheEntry {
                result,
                expires_at: now + self.ttl,
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

#[derive(Debug, Deserialize)]
struct AuthorityResponse {
    valid: bool,
    #[serde(default)]
    principal: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    expires_at: Option<u64>,
}

/// Validator backed by the external authentication authority over HTTP
pub struct HttpKeyValidator {
    client: reqwest::Client,
    validate_url: String,
    cache: ValidationCache,
}

impl HttpKeyValidator {
    pub fn new(config: &AuthorityConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::InternalError(format!("authority client: {}", e)))?;

        Ok(Self {
            client,
            validate_url: format!("{}/api/v1/keys/validate", config.url.trim_end_matches('/')),
            cache: ValidationCache::new(Duration::from_secs(config.cache_ttl_seconds)),
        })
    }

    async fn call_authority(
        &self,
        credential: &Credential,
    ) -> Result<ValidationResult, GatewayError> {
        let response = self
            .client
            .post(&self.validate_url)
            .json(&serde_json::json!({ "key": credential.raw() }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::AuthorityUnavailable("authority timed out".to_string())
                } else {
                    GatewayError::AuthorityUnavailable(format!("authority unreachable: {}", e))
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GatewayError::InvalidCredential(
                "authority rejected credential".to_string(),
            ));
        }

        if !status.is_success() {
            return Err(GatewayError::AuthorityUnavailable(format!(
                "authority returned {}",
                status
            )));
        }

        let body: AuthorityResponse = response.json().await.map_err(|e| {
            GatewayError::AuthorityUnavailable(format!("malformed authority response: {}", e))
        })?;

        if !body.valid {
            return Err(GatewayError::InvalidCredential(
                "authority rejected credential".to_string(),
            ));
        }

        Ok(ValidationResult {
            principal: body.principal.unwrap_or_default(),
            scopes: body.scopes,
            expires_at: body.expires_at,
            degraded: false,
        })
    }
}

#[async_trait]
impl KeyValidator for HttpKeyValidator {
    async fn validate(&self, credential: &Credential) -> Result<ValidationResult, GatewayError> {
        let cache_key = credential.hash();

        if let Some(result) = self.cache.get(&cache_key) {
            tracing::debug!(
                credential = %credential.fingerprint(),
                principal = %result.principal,
                "validation cache hit"
            );
            return Ok(result);
        }

        let result = self.call_authority(credential).await?;

        tracing::debug!(
            credential = %credential.fingerprint(),
            principal = %result.principal,
            "credential validated by authority"
        );

        self.cache.insert(cache_key, result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(principal: &str) -> ValidationResult {
        ValidationResult {
            principal: principal.to_string(),
            scopes: vec!["models:read".to_string()],
            expires_at: None,
            degraded: false,
        }
    }

    #[test]
    fn test_cache_hit_within_ttl() {
        let cache = ValidationCache::new(Duration::from_secs(60));
        cache.insert("abc".to_string(), result("svc-hokusai"));

        let hit = cache.get("abc").unwrap();
        assert_eq!(hit.principal, "svc-hokusai");
        assert_eq!(hit.scopes, vec!["models:read".to_string()]);
    }

    #[test]
    fn test_cache_evicts_expired_entries() {
        let cache = ValidationCache::new(Duration::from_millis(10));
        cache.insert("abc".to_string(), result("svc-hokusai"));

        std::thread::sleep(Duration::from_millis(30));

        assert!(cache.get("abc").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_insert_sweeps_expired_entries_for_other_keys() {
        let cache = ValidationCache::new(Duration::from_millis(10));
        cache.insert("stale".to_string(), result("svc-old"));

        std::thread::sleep(Duration::from_millis(30));

        // "stale" is never read again; inserting a different key evicts it.
        cache.insert("fresh".to_string(), result("svc-new"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh").is_some());
    }

    #[test]
    fn test_cache_miss_on_unknown_key() {
        let cache = ValidationCache::new(Duration::from_secs(60));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_degraded_result_is_marked() {
        let degraded = ValidationResult::degraded();
        assert!(degraded.degraded);
        assert_eq!(degraded.principal, "degraded");
    }

    #[test]
    fn test_validate_url_normalization() {
        let validator = HttpKeyValidator::new(&AuthorityConfig {
            url: "http://auth.internal:9090/".to_string(),
            ..AuthorityConfig::default()
        })
        .unwrap();

        assert_eq!(
            validator.validate_url,
            "http://auth.internal:9090/api/v1/keys/validate"
        );
    }
}
