use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::proxy::translate::PathFamily;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Authentication authority configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Base URL of the external authentication authority
    pub url: String,

    /// Timeout for authority calls in seconds
    #[serde(default = "default_authority_timeout")]
    pub timeout_seconds: u64,

    /// TTL for cached validation results in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Name of the custom API-key header
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Whether the query-parameter credential fallback is accepted.
    /// Off by default: query strings end up in access logs.
    #[serde(default)]
    pub allow_query_credential: bool,

    /// Query parameter name used when the fallback is enabled
    #[serde(default = "default_query_param")]
    pub query_param: String,
}

fn default_authority_timeout() -> u64 {
    5
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_api_key_header() -> String {
    "x-api-key".to_string()
}

fn default_query_param() -> String {
    "api_key".to_string()
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9090".to_string(),
            timeout_seconds: default_authority_timeout(),
            cache_ttl_seconds: default_cache_ttl(),
            api_key_header: default_api_key_header(),
            allow_query_credential: false,
            query_param: default_query_param(),
        }
    }
}

/// Fallback behavior when the internal target or the authority is unreachable.
///
/// The two switches are independent and explicit; with both off the gateway
/// fails closed (503/401).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Bypass the internal target entirely and serve simulated responses
    #[serde(default)]
    pub mock_mode: bool,

    /// Degrade to simulated responses when the target or authority fails,
    /// instead of failing hard
    #[serde(default)]
    pub optional_dependency: bool,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before allowing a probe
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown() -> u64 {
    30
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_seconds: default_cooldown(),
        }
    }
}

/// Webhook egress configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL notified after successful write-class operations
    pub url: String,

    /// Shared secret for HMAC-SHA256 signing
    pub secret: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter, used when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A forwarding target (internal service)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target name referenced by routes
    pub name: String,

    /// Base URL of the internal service
    pub base_url: String,

    /// Which path family the deployment of this target expects
    #[serde(default)]
    pub path_family: PathFamily,
}

/// Route definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// Host pattern, exact or with a single `*` wildcard (e.g. "auth.*")
    pub host: String,

    /// Path prefix matched against the inbound path
    pub path_prefix: String,

    /// HTTP methods (empty means any method)
    #[serde(default)]
    pub methods: Vec<String>,

    /// Name of the target this route forwards to
    pub target: String,

    /// Rule priority; lower numbers are evaluated first and must be unique
    pub priority: u32,

    /// Whether a credential must be present and valid
    #[serde(default)]
    pub credential_required: bool,

    /// Forward the caller credential to the target instead of stripping it
    #[serde(default)]
    pub forward_credential: bool,

    /// Optional allow-list of extra headers forwarded to the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_headers: Option<Vec<String>>,

    /// Per-request timeout for this route in seconds
    #[serde(default = "default_route_timeout")]
    pub timeout_seconds: u64,
}

fn default_route_timeout() -> u64 {
    30
}

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication authority configuration
    #[serde(default)]
    pub authority: AuthorityConfig,

    /// Fallback switches
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Circuit breaker configuration
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Webhook egress (absent disables notifications)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Forwarding targets
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Routing rules
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
}

impl GatewayConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.as_ref().display(), e)))?;

        let config: GatewayConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigError::LoadError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross references. Route table construction performs the
    /// routing-specific checks (priorities, method names).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for route in &self.routes {
            if !self.targets.iter().any(|t| t.name == route.target) {
                return Err(ConfigError::ValidationError(format!(
                    "route {} {} references unknown target '{}'",
                    route.host, route.path_prefix, route.target
                )));
            }

            if !route.path_prefix.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "path prefix '{}' must start with '/'",
                    route.path_prefix
                )));
            }
        }

        if let Some(webhook) = &self.webhook {
            if webhook.secret.is_empty() {
                return Err(ConfigError::ValidationError(
                    "webhook secret must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Look up a target by name
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }
}
