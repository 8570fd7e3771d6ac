use thiserror::Error;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Authentication authority unavailable: {0}")]
    AuthorityUnavailable(String),

    #[error("No internal mapping for path: {0}")]
    UnmappablePath(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Downstream target timed out: {0}")]
    DownstreamTimeout(String),

    #[error("Downstream target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Upstream caller disconnected")]
    UpstreamDisconnected,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl GatewayError {
    /// HTTP status code presented to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidCredential(_) => 401,
            GatewayError::AuthorityUnavailable(_) => 503,
            GatewayError::UnmappablePath(_) => 404,
            GatewayError::RouteNotFound(_) => 404,
            GatewayError::DownstreamTimeout(_) => 504,
            GatewayError::TargetUnavailable(_) => 503,
            GatewayError::UpstreamDisconnected => 499,
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::ConfigError(_) => 500,
            GatewayError::InternalError(_) => 500,
        }
    }

    /// Machine-readable error kind, stable across message changes so that
    /// callers and verification scripts can assert on it.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidCredential(_) => "invalid_credential",
            GatewayError::AuthorityUnavailable(_) => "authority_unavailable",
            GatewayError::UnmappablePath(_) => "unmappable_path",
            GatewayError::RouteNotFound(_) => "route_not_found",
            GatewayError::DownstreamTimeout(_) => "downstream_timeout",
            GatewayError::TargetUnavailable(_) => "target_unavailable",
            GatewayError::UpstreamDisconnected => "upstream_disconnected",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::ConfigError(_) => "config",
            GatewayError::InternalError(_) => "internal",
        }
    }
}

/// Configuration specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Ambiguous route: {0}")]
    AmbiguousRoute(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::InvalidCredential("x".into()).status_code(), 401);
        assert_eq!(GatewayError::AuthorityUnavailable("x".into()).status_code(), 503);
        assert_eq!(GatewayError::UnmappablePath("/x".into()).status_code(), 404);
        assert_eq!(GatewayError::RouteNotFound("/x".into()).status_code(), 404);
        assert_eq!(GatewayError::DownstreamTimeout("x".into()).status_code(), 504);
        assert_eq!(GatewayError::TargetUnavailable("x".into()).status_code(), 503);
        assert_eq!(GatewayError::InvalidRequest("x".into()).status_code(), 400);
    }

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(GatewayError::InvalidCredential("x".into()).kind(), "invalid_credential");
        assert_eq!(
            GatewayError::AuthorityUnavailable("x".into()).kind(),
            "authority_unavailable"
        );
        assert_eq!(GatewayError::UnmappablePath("/x".into()).kind(), "unmappable_path");
        assert_eq!(GatewayError::DownstreamTimeout("x".into()).kind(), "downstream_timeout");
        assert_eq!(
            GatewayError::ConfigError(ConfigError::AmbiguousRoute("x".into())).kind(),
            "config"
        );
    }
}
