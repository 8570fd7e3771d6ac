use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::validator::{HttpKeyValidator, KeyValidator, ValidationResult};
use crate::auth::{extract_credential, Credential};
use crate::config::{GatewayConfig, RouteDefinition};
use crate::core::request::GatewayRequest;
use crate::core::response::GatewayResponse;
use crate::error::{ConfigError, GatewayError};
use crate::proxy::forwarder::Forwarder;
use crate::proxy::translate;
use crate::routing::{RouteRule, RouteTable, Routes};
use crate::webhook::WebhookNotifier;

/// Core gateway trait
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Process an incoming request and return a response
    async fn process_request(
        &self,
        request: GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError>;

    /// Start the gateway server
    async fn start(&self) -> Result<(), GatewayError>;

    /// Stop the gateway server
    async fn stop(&self) -> Result<(), GatewayError>;

    /// Check if the gateway is healthy
    async fn health_check(&self) -> bool;
}

/// Server state that can be mutated
struct ServerState {
    /// Server handle for graceful shutdown
    server_handle: Option<tokio::task::JoinHandle<()>>,
    /// Shutdown signal sender
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    /// Address the listener is bound to
    bound_addr: Option<std::net::SocketAddr>,
}

/// The registry gateway: routes, validates, translates, forwards.
#[derive(Clone)]
pub struct ApiGateway {
    config: GatewayConfig,
    routes: Routes,
    validator: Arc<dyn KeyValidator>,
    forwarder: Arc<Forwarder>,
    webhook: Option<Arc<WebhookNotifier>>,
    server_state: Arc<tokio::sync::Mutex<ServerState>>,
}

impl ApiGateway {
    /// Build a gateway from validated configuration.
    ///
    /// Fails (and the process refuses to start) when the route table is
    /// ambiguous or otherwise invalid.
    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let routes = Routes::new(RouteTable::build(&config.routes)?);

        let validator: Arc<dyn KeyValidator> = Arc::new(HttpKeyValidator::new(&config.authority)?);
        let forwarder = Arc::new(Forwarder::new(&config)?);

        let webhook = match &config.webhook {
            Some(webhook_config) => Some(Arc::new(WebhookNotifier::new(webhook_config)?)),
            None => None,
        };

        Ok(Self {
            config,
            routes,
            validator,
            forwarder,
            webhook,
            server_state: Arc::new(tokio::sync::Mutex::new(ServerState {
                server_handle: None,
                shutdown_tx: None,
                bound_addr: None,
            })),
        })
    }

    /// Replace the credential validator (used by tests and embedders)
    pub fn with_validator(mut self, validator: Arc<dyn KeyValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Atomically replace the routing rules; handlers in flight keep their
    /// current snapshot.
    pub fn reload_routes(&self, definitions: &[RouteDefinition]) -> Result<(), ConfigError> {
        let table = RouteTable::build(definitions)?;
        self.routes.reload(table);
        tracing::info!(rules = definitions.len(), "route table reloaded");
        Ok(())
    }

    /// Forwarder handle, exposed for observability of circuit state
    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Address the server is listening on, once started. Useful when the
    /// configured port is 0 and the OS picked one.
    pub async fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server_state.lock().await.bound_addr
    }

    async fn validate_if_required(
        &self,
        rule: &RouteRule,
        credential: Option<&Credential>,
        request_id: &str,
    ) -> Result<Option<ValidationResult>, GatewayError> {
        if !rule.credential_required {
            return Ok(None);
        }

        let credential = credential.ok_or_else(|| {
            GatewayError::InvalidCredential("no credential presented".to_string())
        })?;

        match self.validator.validate(credential).await {
            Ok(result) => Ok(Some(result)),
            Err(GatewayError::AuthorityUnavailable(msg))
                if self.config.fallback.optional_dependency =>
            {
                tracing::warn!(
                    request_id,
                    credential = %credential.fingerprint(),
                    "authority unavailable ({}), optional dependency mode admits request",
                    msg
                );
                Ok(Some(ValidationResult::degraded()))
            }
            Err(e) => Err(e),
        }
    }

    fn emit_webhook(
        &self,
        operation: &'static translate::Operation,
        request: &GatewayRequest,
        response: &GatewayResponse,
        validation: Option<&ValidationResult>,
    ) {
        let Some(webhook) = &self.webhook else {
            return;
        };

        let payload = serde_json::json!({
            "event": "registry.write",
            "operation": operation.name,
            "method": request.method.as_str(),
            "path": request.uri.path(),
            "status": response.status.as_u16(),
            "principal": validation.map(|v| v.principal.clone()),
            "request_id": request.request_id,
        });

        let webhook = webhook.clone();
        tokio::spawn(async move {
            webhook.notify(payload).await;
        });
    }
}

#[async_trait]
impl Gateway for ApiGateway {
    async fn process_request(
        &self,
        request: GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let host = request.host().unwrap_or_default();
        let path = request.uri.path().to_string();

        let snapshot = self.routes.snapshot();
        let rule = snapshot
            .find(&host, &path, &request.method)
            .ok_or_else(|| {
                GatewayError::RouteNotFound(format!("{} {}{}", request.method, host, path))
            })?
            .clone();

        tracing::info!(
            request_id = %request.request_id,
            host = %host,
            path = %path,
            priority = rule.priority,
            target = %rule.target,
            "route matched"
        );

        let credential = extract_credential(&request, &self.config.authority);
        let validation = self
            .validate_if_required(&rule, credential.as_ref(), &request.request_id)
            .await?;

        let target = self.config.target(&rule.target).ok_or_else(|| {
            GatewayError::InternalError(format!("unknown target {}", rule.target))
        })?;
        let (operation, internal_path) = translate::translate(&path, target.path_family)?;

        let response = self
            .forwarder
            .forward(&request, &rule, operation, internal_path)
            .await?;

        if operation.write_class && response.status.is_success() {
            self.emit_webhook(operation, &request, &response, validation.as_ref());
        }

        Ok(response)
    }

    async fn start(&self) -> Result<(), GatewayError> {
        let mut server_state = self.server_state.lock().await;
        if server_state.server_handle.is_some() {
            return Err(GatewayError::InternalError(
                "Server is already running".to_string(),
            ));
        }

        let gateway_ref = Arc::new(self.clone());

        let app = axum::Router::new()
            // Gateway liveness, distinct from the proxied /health operation
            .route("/healthz", axum::routing::get(|| async { "OK" }))
            .fallback(move |req: axum::http::Request<axum::body::Body>| {
                let gateway = gateway_ref.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let body_bytes = match hyper::body::to_bytes(body).await {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            // The caller is gone; abort without a response
                            // body, the status only shows up in logs.
                            tracing::debug!("caller went away while sending body: {}", e);
                            return axum::http::Response::builder()
                                .status(GatewayError::UpstreamDisconnected.status_code())
                                .body(axum::body::Body::empty())
                                .unwrap_or_else(|_| {
                                    error_response(&GatewayError::InternalError(
                                        "failed to build response".to_string(),
                                    ))
                                });
                        }
                    };

                    let client_ip = parts
                        .headers
                        .get("x-forwarded-for")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.split(',').next())
                        .and_then(|s| s.trim().parse().ok());

                    let gateway_request = GatewayRequest::new(
                        parts.method,
                        parts.uri,
                        parts.headers,
                        body_bytes,
                        client_ip,
                    );

                    match gateway.process_request(gateway_request).await {
                        Ok(response) => {
                            let mut builder =
                                axum::http::Response::builder().status(response.status);

                            for (name, value) in response.headers.iter() {
                                builder = builder.header(name, value);
                            }

                            builder
                                .body(axum::body::Body::from(response.body))
                                .unwrap_or_else(|_| {
                                    error_response(&GatewayError::InternalError(
                                        "failed to build response".to_string(),
                                    ))
                                })
                        }
                        Err(e) => {
                            tracing::warn!(kind = e.kind(), "request failed: {}", e);
                            error_response(&e)
                        }
                    }
                }
            })
            .layer(tower_http::trace::TraceLayer::new_for_http());

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| GatewayError::InternalError(format!("Invalid address: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        // Bind before spawning so the chosen port is known to the caller.
        let server = axum::Server::bind(&addr).serve(app.into_make_service());
        let bound_addr = server.local_addr();

        tracing::info!("Starting registry gateway on {}", bound_addr);

        let server_handle = tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                tracing::info!("Shutdown signal received, starting graceful shutdown");
            });

            if let Err(e) = graceful.await {
                tracing::error!("Server error: {}", e);
            }
        });

        server_state.server_handle = Some(server_handle);
        server_state.shutdown_tx = Some(shutdown_tx);
        server_state.bound_addr = Some(bound_addr);

        tracing::info!("Registry gateway started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        let mut server_state = self.server_state.lock().await;

        if server_state.server_handle.is_none() {
            return Err(GatewayError::InternalError(
                "Server is not running".to_string(),
            ));
        }

        if let Some(tx) = server_state.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = server_state.server_handle.take() {
            handle.await.map_err(|e| {
                GatewayError::InternalError(format!("Error while shutting down server: {}", e))
            })?;
            tracing::info!("Server has been shut down gracefully");
        }

        server_state.bound_addr = None;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Convert a gateway error into the caller-visible axum response
fn error_response(error: &GatewayError) -> axum::http::Response<axum::body::Body> {
    let response = GatewayResponse::from_error(error);

    let mut builder = axum::http::Response::builder().status(response.status);
    for (name, value) in response.headers.iter() {
        builder = builder.header(name, value);
    }

    builder
        .body(axum::body::Body::from(response.body))
        .expect("error response construction cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FallbackConfig, RouteDefinition, TargetConfig};
    use crate::proxy::translate::PathFamily;
    use bytes::Bytes;
    use hyper::header::HeaderValue;
    use hyper::{HeaderMap, Method, Uri};

    struct StaticValidator {
        principal: &'static str,
    }

    #[async_trait]
    impl KeyValidator for StaticValidator {
        async fn validate(&self, _: &Credential) -> Result<ValidationResult, GatewayError> {
            Ok(ValidationResult {
                principal: self.principal.to_string(),
                scopes: vec!["models:read".to_string()],
                expires_at: None,
                degraded: false,
            })
        }
    }

    fn config(mock_mode: bool) -> GatewayConfig {
        GatewayConfig {
            fallback: FallbackConfig {
                mock_mode,
                optional_dependency: false,
            },
            targets: vec![TargetConfig {
                name: "registry".to_string(),
                // Nothing listens here; mock mode never dispatches.
                base_url: "http://127.0.0.1:1".to_string(),
                path_family: PathFamily::Direct,
            }],
            routes: vec![
                RouteDefinition {
                    host: "registry.*".to_string(),
                    path_prefix: "/api/2.0/mlflow".to_string(),
                    methods: vec![],
                    target: "registry".to_string(),
                    priority: 50,
                    credential_required: true,
                    forward_credential: false,
                    allow_headers: None,
                    timeout_seconds: 5,
                },
                RouteDefinition {
                    host: "registry.*".to_string(),
                    path_prefix: "/ajax-api".to_string(),
                    methods: vec![],
                    target: "registry".to_string(),
                    priority: 90,
                    credential_required: false,
                    forward_credential: false,
                    allow_headers: None,
                    timeout_seconds: 5,
                },
            ],
            ..Default::default()
        }
    }

    fn gateway(mock_mode: bool) -> ApiGateway {
        ApiGateway::from_config(config(mock_mode))
            .unwrap()
            .with_validator(Arc::new(StaticValidator {
                principal: "svc-hokusai",
            }))
    }

    fn request(path: &str, with_credential: bool) -> GatewayRequest {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("registry.example.com"));
        if with_credential {
            headers.insert("x-api-key", HeaderValue::from_static("hk_testkey"));
        }

        GatewayRequest::new(
            Method::GET,
            path.parse::<Uri>().unwrap(),
            headers,
            Bytes::new(),
            None,
        )
    }

    #[tokio::test]
    async fn test_missing_credential_on_required_route_is_401() {
        let err = gateway(true)
            .process_request(request("/api/2.0/mlflow/version", false))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_credential");
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_mock_mode_serves_simulated_success() {
        let response = gateway(true)
            .process_request(request("/api/2.0/mlflow/version", true))
            .await
            .unwrap();

        assert_eq!(response.status, hyper::StatusCode::OK);
        assert_eq!(response.target.as_deref(), Some("mock:registry"));

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert!(body["version"].is_string());
    }

    #[tokio::test]
    async fn test_unmapped_path_is_404_not_passed_through() {
        let err = gateway(true)
            .process_request(request("/api/2.0/mlflow/not-an-operation", true))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "unmappable_path");
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_unrouted_host_is_route_not_found() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("other.example.com"));
        let req = GatewayRequest::new(
            Method::GET,
            "/api/2.0/mlflow/version".parse::<Uri>().unwrap(),
            headers,
            Bytes::new(),
            None,
        );

        let err = gateway(true).process_request(req).await.unwrap_err();
        assert_eq!(err.kind(), "route_not_found");
    }

    #[tokio::test]
    async fn test_ambiguous_routes_refuse_to_start() {
        let mut cfg = config(true);
        cfg.routes[1].priority = cfg.routes[0].priority;

        let err = ApiGateway::from_config(cfg).err().expect("ambiguous rules must fail");
        assert!(matches!(
            err,
            GatewayError::ConfigError(ConfigError::AmbiguousRoute(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_routes_swaps_table() {
        let gw = gateway(true);

        let mut new_routes = config(true).routes;
        new_routes[0].path_prefix = "/api/3.0".to_string();
        gw.reload_routes(&new_routes).unwrap();

        let err = gw
            .process_request(request("/api/2.0/mlflow/version", true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "route_not_found");
    }

    #[tokio::test]
    async fn test_reload_rejects_ambiguous_rules_and_keeps_old_table() {
        let gw = gateway(true);

        let mut new_routes = config(true).routes;
        new_routes[1].priority = new_routes[0].priority;
        assert!(gw.reload_routes(&new_routes).is_err());

        // Old table still routes.
        let response = gw
            .process_request(request("/api/2.0/mlflow/version", true))
            .await
            .unwrap();
        assert_eq!(response.status, hyper::StatusCode::OK);
    }
}
