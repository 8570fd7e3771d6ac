use std::collections::HashMap;
use std::time::{Duration, Instant};

use hyper::{HeaderMap, StatusCode};

use crate::config::{FallbackConfig, GatewayConfig, TargetConfig};
use crate::core::request::GatewayRequest;
use crate::core::response::GatewayResponse;
use crate::error::GatewayError;
use crate::proxy::breaker::{Admission, BreakerRegistry, CircuitState};
use crate::proxy::mock;
use crate::proxy::translate::Operation;
use crate::routing::RouteRule;

/// Headers never forwarded in either direction
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Caller authentication headers stripped before dispatch unless the route
/// designates credential pass-through
const CREDENTIAL_HEADERS: &[&str] = &["authorization", "cookie"];

/// Dispatches rewritten requests to internal targets.
///
/// Applies the per-route header rewrite policy, a per-route timeout, circuit
/// breaker accounting per target, and the configured fallback behavior.
pub struct Forwarder {
    client: reqwest::Client,
    targets: HashMap<String, TargetConfig>,
    breakers: BreakerRegistry,
    fallback: FallbackConfig,
    api_key_header: String,
    query_param: String,
}

impl Forwarder {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::InternalError(format!("forwarding client: {}", e)))?;

        Ok(Self {
            client,
            targets: config
                .targets
                .iter()
                .map(|t| (t.name.clone(), t.clone()))
                .collect(),
            breakers: BreakerRegistry::new(config.breaker.clone()),
            fallback: config.fallback.clone(),
            api_key_header: config.authority.api_key_header.to_ascii_lowercase(),
            query_param: config.authority.query_param.clone(),
        })
    }

    /// Observable circuit state for a target
    pub fn circuit_state(&self, target: &str) -> CircuitState {
        self.breakers.for_target(target).state()
    }

    /// Forward a request to the route's target using the translated path
    pub async fn forward(
        &self,
        request: &GatewayRequest,
        rule: &RouteRule,
        operation: &'static Operation,
        internal_path: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        let target = self.targets.get(&rule.target).ok_or_else(|| {
            GatewayError::InternalError(format!("route references unknown target {}", rule.target))
        })?;

        if self.fallback.mock_mode {
            tracing::debug!(
                request_id = %request.request_id,
                operation = operation.name,
                "mock mode enabled, serving simulated response"
            );
            return Ok(mock::simulate(operation, &target.name));
        }

        let breaker = self.breakers.for_target(&target.name);

        let permit = match breaker.try_acquire() {
            Admission::Reject => {
                tracing::warn!(
                    request_id = %request.request_id,
                    target = %target.name,
                    "circuit open, short-circuiting without dispatch"
                );
                return self.degrade_or(
                    operation,
                    &target.name,
                    GatewayError::TargetUnavailable(format!(
                        "circuit open for target {}",
                        target.name
                    )),
                );
            }
            Admission::Probe(permit) => {
                tracing::info!(target = %target.name, "circuit half-open, sending probe request");
                permit
            }
            Admission::Allow(permit) => permit,
        };

        let mut url = format!(
            "{}{}",
            target.base_url.trim_end_matches('/'),
            internal_path
        );
        if let Some(query) = request.uri.query() {
            if let Some(filtered) = filter_query(query, &self.query_param, rule.forward_credential)
            {
                url.push('?');
                url.push_str(&filtered);
            }
        }

        let headers = self.filter_request_headers(&request.headers, rule);
        let started = Instant::now();

        let outcome = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .body(request.body.clone())
            .timeout(Duration::from_secs(rule.timeout_seconds))
            .send()
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                permit.fail();
                let error = if e.is_timeout() {
                    GatewayError::DownstreamTimeout(format!("target {} timed out", target.name))
                } else {
                    GatewayError::TargetUnavailable(format!(
                        "target {} unreachable: {}",
                        target.name, e
                    ))
                };
                tracing::warn!(
                    request_id = %request.request_id,
                    target = %target.name,
                    error = %error,
                    "dispatch failed"
                );
                return self.degrade_or(operation, &target.name, error);
            }
        };

        let status = response.status();
        let response_headers = filter_response_headers(response.headers());

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                permit.fail();
                return self.degrade_or(
                    operation,
                    &target.name,
                    GatewayError::TargetUnavailable(format!(
                        "target {} dropped response body: {}",
                        target.name, e
                    )),
                );
            }
        };

        // 5xx responses are relayed to the caller but count against the
        // target's circuit.
        if status.is_server_error() {
            permit.fail();
        } else {
            permit.succeed();
        }

        let latency_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            request_id = %request.request_id,
            target = %target.name,
            status = status.as_u16(),
            latency_ms,
            "forwarded {} -> {}",
            request.uri.path(),
            internal_path
        );

        Ok(GatewayResponse::new(
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            response_headers,
            body,
        )
        .with_target(target.name.clone())
        .with_latency_ms(latency_ms))
    }

    /// Serve a simulated response in optional-dependency mode, otherwise fail
    /// with the given error (fail closed).
    fn degrade_or(
        &self,
        operation: &'static Operation,
        target: &str,
        error: GatewayError,
    ) -> Result<GatewayResponse, GatewayError> {
        if self.fallback.optional_dependency {
            tracing::warn!(
                target,
                error = %error,
                "optional dependency mode, serving simulated response"
            );
            Ok(mock::simulate(operation, target))
        } else {
            Err(error)
        }
    }

    /// Apply the route's header rewrite policy to the inbound headers
    fn filter_request_headers(&self, headers: &HeaderMap, rule: &RouteRule) -> HeaderMap {
        let mut filtered = HeaderMap::new();

        for (name, value) in headers.iter() {
            let name_str = name.as_str();

            if HOP_BY_HOP_HEADERS.contains(&name_str) {
                continue;
            }

            let is_credential =
                CREDENTIAL_HEADERS.contains(&name_str) || name_str == self.api_key_header;
            if is_credential && !rule.forward_credential {
                continue;
            }

            if let Some(allow) = &rule.allow_headers {
                let allowed = is_credential
                    || name_str == "content-type"
                    || name_str == "accept"
                    || allow.iter().any(|h| h.eq_ignore_ascii_case(name_str));
                if !allowed {
                    continue;
                }
            }

            filtered.append(name.clone(), value.clone());
        }

        filtered
    }
}

/// Drop the credential query parameter unless the route designates
/// pass-through. Other parameters are forwarded untouched.
fn filter_query(query: &str, credential_param: &str, forward_credential: bool) -> Option<String> {
    if forward_credential {
        return Some(query.to_string());
    }

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let name = pair.split_once('=').map(|(name, _)| name).unwrap_or(pair);
            name != credential_param
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("&"))
    }
}

fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();

    for (name, value) in headers.iter() {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }

    filtered
}
