use hyper::StatusCode;
use serde_json::json;

use crate::core::response::GatewayResponse;
use crate::proxy::translate::Operation;

/// Build a simulated success response for an operation.
///
/// Used in mock mode and when optional-dependency mode degrades around an
/// unreachable target. Bodies mirror the registry's response schemas closely
/// enough for offline callers to proceed.
pub fn simulate(operation: &Operation, target: &str) -> GatewayResponse {
    let body = match operation.name {
        "registry.version" => json!({ "version": "2.9.2" }),
        "registered_models.search" => json!({ "registered_models": [] }),
        "registered_models.create" | "registered_models.get" | "registered_models.update" => {
            json!({
                "registered_model": {
                    "name": "simulated-model",
                    "creation_timestamp": 0,
                    "last_updated_timestamp": 0,
                    "latest_versions": [],
                }
            })
        }
        "registered_models.delete" => json!({}),
        "model_versions.search" => json!({ "model_versions": [] }),
        "model_versions.create"
        | "model_versions.get"
        | "model_versions.update"
        | "model_versions.transition_stage" => {
            json!({
                "model_version": {
                    "name": "simulated-model",
                    "version": "1",
                    "current_stage": "None",
                    "status": "READY",
                }
            })
        }
        "model_versions.get_download_uri" => {
            json!({ "artifact_uri": "file:///tmp/simulated-artifacts" })
        }
        "keys.validate" => json!({
            "valid": true,
            "principal": "simulated",
            "scopes": [],
        }),
        "keys.create" => json!({ "key": "hk_simulated", "principal": "simulated" }),
        "health" => json!({ "status": "ok" }),
        _ => json!({ "status": "ok" }),
    };

    GatewayResponse::json(StatusCode::OK, body).with_target(format!("mock:{}", target))
}
