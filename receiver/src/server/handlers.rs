//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::deploy::gate::{GateDecision, InboundEvent};
use crate::deploy::outcome::DeploymentOutcome;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Service name reported by `/health` and `/`
pub const SERVICE_NAME: &str = "webhook-receiver";

/// HMAC signature header
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Event type header
pub const EVENT_HEADER: &str = "x-github-event";

/// Delivery id header
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// Service descriptor response
#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

/// Root handler
pub async fn root_handler() -> impl IntoResponse {
    Json(ServiceResponse {
        service: SERVICE_NAME.to_string(),
        version: version_info().version,
        endpoints: vec![
            "POST /webhook".to_string(),
            "GET /health".to_string(),
            "GET /version".to_string(),
        ],
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Webhook response
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl WebhookResponse {
    fn message(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            message: message.into(),
            log_file: None,
            exit_code: None,
            duration_ms: None,
        }
    }
}

impl From<DeploymentOutcome> for WebhookResponse {
    fn from(outcome: DeploymentOutcome) -> Self {
        Self {
            status: outcome.status.as_str().to_string(),
            message: outcome.message,
            log_file: Some(outcome.log_file.display().to_string()),
            exit_code: outcome.exit_code,
            duration_ms: Some(outcome.duration_ms),
        }
    }
}

/// Map a gate decision onto an HTTP response
pub fn decision_response(decision: GateDecision) -> (StatusCode, Json<WebhookResponse>) {
    match decision {
        GateDecision::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(WebhookResponse::message("error", "Invalid signature")),
        ),
        GateDecision::MalformedPayload(_) => (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse::message("error", "Invalid JSON payload")),
        ),
        GateDecision::Skipped(reason) => (
            StatusCode::OK,
            Json(WebhookResponse::message(
                "skipped",
                format!("Ignored {}", reason),
            )),
        ),
        GateDecision::ProcedureMissing(path) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WebhookResponse::message(
                "error",
                format!("Deployment script not found: {}", path.display()),
            )),
        ),
        GateDecision::Deployed(outcome) => {
            let code = if outcome.is_success() {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (code, Json(WebhookResponse::from(outcome)))
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Webhook handler
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let event = InboundEvent {
        body: &body,
        signature: header_str(&headers, SIGNATURE_HEADER),
        event_type: header_str(&headers, EVENT_HEADER),
        delivery_id: header_str(&headers, DELIVERY_HEADER),
    };

    decision_response(state.gate.handle(event).await)
}
