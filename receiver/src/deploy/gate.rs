//! Deployment gate: authenticate, filter, deploy

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::deploy::event::{classify, Classification, SkipReason};
use crate::deploy::outcome::DeploymentOutcome;
use crate::deploy::script::Deployer;
use crate::deploy::signature::SignatureVerifier;

/// One inbound webhook request, as received
#[derive(Debug, Clone, Copy)]
pub struct InboundEvent<'a> {
    /// Raw request body
    pub body: &'a [u8],

    /// `X-Hub-Signature-256` header
    pub signature: Option<&'a str>,

    /// `X-GitHub-Event` header
    pub event_type: Option<&'a str>,

    /// `X-GitHub-Delivery` header
    pub delivery_id: Option<&'a str>,
}

/// What the gate decided for an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Signature missing, malformed or wrong
    Unauthorized,

    /// Authenticated body is not JSON
    MalformedPayload(String),

    /// Authenticated but not eligible for deployment
    Skipped(SkipReason),

    /// Eligible, but the deployment procedure is not on disk
    ProcedureMissing(PathBuf),

    /// The procedure ran; exactly one outcome per eligible event
    Deployed(DeploymentOutcome),
}

/// Linear gate in front of the deployment procedure
pub struct DeploymentGate {
    verifier: SignatureVerifier,
    branch_ref: String,
    deployer: Arc<dyn Deployer>,
}

impl DeploymentGate {
    pub fn new(
        verifier: SignatureVerifier,
        branch_ref: impl Into<String>,
        deployer: Arc<dyn Deployer>,
    ) -> Self {
        Self {
            verifier,
            branch_ref: branch_ref.into(),
            deployer,
        }
    }

    /// Run an inbound event through the gate
    pub async fn handle(&self, event: InboundEvent<'_>) -> GateDecision {
        let delivery_id = event
            .delivery_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if !self.verifier.authenticate(event.body, event.signature) {
            warn!("Delivery {}: authentication failed", delivery_id);
            return GateDecision::Unauthorized;
        }

        let payload: Value = match serde_json::from_slice(event.body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Delivery {}: invalid JSON payload: {}", delivery_id, e);
                return GateDecision::MalformedPayload(e.to_string());
            }
        };

        let event_type = event.event_type.unwrap_or_default();
        if let Classification::Skip(reason) = classify(event_type, &payload, &self.branch_ref) {
            info!("Delivery {}: skipped ({})", delivery_id, reason);
            return GateDecision::Skipped(reason);
        }

        if !self.deployer.is_available().await {
            let procedure = self.deployer.procedure().to_path_buf();
            error!(
                "Delivery {}: deployment script not found at {}",
                delivery_id,
                procedure.display()
            );
            return GateDecision::ProcedureMissing(procedure);
        }

        GateDecision::Deployed(self.deployer.deploy(&delivery_id).await)
    }
}
