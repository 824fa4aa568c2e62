//! Server state

use std::sync::Arc;

use crate::deploy::gate::DeploymentGate;

/// Server state shared across handlers
pub struct ServerState {
    pub gate: Arc<DeploymentGate>,
}

impl ServerState {
    pub fn new(gate: Arc<DeploymentGate>) -> Self {
        Self { gate }
    }
}
