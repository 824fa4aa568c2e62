//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::gate::DeploymentGate;
use crate::deploy::script::{Deployer, ScriptDeployer};
use crate::deploy::signature::SignatureVerifier;
use crate::errors::ReceiverError;
use crate::filesys::dir::Dir;

/// Main application state
pub struct AppState {
    /// Gate in front of the deployment script
    pub gate: Arc<DeploymentGate>,
}

impl AppState {
    /// Initialize application state.
    ///
    /// Creates the log directory (and parents) before anything can deploy.
    pub async fn init(options: &AppOptions) -> Result<Self, ReceiverError> {
        info!("Initializing application state...");

        let log_dir = Dir::new(&options.log_dir);
        log_dir.create().await.map_err(|e| {
            ReceiverError::ConfigError(format!(
                "unable to create log directory {}: {}",
                log_dir.path().display(),
                e
            ))
        })?;

        let deployer: Arc<dyn Deployer> =
            Arc::new(ScriptDeployer::new(options.script.clone(), log_dir));

        if !deployer.is_available().await {
            warn!(
                "Deployment script {} does not exist yet; eligible pushes will fail until it does",
                options.script.script.display()
            );
        }

        let gate = Arc::new(DeploymentGate::new(
            SignatureVerifier::new(&options.webhook_secret)?,
            options.branch_ref.clone(),
            deployer,
        ));

        Ok(Self { gate })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), ReceiverError> {
        info!("Shutting down application state...");
        Ok(())
    }
}
