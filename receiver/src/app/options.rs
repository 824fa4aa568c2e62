//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use crate::deploy::script::ScriptOptions;
use crate::errors::ReceiverError;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Pre-shared HMAC secret
    pub webhook_secret: SecretString,

    /// Branch reference whose pushes are deployed
    pub branch_ref: String,

    /// Directory for per-deployment logs
    pub log_dir: PathBuf,

    /// Deployment script options
    pub script: ScriptOptions,
}

impl AppOptions {
    /// Build options from settings.
    ///
    /// The placeholder secret is refused unless `allow_placeholder_secret` is set.
    pub fn from_settings(
        settings: &Settings,
        allow_placeholder_secret: bool,
    ) -> Result<Self, ReceiverError> {
        settings.validate()?;

        if settings.uses_placeholder_secret() {
            if !allow_placeholder_secret {
                return Err(ReceiverError::ConfigError(
                    "WEBHOOK_SECRET is unset or still the placeholder; set a real secret".to_string(),
                ));
            }
            warn!("Running with the placeholder webhook secret. Do not expose this receiver.");
        }

        Ok(Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            webhook_secret: settings.webhook_secret.clone(),
            branch_ref: settings.branch_ref.clone(),
            log_dir: settings.log_dir.clone(),
            script: ScriptOptions {
                script: settings.deploy_script.clone(),
                interpreter: settings.interpreter.clone(),
                timeout: Duration::from_secs(settings.deploy_timeout_secs),
                serialize: settings.serialize_deployments,
                ..Default::default()
            },
        })
    }
}

/// Lifecycle options for the receiver
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}
