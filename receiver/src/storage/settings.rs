//! Receiver settings: defaults, optional JSON file, environment overrides

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::deploy::event::DEFAULT_BRANCH_REF;
use crate::errors::ReceiverError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Shipped default for the webhook secret. Never valid for a real deployment.
pub const PLACEHOLDER_SECRET: &str = "change-me-webhook-secret";

/// Receiver settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub json_logs: bool,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerSettings,

    /// Pre-shared HMAC secret
    #[serde(default = "default_secret")]
    pub webhook_secret: SecretString,

    /// Deployment script path
    #[serde(default = "default_deploy_script")]
    pub deploy_script: PathBuf,

    /// Directory for the service log and per-deployment logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Timeout for a single deployment run, in seconds
    #[serde(default = "default_deploy_timeout")]
    pub deploy_timeout_secs: u64,

    /// Branch reference whose pushes are deployed
    #[serde(default = "default_branch_ref")]
    pub branch_ref: String,

    /// Program used to run the script; `None` executes it directly
    #[serde(default = "default_interpreter")]
    pub interpreter: Option<String>,

    /// Queue overlapping deployments instead of running them concurrently
    #[serde(default)]
    pub serialize_deployments: bool,
}

fn default_secret() -> SecretString {
    SecretString::from(PLACEHOLDER_SECRET)
}

fn default_deploy_script() -> PathBuf {
    PathBuf::from("/opt/app/deploy.sh")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/webhook-receiver")
}

fn default_deploy_timeout() -> u64 {
    600
}

fn default_branch_ref() -> String {
    DEFAULT_BRANCH_REF.to_string()
}

fn default_interpreter() -> Option<String> {
    Some("bash".to_string())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            server: ServerSettings::default(),
            webhook_secret: default_secret(),
            deploy_script: default_deploy_script(),
            log_dir: default_log_dir(),
            deploy_timeout_secs: default_deploy_timeout(),
            branch_ref: default_branch_ref(),
            interpreter: default_interpreter(),
            serialize_deployments: false,
        }
    }
}

impl Settings {
    /// Load settings from an optional JSON file, then apply process environment overrides
    pub async fn load(config_file: Option<&File>) -> Result<Self, ReceiverError> {
        let mut settings = match config_file {
            Some(file) => file.read_json::<Settings>().await.map_err(|e| {
                ReceiverError::ConfigError(format!(
                    "unable to read {}: {}",
                    file.path().display(),
                    e
                ))
            })?,
            None => Settings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Override fields from environment-style variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ReceiverError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("WEBHOOK_SECRET") {
            self.webhook_secret = SecretString::from(secret);
        }
        if let Some(script) = lookup("DEPLOY_SCRIPT") {
            self.deploy_script = PathBuf::from(script);
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("WEBHOOK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("WEBHOOK_PORT") {
            self.server.port = parse_var("WEBHOOK_PORT", &port)?;
        }
        if let Some(timeout) = lookup("DEPLOY_TIMEOUT_SECS") {
            self.deploy_timeout_secs = parse_var("DEPLOY_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(branch_ref) = lookup("DEPLOY_BRANCH_REF") {
            self.branch_ref = branch_ref;
        }
        if let Some(interpreter) = lookup("DEPLOY_INTERPRETER") {
            self.interpreter = Some(interpreter).filter(|i| !i.trim().is_empty());
        }
        if let Some(serialize) = lookup("SERIALIZE_DEPLOYMENTS") {
            self.serialize_deployments = parse_var("SERIALIZE_DEPLOYMENTS", &serialize)?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.parse().map_err(ReceiverError::ConfigError)?;
        }
        Ok(())
    }

    /// Whether the webhook secret is still the shipped placeholder (or empty)
    pub fn uses_placeholder_secret(&self) -> bool {
        let secret = self.webhook_secret.expose_secret().trim();
        secret.is_empty() || secret == PLACEHOLDER_SECRET
    }

    /// Reject settings that cannot serve requests
    pub fn validate(&self) -> Result<(), ReceiverError> {
        if self.deploy_timeout_secs == 0 {
            return Err(ReceiverError::ConfigError(
                "deploy_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.branch_ref.trim().is_empty() {
            return Err(ReceiverError::ConfigError(
                "branch_ref must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ReceiverError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ReceiverError::ConfigError(format!("invalid {}='{}': {}", key, value, e)))
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
