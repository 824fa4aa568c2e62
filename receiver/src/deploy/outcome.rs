//! Deployment outcome

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Procedure exited with code 0
    Success,

    /// Procedure exited with a non-zero code
    Failed,

    /// Procedure was killed after exceeding the timeout
    Timeout,

    /// Procedure could not be run
    Error,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Timeout => "timeout",
            DeploymentStatus::Error => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeploymentStatus::Success)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one deployment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    pub status: DeploymentStatus,

    /// Human-readable summary
    pub message: String,

    /// Per-invocation log artifact
    pub log_file: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    pub duration_ms: u64,
}

impl DeploymentOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
