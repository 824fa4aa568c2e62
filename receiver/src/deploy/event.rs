//! Inbound event classification

use serde_json::Value;
use tracing::info;

/// Event type that can trigger a deployment
pub const PUSH_EVENT: &str = "push";

/// Default branch reference whose pushes are deployed
pub const DEFAULT_BRANCH_REF: &str = "refs/heads/main";

/// Why an authenticated event did not trigger a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NonPushEvent,
    NonMainBranch,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NonPushEvent => "non-push event",
            SkipReason::NonMainBranch => "non-main branch",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying an authenticated event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Skip(SkipReason),
    Eligible,
}

/// Decide whether an event should trigger a deployment.
///
/// Only `push` events whose `ref` equals `branch_ref` are eligible. A push
/// without a string `ref` counts as a non-main branch.
pub fn classify(event_type: &str, payload: &Value, branch_ref: &str) -> Classification {
    if event_type != PUSH_EVENT {
        info!("Skipping '{}' event", event_type);
        return Classification::Skip(SkipReason::NonPushEvent);
    }

    match payload.get("ref").and_then(Value::as_str) {
        Some(git_ref) if git_ref == branch_ref => {
            info!("Push to {} is eligible for deployment", git_ref);
            Classification::Eligible
        }
        other => {
            info!("Skipping push to {}", other.unwrap_or("<missing ref>"));
            Classification::Skip(SkipReason::NonMainBranch)
        }
    }
}
