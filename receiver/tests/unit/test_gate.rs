//! Deployment gate unit tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use webhook_receiver::deploy::event::SkipReason;
use webhook_receiver::deploy::gate::{DeploymentGate, GateDecision, InboundEvent};
use webhook_receiver::deploy::outcome::{DeploymentOutcome, DeploymentStatus};
use webhook_receiver::deploy::script::Deployer;

use crate::common::{push_body, sign, verifier};

/// Deployer double that records how often it ran
struct CountingDeployer {
    calls: AtomicUsize,
    available: bool,
    status: DeploymentStatus,
    path: PathBuf,
}

impl CountingDeployer {
    fn new(available: bool, status: DeploymentStatus) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            available,
            status,
            path: PathBuf::from("/srv/app/deploy.sh"),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Deployer for CountingDeployer {
    async fn is_available(&self) -> bool {
        self.available
    }

    fn procedure(&self) -> &Path {
        &self.path
    }

    async fn deploy(&self, _delivery_id: &str) -> DeploymentOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DeploymentOutcome {
            status: self.status,
            message: format!("deployment {}", self.status),
            log_file: PathBuf::from("/tmp/deploy_20260101_000000.log"),
            exit_code: None,
            duration_ms: 1,
        }
    }
}

fn gate(deployer: Arc<CountingDeployer>) -> DeploymentGate {
    DeploymentGate::new(verifier(), "refs/heads/main", deployer)
}

fn event<'a>(body: &'a [u8], signature: Option<&'a str>, event_type: &'a str) -> InboundEvent<'a> {
    InboundEvent {
        body,
        signature,
        event_type: Some(event_type),
        delivery_id: Some("delivery-1"),
    }
}

#[tokio::test]
async fn test_eligible_push_deploys_exactly_once() {
    let deployer = CountingDeployer::new(true, DeploymentStatus::Success);
    let gate = gate(deployer.clone());
    let body = push_body("refs/heads/main");
    let signature = sign(&body);

    let decision = gate.handle(event(&body, Some(&signature), "push")).await;

    match decision {
        GateDecision::Deployed(outcome) => assert!(outcome.is_success()),
        other => panic!("expected a deployment, got {:?}", other),
    }
    assert_eq!(deployer.calls(), 1);
}

#[tokio::test]
async fn test_unauthenticated_events_never_deploy() {
    let deployer = CountingDeployer::new(true, DeploymentStatus::Success);
    let gate = gate(deployer.clone());
    let body = push_body("refs/heads/main");
    let signature = sign(&body);
    let bare_digest = signature.trim_start_matches("sha256=").to_string();
    let tampered = push_body("refs/heads/main ");

    for (body, header) in [
        (body.as_slice(), None),
        (body.as_slice(), Some(bare_digest.as_str())),
        (body.as_slice(), Some("sha256=deadbeef")),
        (tampered.as_slice(), Some(signature.as_str())),
    ] {
        let decision = gate.handle(event(body, header, "push")).await;
        assert_eq!(decision, GateDecision::Unauthorized);
    }
    assert_eq!(deployer.calls(), 0);
}

#[tokio::test]
async fn test_bad_signature_rejected_before_parsing() {
    let deployer = CountingDeployer::new(true, DeploymentStatus::Success);
    let gate = gate(deployer.clone());

    let decision = gate
        .handle(event(b"{not json", Some("sha256=00"), "push"))
        .await;

    assert_eq!(decision, GateDecision::Unauthorized);
}

#[tokio::test]
async fn test_invalid_json_with_valid_signature() {
    let deployer = CountingDeployer::new(true, DeploymentStatus::Success);
    let gate = gate(deployer.clone());
    let body = b"{\"ref\": refs/heads/main".to_vec();
    let signature = sign(&body);

    let decision = gate.handle(event(&body, Some(&signature), "push")).await;

    assert!(matches!(decision, GateDecision::MalformedPayload(_)));
    assert_eq!(deployer.calls(), 0);
}

#[tokio::test]
async fn test_skips_do_not_deploy() {
    let deployer = CountingDeployer::new(true, DeploymentStatus::Success);
    let gate = gate(deployer.clone());

    let main = push_body("refs/heads/main");
    let main_sig = sign(&main);
    let decision = gate.handle(event(&main, Some(&main_sig), "ping")).await;
    assert_eq!(decision, GateDecision::Skipped(SkipReason::NonPushEvent));

    let develop = push_body("refs/heads/develop");
    let develop_sig = sign(&develop);
    let decision = gate.handle(event(&develop, Some(&develop_sig), "push")).await;
    assert_eq!(decision, GateDecision::Skipped(SkipReason::NonMainBranch));

    assert_eq!(deployer.calls(), 0);
}

#[tokio::test]
async fn test_missing_event_header_is_non_push() {
    let deployer = CountingDeployer::new(true, DeploymentStatus::Success);
    let gate = gate(deployer.clone());
    let body = push_body("refs/heads/main");
    let signature = sign(&body);

    let decision = gate
        .handle(InboundEvent {
            body: &body,
            signature: Some(&signature),
            event_type: None,
            delivery_id: None,
        })
        .await;

    assert_eq!(decision, GateDecision::Skipped(SkipReason::NonPushEvent));
    assert_eq!(deployer.calls(), 0);
}

#[tokio::test]
async fn test_missing_procedure_is_reported() {
    let deployer = CountingDeployer::new(false, DeploymentStatus::Success);
    let gate = gate(deployer.clone());
    let body = push_body("refs/heads/main");
    let signature = sign(&body);

    let decision = gate.handle(event(&body, Some(&signature), "push")).await;

    assert_eq!(
        decision,
        GateDecision::ProcedureMissing(PathBuf::from("/srv/app/deploy.sh"))
    );
    assert_eq!(deployer.calls(), 0);
}

#[tokio::test]
async fn test_failed_outcome_is_passed_through() {
    let deployer = CountingDeployer::new(true, DeploymentStatus::Failed);
    let gate = gate(deployer.clone());
    let body = push_body("refs/heads/main");
    let signature = sign(&body);

    let decision = gate.handle(event(&body, Some(&signature), "push")).await;

    match decision {
        GateDecision::Deployed(outcome) => assert_eq!(outcome.status, DeploymentStatus::Failed),
        other => panic!("expected a deployment, got {:?}", other),
    }
    assert_eq!(deployer.calls(), 1);
}
