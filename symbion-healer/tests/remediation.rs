//! Remediation state machine against simulated hosts

use std::sync::Arc;
use symbion_devkit::{HostFault, ManualClock, SimulatedFleet, StubBackend};
use symbion_healer::{
    AgentState, AnomalyDetector, MetricSnapshot, MetricsClient, RemediationAgent, RemediationConfig,
    RemediationOutcome, ServerTarget,
};

struct Setup {
    agent: RemediationAgent,
    hosts: SimulatedFleet,
    clock: ManualClock,
    target: ServerTarget,
}

fn setup(state: AgentState) -> Setup {
    let target = ServerTarget::new("192.168.1.20", 9100, "ubuntu", "fleet.pem");
    let backend = StubBackend::new();
    backend.set_metrics(&target.instance(), MetricSnapshot::new(85.0, 20.0, 20.0));

    let hosts = SimulatedFleet::new().with_backend(backend.clone());
    hosts.add(&target, state);
    hosts.heal_to(&target.address, MetricSnapshot::new(5.0, 20.0, 20.0));

    let clock = ManualClock::new();
    let agent = RemediationAgent::new(
        Arc::new(hosts.clone()),
        MetricsClient::new(Arc::new(backend)),
        AnomalyDetector::default(),
        Arc::new(clock.clone()),
        RemediationConfig::default(),
    );
    Setup {
        agent,
        hosts,
        clock,
        target,
    }
}

#[tokio::test]
async fn test_inactive_agent_restarted_with_short_settle() {
    let s = setup(AgentState::InstalledInactive);
    let before = MetricSnapshot::new(85.0, 20.0, 20.0);

    let result = s.agent.remediate(&s.target, before).await;
    assert_eq!(result.outcome, RemediationOutcome::Restarted);
    assert_eq!(result.before, before);
    assert_eq!(result.after, MetricSnapshot::new(5.0, 20.0, 20.0));
    assert_eq!(s.clock.sleeps(), vec![std::time::Duration::from_secs(2)]);
}

#[tokio::test]
async fn test_auth_rejected_keeps_before_snapshot() {
    let s = setup(AgentState::NotInstalled);
    s.hosts.set_fault(&s.target.address, HostFault::AuthRejected);
    let before = MetricSnapshot::new(85.0, 20.0, 20.0);

    let result = s.agent.remediate(&s.target, before).await;
    assert_eq!(
        result.outcome,
        RemediationOutcome::Failed("authentication as ubuntu@192.168.1.20 rejected".into())
    );
    assert_eq!(result.after, before);
    assert!(s.clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_upload_failure_stops_install() {
    let s = setup(AgentState::NotInstalled);
    s.hosts.set_fault(&s.target.address, HostFault::UploadFails);

    let result = s.agent.remediate(&s.target, MetricSnapshot::new(85.0, 20.0, 20.0)).await;
    assert!(result.outcome.is_failed());

    let host = s.hosts.host(&s.target.address).unwrap();
    assert_eq!(host.installs, 0);
    assert!(!host.commands.iter().any(|c| c.starts_with("sudo")));
}

#[tokio::test]
async fn test_failed_restart_is_not_verified_as_success() {
    let s = setup(AgentState::InstalledInactive);
    s.hosts.set_fault(&s.target.address, HostFault::RestartFails);

    let result = s.agent.remediate(&s.target, MetricSnapshot::new(85.0, 20.0, 20.0)).await;
    match result.outcome {
        RemediationOutcome::Failed(reason) => {
            assert!(reason.contains("sudo systemctl restart node_exporter"))
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_second_attempt_after_install_restarts() {
    let s = setup(AgentState::NotInstalled);

    let first = s.agent.remediate(&s.target, MetricSnapshot::new(85.0, 20.0, 20.0)).await;
    let second = s.agent.remediate(&s.target, MetricSnapshot::new(85.0, 20.0, 20.0)).await;

    assert_eq!(first.outcome, RemediationOutcome::InstalledAndStarted);
    assert_eq!(second.outcome, RemediationOutcome::Restarted);
    let host = s.hosts.host(&s.target.address).unwrap();
    assert_eq!((host.installs, host.restarts), (1, 1));
}
