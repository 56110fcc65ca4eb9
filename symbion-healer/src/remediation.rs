//! Remote repair of the monitoring agent on a flagged target
//!
//! Drives an idempotent install-or-restart state machine over one remote
//! session:
//! - probe the agent (`NotInstalled`, `InstalledInactive`, `InstalledActive`)
//! - absent: upload the provisioning script, mark it executable, run it
//!   with sudo, wait the install settle delay
//! - present: restart the service, wait the restart settle delay
//! - verify the service is active, then re-query the target's metrics
//!
//! Every failure is folded into a `Failed(reason)` outcome with the
//! pre-remediation snapshot used as both before and after. Nothing here
//! ever propagates to the control loop.

use crate::anomaly::AnomalyDetector;
use crate::clock::Clock;
use crate::config::RemediationConfig;
use crate::error::RemediationSessionError;
use crate::metrics::MetricsClient;
use crate::models::{
    AgentState, MetricSnapshot, Remediation, RemediationAction, RemediationOutcome, ServerTarget,
};
use crate::remote::{RemoteSession, SessionConnector};
use std::sync::Arc;
use tracing::{error, info, warn};

const NOT_INSTALLED_MARKER: &str = "NOT_INSTALLED";

pub struct RemediationAgent {
    connector: Arc<dyn SessionConnector>,
    metrics: MetricsClient,
    detector: AnomalyDetector,
    clock: Arc<dyn Clock>,
    config: RemediationConfig,
}

impl RemediationAgent {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        metrics: MetricsClient,
        detector: AnomalyDetector,
        clock: Arc<dyn Clock>,
        config: RemediationConfig,
    ) -> Self {
        Self {
            connector,
            metrics,
            detector,
            clock,
            config,
        }
    }

    /// Attempt one repair; always returns an outcome
    pub async fn remediate(&self, target: &ServerTarget, before: MetricSnapshot) -> Remediation {
        info!("Attempting to heal {}", target.address);

        match self.try_remediate(target, before).await {
            Ok(remediation) => {
                match &remediation.outcome {
                    RemediationOutcome::RemediatedButStillAnomalous { remaining, .. } => warn!(
                        "{} remediated but still anomalous: {}",
                        target.address,
                        remaining.label()
                    ),
                    outcome => info!("{} {}", target.address, outcome),
                }
                remediation
            }
            Err(e) => {
                error!("Healing failed for {}: {}", target.address, e);
                Remediation::failed(before, e.to_string())
            }
        }
    }

    async fn try_remediate(
        &self,
        target: &ServerTarget,
        before: MetricSnapshot,
    ) -> Result<Remediation, RemediationSessionError> {
        let connect_timeout = self.config.connect_timeout();
        let mut session = tokio::time::timeout(connect_timeout, self.connector.connect(target))
            .await
            .map_err(|_| RemediationSessionError::Timeout {
                command: format!("connect {}", target.address),
                secs: connect_timeout.as_secs(),
            })??;

        let result = self.drive(session.as_mut(), target, before).await;
        session.close().await;
        result
    }

    async fn drive(
        &self,
        session: &mut dyn RemoteSession,
        target: &ServerTarget,
        before: MetricSnapshot,
    ) -> Result<Remediation, RemediationSessionError> {
        let state = self.probe(session).await?;
        info!("{} agent state: {:?}", target.address, state);

        let action = match state {
            AgentState::NotInstalled => {
                self.install(session).await?;
                RemediationAction::Installed
            }
            AgentState::InstalledInactive | AgentState::InstalledActive => {
                self.restart(session).await?;
                RemediationAction::Restarted
            }
        };

        let after = self.metrics.snapshot(target).await;
        let outcome = if self.config.require_cleared {
            let remaining = self.detector.detect(&after);
            if remaining.is_empty() {
                RemediationOutcome::from_action(action)
            } else {
                RemediationOutcome::RemediatedButStillAnomalous { action, remaining }
            }
        } else {
            RemediationOutcome::from_action(action)
        };

        Ok(Remediation { outcome, before, after })
    }

    /// Presence and liveness of the agent service
    pub async fn probe(
        &self,
        session: &mut dyn RemoteSession,
    ) -> Result<AgentState, RemediationSessionError> {
        let service = &self.config.service_name;
        let command = format!(
            "if command -v {service} >/dev/null 2>&1; then systemctl is-active {service} || true; else echo {NOT_INSTALLED_MARKER}; fi"
        );
        let output = session.exec(&command).await?.check(&command)?;
        Ok(parse_probe(&output.stdout))
    }

    async fn install(
        &self,
        session: &mut dyn RemoteSession,
    ) -> Result<(), RemediationSessionError> {
        let remote = &self.config.remote_script_path;
        warn!("{} missing, installing via {}", self.config.service_name, remote);

        session.upload(&self.config.install_script, remote).await?;
        for command in [format!("chmod +x {remote}"), format!("sudo {remote}")] {
            session.exec(&command).await?.check(&command)?;
        }

        self.clock.sleep(self.config.install_settle()).await;
        self.verify_active(session).await
    }

    async fn restart(
        &self,
        session: &mut dyn RemoteSession,
    ) -> Result<(), RemediationSessionError> {
        let command = format!("sudo systemctl restart {}", self.config.service_name);
        session.exec(&command).await?.check(&command)?;

        self.clock.sleep(self.config.restart_settle()).await;
        self.verify_active(session).await
    }

    async fn verify_active(
        &self,
        session: &mut dyn RemoteSession,
    ) -> Result<(), RemediationSessionError> {
        let command = format!("systemctl is-active {}", self.config.service_name);
        let output = session.exec(&command).await?;
        let state = output.stdout.trim();
        if state == "active" {
            Ok(())
        } else {
            Err(RemediationSessionError::Verification {
                service: self.config.service_name.clone(),
                state: if state.is_empty() { "unknown".to_string() } else { state.to_string() },
            })
        }
    }
}

pub(crate) fn parse_probe(stdout: &str) -> AgentState {
    let status = stdout.trim();
    if status.contains(NOT_INSTALLED_MARKER) {
        AgentState::NotInstalled
    } else if status == "active" {
        AgentState::InstalledActive
    } else {
        AgentState::InstalledInactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendQueryError;
    use crate::metrics::MetricsBackend;
    use crate::remote::CommandOutput;
    use async_trait::async_trait;
    use chrono::{DateTime, Local};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    struct NoSleep;

    #[async_trait]
    impl Clock for NoSleep {
        fn now(&self) -> DateTime<Local> {
            Local::now()
        }
        async fn sleep(&self, _duration: Duration) {}
    }

    struct Flat(f64);

    #[async_trait]
    impl MetricsBackend for Flat {
        async fn query(&self, _expr: &str) -> Result<Vec<f64>, BackendQueryError> {
            Ok(vec![self.0])
        }
    }

    /// Replays probe output and records every command
    struct Recording {
        probe: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RemoteSession for Recording {
        async fn exec(&mut self, command: &str) -> Result<CommandOutput, RemediationSessionError> {
            self.log.lock().unwrap().push(command.to_string());
            if command.starts_with("if command -v") {
                Ok(CommandOutput::success(self.probe))
            } else {
                Ok(CommandOutput::success("active\n"))
            }
        }

        async fn upload(
            &mut self,
            local: &Path,
            remote: &str,
        ) -> Result<(), RemediationSessionError> {
            self.log.lock().unwrap().push(format!("upload {} {}", local.display(), remote));
            Ok(())
        }
    }

    struct RecordingConnector {
        probe: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SessionConnector for RecordingConnector {
        async fn connect(
            &self,
            _target: &ServerTarget,
        ) -> Result<Box<dyn RemoteSession>, RemediationSessionError> {
            Ok(Box::new(Recording {
                probe: self.probe,
                log: self.log.clone(),
            }))
        }
    }

    fn agent(
        probe: &'static str,
        after: f64,
        require_cleared: bool,
    ) -> (RemediationAgent, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let connector = RecordingConnector { probe, log: log.clone() };
        let config = RemediationConfig {
            require_cleared,
            ..RemediationConfig::default()
        };
        let agent = RemediationAgent::new(
            Arc::new(connector),
            MetricsClient::new(Arc::new(Flat(after))),
            AnomalyDetector::default(),
            Arc::new(NoSleep),
            config,
        );
        (agent, log)
    }

    fn target() -> ServerTarget {
        ServerTarget::new("10.0.0.3", 9100, "ubuntu", "fleet.pem")
    }

    #[test]
    fn test_parse_probe() {
        assert_eq!(parse_probe("NOT_INSTALLED\n"), AgentState::NotInstalled);
        assert_eq!(parse_probe("active\n"), AgentState::InstalledActive);
        assert_eq!(parse_probe("inactive\n"), AgentState::InstalledInactive);
        assert_eq!(parse_probe("failed"), AgentState::InstalledInactive);
    }

    #[tokio::test]
    async fn test_install_sequence() {
        let (agent, log) = agent("NOT_INSTALLED", 10.0, false);
        let before = MetricSnapshot::new(95.0, 40.0, 30.0);
        let result = agent.remediate(&target(), before).await;

        assert_eq!(result.outcome, RemediationOutcome::InstalledAndStarted);
        assert_eq!(result.before, before);
        assert_eq!(result.after, MetricSnapshot::new(10.0, 10.0, 10.0));

        let log = log.lock().unwrap();
        assert_eq!(log[1], "upload install_node_exporter.sh /tmp/install_node_exporter.sh");
        assert_eq!(log[2], "chmod +x /tmp/install_node_exporter.sh");
        assert_eq!(log[3], "sudo /tmp/install_node_exporter.sh");
        assert_eq!(log[4], "systemctl is-active node_exporter");
    }

    #[tokio::test]
    async fn test_active_agent_is_restarted() {
        let (agent, log) = agent("active", 10.0, false);
        let result = agent.remediate(&target(), MetricSnapshot::new(90.0, 0.0, 0.0)).await;

        assert_eq!(result.outcome, RemediationOutcome::Restarted);
        let log = log.lock().unwrap();
        assert!(log.iter().any(|c| c == "sudo systemctl restart node_exporter"));
        assert!(!log.iter().any(|c| c.starts_with("upload") || c.contains("chmod")));
    }

    #[tokio::test]
    async fn test_still_anomalous_when_required_cleared() {
        let (agent, _) = agent("inactive", 88.0, true);
        let result = agent.remediate(&target(), MetricSnapshot::new(90.0, 0.0, 0.0)).await;

        match result.outcome {
            RemediationOutcome::RemediatedButStillAnomalous { action, remaining } => {
                assert_eq!(action, RemediationAction::Restarted);
                assert_eq!(remaining.labels(), vec!["High CPU", "High RAM"]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
