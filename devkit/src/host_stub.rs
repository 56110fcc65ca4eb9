/*!
Hôtes simulés pour tester la réparation sans SSH

Chaque hôte reproduit l'état de node_exporter (absent, inactif, actif) et
répond aux commandes envoyées par l'agent de réparation. Les pannes
(connexion, auth, installation, redémarrage, blocage) sont injectables.
Après une installation ou un redémarrage réussi, l'hôte peut publier de
nouvelles métriques dans le `StubBackend`.
*/

use crate::metrics_stub::StubBackend;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use symbion_healer::error::RemediationSessionError;
use symbion_healer::{
    AgentState, CommandOutput, MetricSnapshot, RemoteSession, ServerTarget, SessionConnector,
};

/// Pannes injectables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFault {
    Unreachable,
    AuthRejected,
    UploadFails,
    InstallFails,
    RestartFails,
    /// La connexion panique (bug dans la couche session)
    Panics,
    /// Les commandes restent bloquées pendant cette durée
    Hang(Duration),
}

/// État observable d'un hôte simulé
#[derive(Debug, Clone)]
pub struct HostSim {
    pub target: ServerTarget,
    pub state: AgentState,
    pub fault: Option<HostFault>,
    pub healed: Option<MetricSnapshot>,
    pub commands: Vec<String>,
    pub uploads: Vec<(PathBuf, String)>,
    pub connections: usize,
    pub installs: usize,
    pub restarts: usize,
}

impl HostSim {
    fn new(target: ServerTarget, state: AgentState) -> Self {
        Self {
            target,
            state,
            fault: None,
            healed: None,
            commands: Vec::new(),
            uploads: Vec::new(),
            connections: 0,
            installs: 0,
            restarts: 0,
        }
    }
}

/// Connecteur simulé pour toute une flotte (les clones partagent l'état)
#[derive(Clone, Default)]
pub struct SimulatedFleet {
    hosts: Arc<Mutex<HashMap<String, HostSim>>>,
    backend: Option<StubBackend>,
}

impl SimulatedFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relie la flotte au backend pour publier les métriques "guéries"
    pub fn with_backend(mut self, backend: StubBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn add(&self, target: &ServerTarget, state: AgentState) {
        self.hosts
            .lock()
            .insert(target.address.clone(), HostSim::new(target.clone(), state));
    }

    pub fn set_fault(&self, address: &str, fault: HostFault) {
        if let Some(host) = self.hosts.lock().get_mut(address) {
            host.fault = Some(fault);
        }
    }

    /// Métriques publiées après une réparation réussie
    pub fn heal_to(&self, address: &str, snapshot: MetricSnapshot) {
        if let Some(host) = self.hosts.lock().get_mut(address) {
            host.healed = Some(snapshot);
        }
    }

    pub fn host(&self, address: &str) -> Option<HostSim> {
        self.hosts.lock().get(address).cloned()
    }
}

#[async_trait]
impl SessionConnector for SimulatedFleet {
    async fn connect(
        &self,
        target: &ServerTarget,
    ) -> Result<Box<dyn RemoteSession>, RemediationSessionError> {
        let fault = {
            let mut hosts = self.hosts.lock();
            let Some(host) = hosts.get_mut(&target.address) else {
                return Err(RemediationSessionError::Connect {
                    host: target.address.clone(),
                    reason: "No route to host".into(),
                });
            };
            host.connections += 1;
            host.fault
        };

        match fault {
            Some(HostFault::Unreachable) => Err(RemediationSessionError::Connect {
                host: target.address.clone(),
                reason: "Connection refused".into(),
            }),
            Some(HostFault::AuthRejected) => Err(RemediationSessionError::Auth {
                user: target.username.clone(),
                host: target.address.clone(),
            }),
            Some(HostFault::Panics) => panic!("session layer crashed for {}", target.address),
            _ => Ok(Box::new(SimulatedSession {
                address: target.address.clone(),
                fleet: self.clone(),
            })),
        }
    }
}

struct SimulatedSession {
    address: String,
    fleet: SimulatedFleet,
}

impl SimulatedSession {
    fn failure(stderr: &str, code: i32) -> CommandOutput {
        CommandOutput {
            stderr: stderr.to_string(),
            exit_code: Some(code),
            ..Default::default()
        }
    }

    fn publish_healed(&self, host: &HostSim) {
        if let (Some(backend), Some(snapshot)) = (&self.fleet.backend, host.healed) {
            backend.set_metrics(&host.target.instance(), snapshot);
        }
    }

    fn handle(&self, command: &str) -> CommandOutput {
        let mut hosts = self.fleet.hosts.lock();
        let Some(host) = hosts.get_mut(&self.address) else {
            return Self::failure("host vanished", 255);
        };
        host.commands.push(command.to_string());

        if command.starts_with("if command -v") {
            let status = match host.state {
                AgentState::NotInstalled => "NOT_INSTALLED\n",
                AgentState::InstalledInactive => "inactive\n",
                AgentState::InstalledActive => "active\n",
            };
            CommandOutput::success(status)
        } else if command.starts_with("chmod +x") {
            CommandOutput::success("")
        } else if command.starts_with("sudo systemctl restart") {
            if host.state == AgentState::NotInstalled {
                return Self::failure("Failed to restart node_exporter.service: Unit not found.", 5);
            }
            if host.fault == Some(HostFault::RestartFails) {
                return Self::failure("Job for node_exporter.service failed.", 1);
            }
            host.state = AgentState::InstalledActive;
            host.restarts += 1;
            self.publish_healed(host);
            CommandOutput::success("")
        } else if command.starts_with("sudo /") {
            if host.fault == Some(HostFault::InstallFails) {
                return Self::failure("curl: (6) Could not resolve host: github.com", 1);
            }
            host.state = AgentState::InstalledActive;
            host.installs += 1;
            self.publish_healed(host);
            CommandOutput::success("node_exporter installed\n")
        } else if command.starts_with("systemctl is-active") {
            let status = match host.state {
                AgentState::InstalledActive => "active\n",
                _ => "inactive\n",
            };
            CommandOutput {
                stdout: status.to_string(),
                exit_code: Some(if host.state == AgentState::InstalledActive { 0 } else { 3 }),
                ..Default::default()
            }
        } else {
            Self::failure("command not found", 127)
        }
    }

    fn hang(&self) -> Option<Duration> {
        match self.fleet.host(&self.address)?.fault {
            Some(HostFault::Hang(duration)) => Some(duration),
            _ => None,
        }
    }
}

#[async_trait]
impl RemoteSession for SimulatedSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, RemediationSessionError> {
        if let Some(duration) = self.hang() {
            tokio::time::sleep(duration).await;
        }
        Ok(self.handle(command))
    }

    async fn upload(&mut self, local: &Path, remote: &str) -> Result<(), RemediationSessionError> {
        let mut hosts = self.fleet.hosts.lock();
        let Some(host) = hosts.get_mut(&self.address) else {
            return Err(RemediationSessionError::Transfer {
                path: local.display().to_string(),
                reason: "host vanished".into(),
            });
        };
        if host.fault == Some(HostFault::UploadFails) {
            return Err(RemediationSessionError::Transfer {
                path: local.display().to_string(),
                reason: "No space left on device".into(),
            });
        }
        host.uploads.push((local.to_path_buf(), remote.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_then_probe_reports_active() {
        let target = ServerTarget::new("10.0.0.8", 9100, "ubuntu", "fleet.pem");
        let fleet = SimulatedFleet::new();
        fleet.add(&target, AgentState::NotInstalled);

        let mut session = fleet.connect(&target).await.unwrap();
        let probe = session.exec("if command -v node_exporter ...").await.unwrap();
        assert_eq!(probe.stdout.trim(), "NOT_INSTALLED");

        session.exec("sudo /tmp/install_node_exporter.sh").await.unwrap();
        let status = session.exec("systemctl is-active node_exporter").await.unwrap();
        assert_eq!(status.stdout.trim(), "active");
        assert_eq!(fleet.host("10.0.0.8").unwrap().installs, 1);
    }

    #[tokio::test]
    async fn test_connect_faults() {
        let target = ServerTarget::new("10.0.0.8", 9100, "ubuntu", "fleet.pem");
        let fleet = SimulatedFleet::new();
        fleet.add(&target, AgentState::InstalledActive);
        fleet.set_fault("10.0.0.8", HostFault::AuthRejected);

        assert!(matches!(
            fleet.connect(&target).await,
            Err(RemediationSessionError::Auth { .. })
        ));
        assert!(matches!(
            fleet.connect(&ServerTarget::new("10.9.9.9", 9100, "ubuntu", "fleet.pem")).await,
            Err(RemediationSessionError::Connect { .. })
        ));
    }
}
