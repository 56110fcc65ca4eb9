/*!
Test Harness pour le Healer

Facilite l'écriture de tests de bout en bout avec:
- Répertoire temporaire pour l'historique CSV et le status JSON
- Backend de métriques et flotte simulée déjà reliés
- Horloge manuelle injectée dans la boucle
*/

use crate::clock::ManualClock;
use crate::host_stub::SimulatedFleet;
use crate::metrics_stub::StubBackend;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use symbion_healer::{
    AgentState, ControlLoop, FleetStatus, HealerConfig, HistoryRecorder, HistoryRow, MetricSnapshot,
    ServerTarget, StatusStore,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const EXPORTER_PORT: u16 = 9100;

/// Harness de test complet: une flotte, ses métriques, ses hôtes
pub struct TestHarness {
    pub dir: TempDir,
    pub config: HealerConfig,
    pub backend: StubBackend,
    pub hosts: SimulatedFleet,
    pub clock: ManualClock,
    pub fleet: Vec<ServerTarget>,
}

impl TestHarness {
    /// Crée un harness vide sur un répertoire temporaire
    pub fn new() -> Result<Self> {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok(); // Init logging pour tests

        let dir = tempfile::tempdir()?;
        let install_script = dir.path().join("install_node_exporter.sh");
        std::fs::write(&install_script, "#!/bin/sh\necho installing node_exporter\n")?;

        let mut config = HealerConfig {
            history_file: dir.path().join("healing_history.csv"),
            status_file: dir.path().join("status.json"),
            fleet_file: dir.path().join("server_config.json"),
            ..HealerConfig::default()
        };
        config.remediation.install_script = install_script;

        let backend = StubBackend::new();
        let hosts = SimulatedFleet::new().with_backend(backend.clone());

        Ok(Self {
            dir,
            config,
            backend,
            hosts,
            clock: ManualClock::new(),
            fleet: Vec::new(),
        })
    }

    /// Ajoute une cible avec ses métriques et l'état de son agent
    pub fn with_target(
        mut self,
        address: &str,
        snapshot: MetricSnapshot,
        state: AgentState,
    ) -> Self {
        let key = self.dir.path().join(format!("{}.pem", address));
        let target = ServerTarget::new(address, EXPORTER_PORT, "ubuntu", key);
        self.backend.set_metrics(&target.instance(), snapshot);
        self.hosts.add(&target, state);
        self.fleet.push(target);
        self
    }

    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn configure(mut self, f: impl FnOnce(&mut HealerConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Boucle de contrôle câblée sur les stubs du harness
    pub fn control_loop(&self) -> ControlLoop {
        ControlLoop::new(
            &self.config,
            self.fleet.clone(),
            Arc::new(self.backend.clone()),
            Arc::new(self.hosts.clone()),
            Arc::new(self.clock.clone()),
        )
    }

    pub fn history_path(&self) -> PathBuf {
        self.config.history_file.clone()
    }

    pub fn status_path(&self) -> PathBuf {
        self.config.status_file.clone()
    }

    /// Lignes de l'historique (via un recorder neuf, comme après un redémarrage)
    pub async fn history_rows(&self) -> Result<Vec<HistoryRow>> {
        Ok(HistoryRecorder::new(self.history_path()).read_all().await?)
    }

    pub async fn status(&self) -> Result<FleetStatus> {
        Ok(StatusStore::new(self.status_path()).load().await?)
    }
}
