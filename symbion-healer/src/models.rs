//! Shared data model for one monitoring cycle
//!
//! Targets are loaded once and never mutated. Snapshots, reports and
//! outcomes are produced fresh every cycle and owned by the control loop.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

fn default_ssh_port() -> u16 {
    22
}

/// One fleet member (matches an entry of server_config.json)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTarget {
    #[serde(rename = "ip")]
    pub address: String,
    /// Exporter port, part of the backend instance label
    pub port: u16,
    pub username: String,
    #[serde(rename = "pem_file")]
    pub key_path: PathBuf,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
}

impl ServerTarget {
    pub fn new(
        address: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            address: address.into(),
            port,
            username: username.into(),
            key_path: key_path.into(),
            ssh_port: default_ssh_port(),
        }
    }

    /// `address:port` as it appears in the backend `instance` label
    pub fn instance(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Metric kinds in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricKind {
    Cpu,
    Ram,
    Disk,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Ram, MetricKind::Disk];
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Cpu => f.write_str("CPU"),
            MetricKind::Ram => f.write_str("RAM"),
            MetricKind::Disk => f.write_str("DISK"),
        }
    }
}

/// Utilization percentages, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(rename = "CPU")]
    pub cpu: f64,
    #[serde(rename = "RAM")]
    pub ram: f64,
    #[serde(rename = "DISK")]
    pub disk: f64,
}

impl MetricSnapshot {
    pub fn new(cpu: f64, ram: f64, disk: f64) -> Self {
        Self { cpu, ram, disk }
    }

    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Ram => self.ram,
            MetricKind::Disk => self.disk,
        }
    }

    pub fn set(&mut self, kind: MetricKind, value: f64) {
        match kind {
            MetricKind::Cpu => self.cpu = value,
            MetricKind::Ram => self.ram = value,
            MetricKind::Disk => self.disk = value,
        }
    }
}

/// A snapshot plus the metrics that had to be zero-filled
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricReading {
    pub snapshot: MetricSnapshot,
    pub unavailable: Vec<MetricKind>,
}

impl MetricReading {
    pub fn is_degraded(&self) -> bool {
        !self.unavailable.is_empty()
    }
}

/// Threshold-breach labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Anomaly {
    #[serde(rename = "High CPU")]
    HighCpu,
    #[serde(rename = "High RAM")]
    HighRam,
    #[serde(rename = "High Disk")]
    HighDisk,
}

impl Anomaly {
    pub fn for_kind(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Cpu => Anomaly::HighCpu,
            MetricKind::Ram => Anomaly::HighRam,
            MetricKind::Disk => Anomaly::HighDisk,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Anomaly::HighCpu => "High CPU",
            Anomaly::HighRam => "High RAM",
            Anomaly::HighDisk => "High Disk",
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered, deduplicated set of breaches. Empty means healthy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Anomaly>", into = "Vec<Anomaly>")]
pub struct AnomalyReport {
    anomalies: Vec<Anomaly>,
}

impl AnomalyReport {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn contains(&self, anomaly: Anomaly) -> bool {
        self.anomalies.contains(&anomaly)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.anomalies.iter().map(Anomaly::label).collect()
    }

    /// Issue label used in the healing history ("High CPU, High Disk")
    pub fn label(&self) -> String {
        self.labels().join(", ")
    }
}

impl FromIterator<Anomaly> for AnomalyReport {
    fn from_iter<I: IntoIterator<Item = Anomaly>>(iter: I) -> Self {
        let mut anomalies: Vec<Anomaly> = iter.into_iter().collect();
        anomalies.sort();
        anomalies.dedup();
        Self { anomalies }
    }
}

impl From<Vec<Anomaly>> for AnomalyReport {
    fn from(anomalies: Vec<Anomaly>) -> Self {
        anomalies.into_iter().collect()
    }
}

impl From<AnomalyReport> for Vec<Anomaly> {
    fn from(report: AnomalyReport) -> Self {
        report.anomalies
    }
}

/// Remote state of the monitoring agent as seen by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    NotInstalled,
    InstalledInactive,
    InstalledActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationAction {
    Installed,
    Restarted,
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationAction::Installed => f.write_str("Installed and Started"),
            RemediationAction::Restarted => f.write_str("Restarted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    InstalledAndStarted,
    Restarted,
    /// Command succeeded but the fresh snapshot still breaches thresholds
    RemediatedButStillAnomalous {
        action: RemediationAction,
        remaining: AnomalyReport,
    },
    Failed(String),
}

impl RemediationOutcome {
    pub fn from_action(action: RemediationAction) -> Self {
        match action {
            RemediationAction::Installed => RemediationOutcome::InstalledAndStarted,
            RemediationAction::Restarted => RemediationOutcome::Restarted,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RemediationOutcome::Failed(_))
    }
}

impl fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationOutcome::InstalledAndStarted => {
                f.write_str("Success: Installed and Started")
            }
            RemediationOutcome::Restarted => f.write_str("Success: Restarted"),
            RemediationOutcome::RemediatedButStillAnomalous { action, remaining } => {
                write!(f, "Partial: {}, still {}", action, remaining.label())
            }
            RemediationOutcome::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// Result of one remediation attempt with surrounding measurements
#[derive(Debug, Clone, PartialEq)]
pub struct Remediation {
    pub outcome: RemediationOutcome,
    pub before: MetricSnapshot,
    pub after: MetricSnapshot,
}

impl Remediation {
    /// Failure before a fresh query could be taken: after == before
    pub fn failed(before: MetricSnapshot, reason: impl Into<String>) -> Self {
        Self {
            outcome: RemediationOutcome::Failed(reason.into()),
            before,
            after: before,
        }
    }
}

/// One row of the healing history
#[derive(Debug, Clone, PartialEq)]
pub struct HealingRecord {
    pub timestamp: DateTime<Local>,
    pub target: String,
    pub issue: String,
    pub before: MetricSnapshot,
    pub after: MetricSnapshot,
    pub outcome: RemediationOutcome,
}

impl HealingRecord {
    pub fn new(
        timestamp: DateTime<Local>,
        target: &ServerTarget,
        report: &AnomalyReport,
        remediation: &Remediation,
    ) -> Self {
        Self {
            timestamp,
            target: target.address.clone(),
            issue: report.label(),
            before: remediation.before,
            after: remediation.after,
            outcome: remediation.outcome.clone(),
        }
    }
}

/// Latest known state of one target (entry of status.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub target: String,
    pub metrics: MetricSnapshot,
    pub anomalies: AnomalyReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<MetricKind>,
}

pub type FleetStatus = Vec<TargetStatus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_is_ordered_and_deduplicated() {
        let report: AnomalyReport =
            vec![Anomaly::HighDisk, Anomaly::HighCpu, Anomaly::HighDisk].into();
        assert_eq!(report.labels(), vec!["High CPU", "High Disk"]);
        assert_eq!(report.label(), "High CPU, High Disk");
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(
            RemediationOutcome::InstalledAndStarted.to_string(),
            "Success: Installed and Started"
        );
        assert_eq!(RemediationOutcome::Restarted.to_string(), "Success: Restarted");
        assert_eq!(
            RemediationOutcome::Failed("connection refused".into()).to_string(),
            "Failed: connection refused"
        );
        let partial = RemediationOutcome::RemediatedButStillAnomalous {
            action: RemediationAction::Restarted,
            remaining: vec![Anomaly::HighRam].into(),
        };
        assert_eq!(partial.to_string(), "Partial: Restarted, still High RAM");
    }

    #[test]
    fn test_target_status_json_shape() {
        let status = TargetStatus {
            target: "10.0.0.5:9100".into(),
            metrics: MetricSnapshot::new(91.0, 20.0, 30.0),
            anomalies: vec![Anomaly::HighCpu].into(),
            unavailable: Vec::new(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["target"], "10.0.0.5:9100");
        assert_eq!(json["metrics"]["CPU"], 91.0);
        assert_eq!(json["anomalies"][0], "High CPU");
        assert!(json.get("unavailable").is_none());
    }

    #[test]
    fn test_server_target_from_fleet_json() {
        let target: ServerTarget = serde_json::from_str(
            r#"{"ip": "10.0.0.7", "port": 9100, "username": "ec2-user", "pem_file": "keys/web.pem"}"#,
        )
        .unwrap();
        assert_eq!(target.instance(), "10.0.0.7:9100");
        assert_eq!(target.ssh_port, 22);
        assert_eq!(target.key_path, PathBuf::from("keys/web.pem"));
    }
}
