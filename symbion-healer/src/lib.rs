//! Symbion Healer - fleet resource monitor with automated agent repair
//!
//! Each cycle the healer:
//! - Queries CPU, RAM and Disk usage for every fleet target from Prometheus
//! - Flags targets breaching static thresholds
//! - Installs or restarts `node_exporter` on flagged targets over SSH
//! - Appends every remediation attempt to the healing history
//! - Replaces the whole-fleet status snapshot

pub mod anomaly;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod history;
pub mod metrics;
pub mod models;
pub mod remediation;
pub mod remote;
pub mod status;

pub use anomaly::AnomalyDetector;
pub use clock::{Clock, SystemClock};
pub use config::{FleetLoader, HealerConfig, RemediationConfig, Thresholds};
pub use control::{ControlLoop, CycleReport};
pub use history::{HistoryRecorder, HistoryRow};
pub use metrics::{MetricsBackend, MetricsClient, PrometheusBackend};
pub use models::*;
pub use remediation::RemediationAgent;
pub use remote::{CommandOutput, OpenSshConnector, RemoteSession, SessionConnector};
pub use status::StatusStore;
