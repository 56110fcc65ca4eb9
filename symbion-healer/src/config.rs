//! Startup configuration
//!
//! Handles:
//! - Healer settings from YAML (`SYMBION_HEALER_CONFIG`, default `healer.yaml`)
//! - Fleet list from the JSON server file
//! - Validation before anything is constructed
//!
//! The resulting values are immutable and passed into every component.

use crate::error::ConfigError;
use crate::models::ServerTarget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "SYMBION_HEALER_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealerConfig {
    pub prometheus_url: String,
    pub fleet_file: PathBuf,
    pub history_file: PathBuf,
    pub status_file: PathBuf,
    pub poll_interval_secs: u64,
    pub query_timeout_secs: u64,
    /// Targets processed in parallel within a cycle (1 = sequential)
    pub max_concurrency: usize,
    pub thresholds: Thresholds,
    pub remediation: RemediationConfig,
}

/// Static breach thresholds, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cpu: f64,
    pub ram: f64,
    pub disk: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    pub service_name: String,
    pub install_script: PathBuf,
    pub remote_script_path: String,
    pub install_settle_secs: u64,
    pub restart_settle_secs: u64,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// Whole-remediation budget for one target
    pub target_budget_secs: u64,
    /// Re-run detection on the fresh snapshot before declaring success
    pub require_cleared: bool,
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            prometheus_url: "http://localhost:9090".to_string(),
            fleet_file: PathBuf::from("server_config.json"),
            history_file: PathBuf::from("healing_history.csv"),
            status_file: PathBuf::from("status.json"),
            poll_interval_secs: 30,
            query_timeout_secs: 10,
            max_concurrency: 1,
            thresholds: Thresholds::default(),
            remediation: RemediationConfig::default(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: 80.0,
            ram: 85.0,
            disk: 90.0,
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            service_name: "node_exporter".to_string(),
            install_script: PathBuf::from("install_node_exporter.sh"),
            remote_script_path: "/tmp/install_node_exporter.sh".to_string(),
            install_settle_secs: 5,
            restart_settle_secs: 2,
            connect_timeout_secs: 10,
            command_timeout_secs: 120,
            target_budget_secs: 300,
            require_cleared: false,
        }
    }
}

impl HealerConfig {
    /// Load from the path in `SYMBION_HEALER_CONFIG`, falling back to defaults
    /// when no file exists
    pub async fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "healer.yaml".into());
        Self::load_from(Path::new(&path)).await
    }

    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let txt = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = if txt.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&txt)?
        };
        config.validate()?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be > 0".into()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be > 0".into()));
        }
        let remediation = &self.remediation;
        for (name, secs) in [
            ("query_timeout_secs", self.query_timeout_secs),
            ("remediation.connect_timeout_secs", remediation.connect_timeout_secs),
            ("remediation.command_timeout_secs", remediation.command_timeout_secs),
            ("remediation.target_budget_secs", remediation.target_budget_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        for (name, value) in [
            ("cpu", self.thresholds.cpu),
            ("ram", self.thresholds.ram),
            ("disk", self.thresholds.disk),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "threshold {name}={value} outside [0, 100]"
                )));
            }
        }
        if self.remediation.service_name.trim().is_empty() {
            return Err(ConfigError::Invalid("remediation.service_name is empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl RemediationConfig {
    pub fn install_settle(&self) -> Duration {
        Duration::from_secs(self.install_settle_secs)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_secs(self.restart_settle_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn target_budget(&self) -> Duration {
        Duration::from_secs(self.target_budget_secs)
    }
}

/// Reads the ordered fleet from the JSON server file
pub struct FleetLoader;

impl FleetLoader {
    pub async fn load(path: &Path) -> Result<Vec<ServerTarget>, ConfigError> {
        let txt = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let fleet = Self::parse(&txt)?;
        info!("Loaded {} targets from {}", fleet.len(), path.display());
        Ok(fleet)
    }

    pub fn parse(txt: &str) -> Result<Vec<ServerTarget>, ConfigError> {
        let fleet: Vec<ServerTarget> = serde_json::from_str(txt)?;
        if fleet.is_empty() {
            warn!("Fleet file lists no targets");
        }
        Ok(fleet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HealerConfig::default();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.thresholds, Thresholds { cpu: 80.0, ram: 85.0, disk: 90.0 });
        assert_eq!(config.remediation.service_name, "node_exporter");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: HealerConfig = serde_yaml::from_str(
            "prometheus_url: http://prom:9090\n\
             thresholds:\n  cpu: 70\n\
             remediation:\n  require_cleared: true\n",
        )
        .unwrap();
        assert_eq!(config.prometheus_url, "http://prom:9090");
        assert_eq!(config.thresholds.cpu, 70.0);
        assert_eq!(config.thresholds.disk, 90.0);
        assert!(config.remediation.require_cleared);
        assert_eq!(config.remediation.restart_settle_secs, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = HealerConfig::default();
        config.thresholds.ram = 120.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = HealerConfig::default();
        config.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let zeroed: [fn(&mut HealerConfig); 4] = [
            |c| c.query_timeout_secs = 0,
            |c| c.remediation.connect_timeout_secs = 0,
            |c| c.remediation.command_timeout_secs = 0,
            |c| c.remediation.target_budget_secs = 0,
        ];
        for zero in zeroed {
            let mut config = HealerConfig::default();
            zero(&mut config);
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let config = HealerConfig::load_from(Path::new("/nonexistent/healer.yaml")).await.unwrap();
        assert_eq!(config.status_file, PathBuf::from("status.json"));
    }

    #[test]
    fn test_fleet_order_preserved() {
        let fleet = FleetLoader::parse(
            r#"[
                {"ip": "10.0.0.2", "port": 9100, "username": "ubuntu", "pem_file": "a.pem"},
                {"ip": "10.0.0.1", "port": 9100, "username": "ubuntu", "pem_file": "b.pem", "ssh_port": 2222}
            ]"#,
        )
        .unwrap();
        assert_eq!(fleet[0].address, "10.0.0.2");
        assert_eq!(fleet[1].ssh_port, 2222);
    }
}
