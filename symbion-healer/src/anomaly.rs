//! Static threshold detection
//!
//! Each poll is judged on its own: a breach is `value > threshold`, with no
//! hysteresis or minimum duration. A metric hovering around its threshold
//! therefore triggers remediation on every cycle it is briefly above it.

use crate::config::Thresholds;
use crate::models::{Anomaly, AnomalyReport, MetricKind, MetricSnapshot};

#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    thresholds: Thresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    fn threshold(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Cpu => self.thresholds.cpu,
            MetricKind::Ram => self.thresholds.ram,
            MetricKind::Disk => self.thresholds.disk,
        }
    }

    /// Breached metrics in CPU, RAM, Disk order
    pub fn detect(&self, snapshot: &MetricSnapshot) -> AnomalyReport {
        MetricKind::ALL
            .into_iter()
            .filter(|kind| snapshot.get(*kind) > self.threshold(*kind))
            .map(Anomaly::for_kind)
            .collect()
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}
