//! Metric acquisition for fleet targets
//!
//! Provides per-target utilization snapshots from a time-series backend:
//! - CPU usage over the last minute (idle rate)
//! - Memory usage (available vs total)
//! - Root filesystem usage
//!
//! Every metric is queried independently. A failed or empty query degrades
//! that metric to 0.0 instead of failing the snapshot, so one flaky query
//! never aborts a cycle. Degraded metrics are reported alongside the
//! snapshot and logged.

mod prometheus;

pub use prometheus::PrometheusBackend;

use crate::error::BackendQueryError;
use crate::models::{MetricKind, MetricReading, MetricSnapshot, ServerTarget};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Time-series backend accepting query-language expressions
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Evaluate an instant query and return the sample values
    async fn query(&self, expr: &str) -> Result<Vec<f64>, BackendQueryError>;
}

/// Builds the PromQL expression for one metric of one exporter instance
pub fn query_for(kind: MetricKind, instance: &str) -> String {
    match kind {
        MetricKind::Cpu => format!(
            r#"(1 - avg(rate(node_cpu_seconds_total{{instance="{instance}", mode="idle"}}[1m]))) * 100"#
        ),
        MetricKind::Ram => format!(
            r#"(1 - (node_memory_MemAvailable_bytes{{instance="{instance}"}} / node_memory_MemTotal_bytes{{instance="{instance}"}})) * 100"#
        ),
        MetricKind::Disk => format!(
            r#"(1 - node_filesystem_avail_bytes{{instance="{instance}", mountpoint="/"}} / node_filesystem_size_bytes{{instance="{instance}", mountpoint="/"}}) * 100"#
        ),
    }
}

#[derive(Clone)]
pub struct MetricsClient {
    backend: Arc<dyn MetricsBackend>,
}

impl MetricsClient {
    pub fn new(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    /// Fresh snapshot for one target, never fails as a whole
    pub async fn fetch(&self, target: &ServerTarget) -> MetricReading {
        let instance = target.instance();
        let mut reading = MetricReading::default();

        for kind in MetricKind::ALL {
            match self.fetch_one(kind, &instance).await {
                Ok(value) => reading.snapshot.set(kind, value),
                Err(e) => {
                    warn!("{} query failed for {}, using 0.0: {}", kind, instance, e);
                    reading.snapshot.set(kind, 0.0);
                    reading.unavailable.push(kind);
                }
            }
        }

        debug!(
            "Metrics for {}: CPU {:.2}% RAM {:.2}% DISK {:.2}%",
            instance, reading.snapshot.cpu, reading.snapshot.ram, reading.snapshot.disk
        );
        reading
    }

    /// Snapshot only, for callers that do not care about degradation
    pub async fn snapshot(&self, target: &ServerTarget) -> MetricSnapshot {
        self.fetch(target).await.snapshot
    }

    async fn fetch_one(&self, kind: MetricKind, instance: &str) -> Result<f64, BackendQueryError> {
        let values = self.backend.query(&query_for(kind, instance)).await?;
        let value = *values.first().ok_or(BackendQueryError::NoData)?;

        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(BackendQueryError::OutOfRange(value));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Answers by metric name found in the expression
    struct FixedBackend {
        answers: HashMap<&'static str, Result<Vec<f64>, u16>>,
    }

    #[async_trait]
    impl MetricsBackend for FixedBackend {
        async fn query(&self, expr: &str) -> Result<Vec<f64>, BackendQueryError> {
            let key = ["node_cpu", "node_memory", "node_filesystem"]
                .into_iter()
                .find(|k| expr.contains(k))
                .unwrap();
            match self.answers.get(key) {
                Some(Ok(values)) => Ok(values.clone()),
                Some(Err(status)) => Err(BackendQueryError::Status(*status)),
                None => Ok(Vec::new()),
            }
        }
    }

    fn target() -> ServerTarget {
        ServerTarget::new("10.0.0.1", 9100, "ubuntu", "fleet.pem")
    }

    #[test]
    fn test_queries_target_instance() {
        let expr = query_for(MetricKind::Cpu, "10.0.0.1:9100");
        assert_eq!(
            expr,
            r#"(1 - avg(rate(node_cpu_seconds_total{instance="10.0.0.1:9100", mode="idle"}[1m]))) * 100"#
        );
        assert!(query_for(MetricKind::Disk, "h:1").contains(r#"mountpoint="/""#));
    }

    #[tokio::test]
    async fn test_each_metric_degrades_independently() {
        let backend = FixedBackend {
            answers: HashMap::from([
                ("node_cpu", Ok(vec![42.5, 99.0])),
                ("node_memory", Err(503)),
                ("node_filesystem", Ok(vec![150.0])),
            ]),
        };
        let client = MetricsClient::new(Arc::new(backend));
        let reading = client.fetch(&target()).await;

        assert_eq!(reading.snapshot, MetricSnapshot::new(42.5, 0.0, 0.0));
        assert_eq!(reading.unavailable, vec![MetricKind::Ram, MetricKind::Disk]);
    }

    #[tokio::test]
    async fn test_empty_result_is_zero() {
        let client = MetricsClient::new(Arc::new(FixedBackend { answers: HashMap::new() }));
        let reading = client.fetch(&target()).await;
        assert_eq!(reading.snapshot, MetricSnapshot::default());
        assert!(reading.is_degraded());
    }
}
