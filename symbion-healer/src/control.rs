//! Monitor → detect → remediate control loop
//!
//! One cycle walks the fleet in load order: fetch metrics, detect breaches,
//! remediate flagged targets and record each attempt, then persist the
//! whole-fleet status once every target has been seen. Targets run through
//! a bounded buffer (`max_concurrency`, 1 = strictly sequential) that keeps
//! results in fleet order.
//!
//! A target's failure never aborts the cycle. The cancellation token is
//! checked before each target starts and between cycles: in-flight targets
//! finish (history included), targets not yet started are skipped, and the
//! partial status of a cancelled cycle is not persisted.

use crate::anomaly::AnomalyDetector;
use crate::clock::Clock;
use crate::config::HealerConfig;
use crate::history::HistoryRecorder;
use crate::metrics::{MetricsBackend, MetricsClient};
use crate::models::{
    FleetStatus, HealingRecord, MetricSnapshot, Remediation, RemediationOutcome, ServerTarget,
    TargetStatus,
};
use crate::remediation::RemediationAgent;
use crate::remote::SessionConnector;
use crate::status::StatusStore;
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Summary of one pass over the fleet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub targets: usize,
    pub processed: usize,
    pub anomalous: usize,
    pub installed: usize,
    pub restarted: usize,
    pub still_anomalous: usize,
    pub failed: usize,
    pub history_errors: usize,
    pub target_errors: usize,
    pub status_persisted: bool,
    pub cancelled: bool,
}

struct TargetResult {
    status: TargetStatus,
    remediation: Option<Remediation>,
    history_failed: bool,
}

pub struct ControlLoop {
    fleet: Vec<ServerTarget>,
    metrics: MetricsClient,
    detector: AnomalyDetector,
    agent: RemediationAgent,
    history: Arc<HistoryRecorder>,
    status: StatusStore,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    max_concurrency: usize,
    target_budget: Duration,
}

impl ControlLoop {
    pub fn new(
        config: &HealerConfig,
        fleet: Vec<ServerTarget>,
        backend: Arc<dyn MetricsBackend>,
        connector: Arc<dyn SessionConnector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = MetricsClient::new(backend);
        let detector = AnomalyDetector::new(config.thresholds);
        let agent = RemediationAgent::new(
            connector,
            metrics.clone(),
            detector,
            clock.clone(),
            config.remediation.clone(),
        );

        Self {
            fleet,
            metrics,
            detector,
            agent,
            history: Arc::new(HistoryRecorder::new(&config.history_file)),
            status: StatusStore::new(&config.status_file),
            clock,
            poll_interval: config.poll_interval(),
            max_concurrency: config.max_concurrency.max(1),
            target_budget: config.remediation.target_budget(),
        }
    }

    pub fn fleet(&self) -> &[ServerTarget] {
        &self.fleet
    }

    pub fn history(&self) -> Arc<HistoryRecorder> {
        self.history.clone()
    }

    /// Repeat cycles at the poll interval until the token is cancelled.
    /// Returns the number of cycles started.
    pub async fn run(&self, token: CancellationToken) -> u64 {
        info!(
            "Control loop started: {} targets every {}s (concurrency {})",
            self.fleet.len(),
            self.poll_interval.as_secs(),
            self.max_concurrency
        );

        let mut cycles = 0;
        while !token.is_cancelled() {
            cycles += 1;
            let report = self.run_cycle(&token).await;
            if report.cancelled {
                break;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.clock.sleep(self.poll_interval) => {}
            }
        }

        info!("Control loop stopped after {} cycles", cycles);
        cycles
    }

    /// One full pass over the fleet
    pub async fn run_cycle(&self, token: &CancellationToken) -> CycleReport {
        info!("--- Checking server health ({} targets) ---", self.fleet.len());

        let results: Vec<Option<Option<TargetResult>>> = futures::stream::iter(self.fleet.iter())
            .map(|target| async move {
                if token.is_cancelled() {
                    debug!("Shutdown requested, skipping {}", target.instance());
                    return None;
                }
                Some(self.guarded(target).await)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut report = CycleReport {
            targets: self.fleet.len(),
            ..Default::default()
        };
        let mut fleet_status: FleetStatus = Vec::with_capacity(self.fleet.len());

        for result in results {
            match result {
                None => report.cancelled = true,
                Some(None) => {
                    report.processed += 1;
                    report.target_errors += 1;
                }
                Some(Some(result)) => {
                    report.processed += 1;
                    if !result.status.anomalies.is_empty() {
                        report.anomalous += 1;
                    }
                    if result.history_failed {
                        report.history_errors += 1;
                    }
                    match result.remediation.map(|r| r.outcome) {
                        Some(RemediationOutcome::InstalledAndStarted) => report.installed += 1,
                        Some(RemediationOutcome::Restarted) => report.restarted += 1,
                        Some(RemediationOutcome::RemediatedButStillAnomalous { .. }) => {
                            report.still_anomalous += 1
                        }
                        Some(RemediationOutcome::Failed(_)) => report.failed += 1,
                        None => {}
                    }
                    fleet_status.push(result.status);
                }
            }
        }

        if report.cancelled {
            warn!(
                "Cycle interrupted after {}/{} targets, keeping previous status",
                report.processed, report.targets
            );
            return report;
        }

        match self.status.persist(&fleet_status).await {
            Ok(()) => report.status_persisted = true,
            Err(e) => error!("Failed to save status to {}: {}", self.status.path().display(), e),
        }

        info!(
            "Cycle complete: {} anomalous, {} installed, {} restarted, {} still anomalous, {} failed",
            report.anomalous,
            report.installed,
            report.restarted,
            report.still_anomalous,
            report.failed
        );
        report
    }

    /// Remediation under the per-target budget; a panic or an elapsed budget
    /// still yields a `Failed` outcome so the attempt is recorded
    async fn bounded_remediation(
        &self,
        target: &ServerTarget,
        snapshot: MetricSnapshot,
    ) -> Remediation {
        let budget = self.target_budget.as_secs();
        let attempt = AssertUnwindSafe(self.agent.remediate(target, snapshot)).catch_unwind();

        match tokio::time::timeout(self.target_budget, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                error!("Remediation of {} panicked", target.address);
                Remediation::failed(snapshot, "remediation panicked")
            }
            Err(_) => {
                error!("Remediation of {} exceeded {}s budget", target.address, budget);
                Remediation::failed(snapshot, format!("remediation timed out after {}s", budget))
            }
        }
    }

    /// Contain a panic outside remediation (metrics, history) so the rest of
    /// the cycle proceeds
    async fn guarded(&self, target: &ServerTarget) -> Option<TargetResult> {
        match AssertUnwindSafe(self.process_target(target)).catch_unwind().await {
            Ok(result) => Some(result),
            Err(_) => {
                error!("Error monitoring {}: target processing panicked", target.instance());
                None
            }
        }
    }

    async fn process_target(&self, target: &ServerTarget) -> TargetResult {
        let instance = target.instance();
        let span = info_span!("target", instance = %instance);

        async move {
            let reading = self.metrics.fetch(target).await;
            let snapshot = reading.snapshot;
            let anomalies = self.detector.detect(&snapshot);

            let mut remediation = None;
            let mut history_failed = false;

            if anomalies.is_empty() {
                info!(
                    "{} is healthy (CPU: {:.2}%, RAM: {:.2}%, DISK: {:.2}%)",
                    instance, snapshot.cpu, snapshot.ram, snapshot.disk
                );
            } else {
                warn!("Anomalies detected on {}: {}", target.address, anomalies.label());

                let result = self.bounded_remediation(target, snapshot).await;

                let record = HealingRecord::new(self.clock.now(), target, &anomalies, &result);
                if let Err(e) = self.history.append(&record).await {
                    error!("Error logging healing history for {}: {}", target.address, e);
                    history_failed = true;
                }
                remediation = Some(result);
            }

            TargetResult {
                status: TargetStatus {
                    target: instance,
                    metrics: snapshot,
                    anomalies,
                    unavailable: reading.unavailable,
                },
                remediation,
                history_failed,
            }
        }
        .instrument(span)
        .await
    }
}
