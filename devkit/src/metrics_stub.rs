/*!
Backend de métriques en mémoire

Remplace Prometheus pour les tests: chaque instance (`ip:port`) renvoie un
snapshot configuré, ou simule une panne. Toutes les requêtes reçues sont
enregistrées pour les assertions.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use symbion_healer::error::BackendQueryError;
use symbion_healer::{MetricKind, MetricSnapshot, MetricsBackend};

#[derive(Debug, Clone, Copy)]
enum StubTarget {
    Metrics(MetricSnapshot),
    Down,
}

/// Mock backend partagé (les clones voient le même état)
#[derive(Clone, Default)]
pub struct StubBackend {
    targets: Arc<Mutex<HashMap<String, StubTarget>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valeurs renvoyées pour une instance
    pub fn set_metrics(&self, instance: &str, snapshot: MetricSnapshot) {
        self.targets.lock().insert(instance.to_string(), StubTarget::Metrics(snapshot));
    }

    /// Toutes les requêtes de cette instance échouent
    pub fn fail(&self, instance: &str) {
        self.targets.lock().insert(instance.to_string(), StubTarget::Down);
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Nombre de requêtes visant une instance
    pub fn queries_for(&self, instance: &str) -> usize {
        let needle = format!("instance=\"{}\"", instance);
        self.queries.lock().iter().filter(|q| q.contains(&needle)).count()
    }

    fn instance_of(expr: &str) -> Option<&str> {
        let start = expr.find("instance=\"")? + "instance=\"".len();
        let end = expr[start..].find('"')? + start;
        Some(&expr[start..end])
    }

    fn kind_of(expr: &str) -> Option<MetricKind> {
        if expr.contains("node_cpu_seconds_total") {
            Some(MetricKind::Cpu)
        } else if expr.contains("node_memory_") {
            Some(MetricKind::Ram)
        } else if expr.contains("node_filesystem_") {
            Some(MetricKind::Disk)
        } else {
            None
        }
    }
}

#[async_trait]
impl MetricsBackend for StubBackend {
    async fn query(&self, expr: &str) -> Result<Vec<f64>, BackendQueryError> {
        self.queries.lock().push(expr.to_string());

        let (Some(instance), Some(kind)) = (Self::instance_of(expr), Self::kind_of(expr)) else {
            return Err(BackendQueryError::Malformed(format!("unsupported query: {}", expr)));
        };

        match self.targets.lock().get(instance).copied() {
            Some(StubTarget::Metrics(snapshot)) => Ok(vec![snapshot.get(kind)]),
            Some(StubTarget::Down) => Err(BackendQueryError::Transport("simulated outage".into())),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbion_healer::metrics::query_for;

    #[tokio::test]
    async fn test_stub_answers_by_instance_and_kind() {
        let backend = StubBackend::new();
        backend.set_metrics("10.0.0.1:9100", MetricSnapshot::new(91.0, 42.0, 13.0));
        backend.fail("10.0.0.2:9100");

        let ram = backend.query(&query_for(MetricKind::Ram, "10.0.0.1:9100")).await.unwrap();
        assert_eq!(ram, vec![42.0]);
        assert!(backend.query(&query_for(MetricKind::Cpu, "10.0.0.2:9100")).await.is_err());
        let missing = backend.query(&query_for(MetricKind::Cpu, "10.0.0.3:9100")).await.unwrap();
        assert!(missing.is_empty());
        assert_eq!(backend.queries_for("10.0.0.1:9100"), 1);
    }
}
