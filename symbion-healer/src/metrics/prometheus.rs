use super::MetricsBackend;
use crate::error::BackendQueryError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Prometheus HTTP API client (`/api/v1/query`)
#[derive(Clone)]
pub struct PrometheusBackend {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<VectorSample>,
}

/// `{"metric": {...}, "value": [<unix ts>, "<number>"]}`
#[derive(Debug, Deserialize)]
struct VectorSample {
    value: (f64, String),
}

impl PrometheusBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendQueryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("symbion-healer")
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl MetricsBackend for PrometheusBackend {
    async fn query(&self, expr: &str) -> Result<Vec<f64>, BackendQueryError> {
        let url = format!("{}/api/v1/query", self.base_url);
        debug!("PromQL: {}", expr);

        let response = self.client.get(&url).query(&[("query", expr)]).send().await?;
        if !response.status().is_success() {
            return Err(BackendQueryError::Status(response.status().as_u16()));
        }

        let body: QueryResponse = response.json().await?;
        let data = body
            .data
            .ok_or_else(|| BackendQueryError::Malformed("missing data.result".into()))?;

        data.result
            .into_iter()
            .map(|sample| {
                sample
                    .value
                    .1
                    .parse::<f64>()
                    .map_err(|e| {
                        BackendQueryError::Malformed(format!("{:?}: {}", sample.value.1, e))
                    })
            })
            .collect()
    }
}
