//! Error taxonomy for the healer
//!
//! Each stage of the cycle has its own error type so callers can match on
//! the kind of failure instead of on printed text:
//! - `BackendQueryError` degrades a metric to 0.0
//! - `RemediationSessionError` becomes a `Failed(reason)` outcome
//! - `PersistenceError` is logged and the cycle continues
//! - `ConfigError` is only fatal at startup

use thiserror::Error;

/// Metrics backend unreachable or unparsable
#[derive(Debug, Error)]
pub enum BackendQueryError {
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error("query returned no data points")]
    NoData,
    #[error("value {0} outside [0, 100]")]
    OutOfRange(f64),
}

impl From<reqwest::Error> for BackendQueryError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            BackendQueryError::Status(status.as_u16())
        } else if err.is_decode() {
            BackendQueryError::Malformed(err.to_string())
        } else {
            BackendQueryError::Transport(err.to_string())
        }
    }
}

/// Failure while repairing a target over the remote shell
#[derive(Debug, Error)]
pub enum RemediationSessionError {
    #[error("connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },
    #[error("authentication as {user}@{host} rejected")]
    Auth { user: String, host: String },
    #[error("upload of {path} failed: {reason}")]
    Transfer { path: String, reason: String },
    #[error("`{command}` exited with {code:?}: {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("{service} not active after remediation (state: {state})")]
    Verification { service: String, state: String },
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure writing the healing history or the fleet status
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid fleet file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RemediationSessionError::Command {
            command: "sudo systemctl restart node_exporter".into(),
            code: Some(5),
            stderr: "Unit not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "`sudo systemctl restart node_exporter` exited with Some(5): Unit not found"
        );
        assert_eq!(BackendQueryError::Status(503).to_string(), "backend returned status 503");
    }
}
