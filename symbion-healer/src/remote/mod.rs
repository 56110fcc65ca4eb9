//! Remote execution on fleet targets
//!
//! Handles the secure shell side of remediation:
//! - Session establishment with private-key authentication
//! - Command execution with bounded timeouts
//! - Provisioning script upload
//!
//! `SessionConnector` is the seam the remediation agent depends on; the
//! production implementation drives the system OpenSSH client.

mod openssh;

pub use openssh::OpenSshConnector;

use crate::error::RemediationSessionError;
use crate::models::ServerTarget;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

/// Output of one remote command
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u128,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a non-zero exit into a `Command` error
    pub fn check(self, command: &str) -> Result<Self, RemediationSessionError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RemediationSessionError::Command {
                command: command.to_string(),
                code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// An authenticated shell on one target
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a command; non-zero exits are returned, not raised
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, RemediationSessionError>;

    async fn upload(&mut self, local: &Path, remote: &str) -> Result<(), RemediationSessionError>;

    async fn close(&mut self) {}
}

#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        target: &ServerTarget,
    ) -> Result<Box<dyn RemoteSession>, RemediationSessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_non_zero_exit() {
        let output = CommandOutput {
            stderr: "sudo: a password is required\n".into(),
            exit_code: Some(1),
            ..Default::default()
        };
        match output.check("sudo /tmp/install.sh") {
            Err(RemediationSessionError::Command { command, code, stderr }) => {
                assert_eq!(command, "sudo /tmp/install.sh");
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "sudo: a password is required");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(CommandOutput::success("active").check("systemctl is-active x").is_ok());
    }
}
