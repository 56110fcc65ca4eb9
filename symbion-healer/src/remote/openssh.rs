use super::{CommandOutput, RemoteSession, SessionConnector};
use crate::error::RemediationSessionError;
use crate::models::ServerTarget;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Exit status OpenSSH uses for its own failures (connect, auth)
const SSH_ERROR_EXIT: i32 = 255;

/// Connector driving the system `ssh` and `scp` binaries
#[derive(Debug, Clone)]
pub struct OpenSshConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl OpenSshConnector {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
        }
    }
}

#[async_trait]
impl SessionConnector for OpenSshConnector {
    async fn connect(
        &self,
        target: &ServerTarget,
    ) -> Result<Box<dyn RemoteSession>, RemediationSessionError> {
        let mut session = OpenSshSession {
            target: target.clone(),
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
        };

        // Round-trip a no-op so connect and auth failures surface here
        let output = session.run_ssh("true", self.connect_timeout + Duration::from_secs(5)).await?;
        if output.exit_code == Some(SSH_ERROR_EXIT) {
            return Err(classify_ssh_failure(target, &output.stderr));
        }
        output.check("true")?;

        debug!("SSH session ready for {}@{}", target.username, target.address);
        Ok(Box::new(session))
    }
}

fn classify_ssh_failure(target: &ServerTarget, stderr: &str) -> RemediationSessionError {
    if stderr.contains("Permission denied") || stderr.contains("Too many authentication failures") {
        RemediationSessionError::Auth {
            user: target.username.clone(),
            host: target.address.clone(),
        }
    } else {
        RemediationSessionError::Connect {
            host: target.address.clone(),
            reason: stderr.trim().to_string(),
        }
    }
}

struct OpenSshSession {
    target: ServerTarget,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl OpenSshSession {
    fn common_options(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.target.key_path.display().to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ]
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.target.username, self.target.address)
    }

    async fn run_ssh(
        &self,
        command: &str,
        limit: Duration,
    ) -> Result<CommandOutput, RemediationSessionError> {
        let mut cmd = AsyncCommand::new("ssh");
        cmd.args(self.common_options())
            .arg("-p")
            .arg(self.target.ssh_port.to_string())
            .arg(self.destination())
            .arg(command);
        run_with_timeout(cmd, command, limit).await
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, RemediationSessionError> {
        debug!("[{}] $ {}", self.target.address, command);
        let output = self.run_ssh(command, self.command_timeout).await?;
        if output.exit_code == Some(SSH_ERROR_EXIT) {
            return Err(classify_ssh_failure(&self.target, &output.stderr));
        }
        Ok(output)
    }

    async fn upload(&mut self, local: &Path, remote: &str) -> Result<(), RemediationSessionError> {
        if !local.exists() {
            return Err(RemediationSessionError::Transfer {
                path: local.display().to_string(),
                reason: "local file not found".to_string(),
            });
        }

        let mut cmd = AsyncCommand::new("scp");
        cmd.args(self.common_options())
            .arg("-P")
            .arg(self.target.ssh_port.to_string())
            .arg(local)
            .arg(format!("{}:{}", self.destination(), remote));

        let label = format!("scp {}", local.display());
        let output = run_with_timeout(cmd, &label, self.command_timeout).await?;
        if !output.is_success() {
            return Err(RemediationSessionError::Transfer {
                path: local.display().to_string(),
                reason: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

async fn run_with_timeout(
    mut cmd: AsyncCommand,
    label: &str,
    limit: Duration,
) -> Result<CommandOutput, RemediationSessionError> {
    let start_time = Instant::now();

    let output = tokio::time::timeout(
        limit,
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| RemediationSessionError::Timeout {
        command: label.to_string(),
        secs: limit.as_secs(),
    })??;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        execution_time_ms: start_time.elapsed().as_millis(),
    })
}
