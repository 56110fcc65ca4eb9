//! Whole-fleet status snapshot (status.json)
//!
//! Replaced wholesale once per cycle. Writes go to a sibling temp file that
//! is renamed over the target, so readers never see a half-written document.

use crate::error::PersistenceError;
use crate::models::FleetStatus;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn persist(&self, status: &FleetStatus) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(status)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Saved status for {} targets to {}", status.len(), self.path.display());
        Ok(())
    }

    pub async fn load(&self) -> Result<FleetStatus, PersistenceError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}
