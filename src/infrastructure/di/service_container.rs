//! Service container for dependency injection
//!
//! Wires settings, the snapshot repository and the tree service.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::services::TreeService;
use crate::config::Settings;
use crate::domain::TreeSnapshot;
use crate::infrastructure::traits::{JsonFileRepository, TreeRepository};
use crate::infrastructure::InfraResult;

/// Container holding settings and the persistence boundary.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Snapshot storage
    pub repo: Arc<dyn TreeRepository>,
}

impl ServiceContainer {
    /// Create a container backed by the JSON file named in the settings.
    pub fn new(settings: Settings) -> Self {
        let repo = Arc::new(JsonFileRepository::new(settings.data_file.clone()));
        Self::with_deps(settings, repo)
    }

    /// Create a container with a custom repository (for testing).
    pub fn with_deps(settings: Settings, repo: Arc<dyn TreeRepository>) -> Self {
        Self {
            settings: Arc::new(settings),
            repo,
        }
    }

    /// Load the stored tree into a fresh service (empty if nothing is stored).
    #[instrument(level = "debug", skip(self))]
    pub fn open(&self) -> InfraResult<TreeService> {
        let config = self.settings.engine_config()?;
        let snapshot = self.repo.load()?.unwrap_or_else(TreeSnapshot::empty);
        Ok(TreeService::from_snapshot(snapshot, config)?)
    }

    /// Save the service state, refusing if the stored tree moved past `base_version`.
    #[instrument(level = "debug", skip(self, service))]
    pub fn persist(&self, service: &TreeService, base_version: u64) -> InfraResult<u64> {
        let snapshot = service.snapshot()?;
        self.repo.save(&snapshot, Some(base_version))?;
        debug!(version = snapshot.version, "persisted");
        Ok(snapshot.version)
    }
}
