//! Persistence boundary for testability
//!
//! The service only sees [`TreeRepository`]; the CLI uses the JSON file
//! implementation, tests use the in-memory one.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use crate::domain::TreeSnapshot;
use crate::infrastructure::{InfraError, InfraResult};

/// Storage for whole-tree snapshots.
pub trait TreeRepository: Send + Sync {
    /// Load the stored snapshot; `None` if nothing has been stored yet.
    fn load(&self) -> InfraResult<Option<TreeSnapshot>>;

    /// Replace the stored snapshot.
    ///
    /// With `base_version` set, the write is refused unless the stored
    /// snapshot (version 0 when absent) still carries that version.
    fn save(&self, snapshot: &TreeSnapshot, base_version: Option<u64>) -> InfraResult<()>;
}

fn check_base(stored: Option<&TreeSnapshot>, base_version: Option<u64>) -> InfraResult<()> {
    if let Some(expected) = base_version {
        let actual = stored.map(|s| s.version).unwrap_or(0);
        if actual != expected {
            return Err(InfraError::StaleFile { expected, actual });
        }
    }
    Ok(())
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Pretty-printed JSON file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TreeRepository for JsonFileRepository {
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> InfraResult<Option<TreeSnapshot>> {
        if !self.path.exists() {
            debug!("no stored tree");
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| InfraError::io(format!("read {}", self.path.display()), e))?;
        let snapshot: TreeSnapshot = serde_json::from_str(&content)
            .map_err(|e| InfraError::serialization(self.path.display().to_string(), e))?;
        debug!(version = snapshot.version, nodes = snapshot.nodes.len(), "loaded");
        Ok(Some(snapshot))
    }

    #[instrument(level = "debug", skip(self, snapshot), fields(path = %self.path.display()))]
    fn save(&self, snapshot: &TreeSnapshot, base_version: Option<u64>) -> InfraResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| InfraError::io(format!("create {}", dir.display()), e))?;

        // held from the version check until the new file is in place
        let _lock = SaveLock::acquire(&self.path)?;
        check_base(self.load()?.as_ref(), base_version)?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| InfraError::io(format!("create temp file in {}", dir.display()), e))?;
        serde_json::to_writer_pretty(&mut tmp, snapshot)
            .map_err(|e| InfraError::serialization(self.path.display().to_string(), e))?;
        tmp.write_all(b"\n")
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| InfraError::io(format!("write {}", self.path.display()), e))?;
        tmp.persist(&self.path)
            .map_err(|e| InfraError::io(format!("replace {}", self.path.display()), e.error))?;
        debug!(version = snapshot.version, "saved");
        Ok(())
    }
}

/// Path of the lock file guarding writes to `target`.
pub fn lock_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive `<file>.lock`, created atomically and removed on drop.
#[derive(Debug)]
struct SaveLock {
    path: PathBuf,
}

impl SaveLock {
    fn acquire(target: &Path) -> InfraResult<Self> {
        let path = lock_path(target);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(InfraError::Locked { path }),
            Err(e) => Err(InfraError::io(format!("create {}", path.display()), e)),
        }
    }
}

impl Drop for SaveLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "cannot remove lock file");
        }
    }
}

/// Volatile repository for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    snapshot: Mutex<Option<TreeSnapshot>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: TreeSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    fn lock(&self) -> InfraResult<std::sync::MutexGuard<'_, Option<TreeSnapshot>>> {
        self.snapshot
            .lock()
            .map_err(|_| InfraError::Application(crate::application::ApplicationError::LockPoisoned))
    }
}

impl TreeRepository for InMemoryRepository {
    fn load(&self) -> InfraResult<Option<TreeSnapshot>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, snapshot: &TreeSnapshot, base_version: Option<u64>) -> InfraResult<()> {
        let mut stored = self.lock()?;
        check_base(stored.as_ref(), base_version)?;
        *stored = Some(snapshot.clone());
        Ok(())
    }
}
