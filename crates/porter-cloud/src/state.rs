//! Provision state
//!
//! Records the stack each region was last provisioned into, so later update
//! runs know which stack to target. Lives at `.porter/provision_state.json`.
//!
//! Runs for different regions proceed in parallel. Only the read-modify-write
//! of the state file is serialized, through a short-lived lock file created
//! with `create_new`.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use porter_core::{RegionProvisioningResult, StackId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".porter";
const STATE_FILE: &str = "provision_state.json";
const STATE_BACKUP: &str = "provision_state.json.backup";
const STATE_SCRATCH: &str = "provision_state.json.tmp";
const LOCK_FILE: &str = "provision_state.lock";

/// Held only across a load/record/save, so anything older was abandoned
const STALE_LOCK_AGE: Duration = Duration::from_secs(300);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Provisioning outcomes indexed by environment, then region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionState {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub environments: BTreeMap<String, BTreeMap<String, RegionState>>,
}

impl Default for ProvisionState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            environments: BTreeMap::new(),
        }
    }
}

impl ProvisionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(&self, environment: &str, region: &str) -> Option<&RegionState> {
        self.environments.get(environment)?.get(region)
    }

    /// Stack id from the last successful run, if any
    pub fn stack_id(&self, environment: &str, region: &str) -> Option<&StackId> {
        self.region(environment, region)?.result.stack_id.as_ref()
    }

    /// Record a run. Results without a stack id are ignored.
    pub fn record(&mut self, environment: &str, region: &str, result: &RegionProvisioningResult) {
        if result.stack_id.is_none() {
            return;
        }
        let now = Utc::now();
        self.environments
            .entry(environment.to_string())
            .or_default()
            .insert(
                region.to_string(),
                RegionState {
                    result: result.clone(),
                    updated_at: now,
                },
            );
        self.updated_at = now;
    }

    pub fn region_count(&self) -> usize {
        self.environments.values().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionState {
    #[serde(flatten)]
    pub result: RegionProvisioningResult,
    pub updated_at: DateTime<Utc>,
}

/// Reads and updates the state file under a project root
pub struct StateManager {
    project_root: PathBuf,
    lock_timeout: Duration,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// How long `record` waits for another writer before giving up
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    /// Current state; a missing file reads as empty
    pub async fn load(&self) -> Result<ProvisionState> {
        let path = self.state_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file yet");
                return Ok(ProvisionState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: ProvisionState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "{} has version {}, this build reads up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        debug!(regions = state.region_count(), "Loaded provision state");
        Ok(state)
    }

    /// Replace the state file. The previous copy is kept as a backup and the
    /// new one is renamed into place, so readers never see a partial file.
    pub async fn save(&self, state: &ProvisionState) -> Result<()> {
        fs::create_dir_all(self.state_dir()).await?;

        let path = self.state_path();
        match fs::copy(&path, self.backup_path()).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let scratch = self.state_dir().join(STATE_SCRATCH);
        fs::write(&scratch, serde_json::to_vec_pretty(state)?).await?;
        fs::rename(&scratch, &path).await?;

        debug!(regions = state.region_count(), "Saved provision state");
        Ok(())
    }

    /// Merge one region's result into the stored state and persist it.
    ///
    /// Safe to call from concurrent runs: each call re-reads the file under
    /// the lock, so entries written by other regions are kept.
    pub async fn record(
        &self,
        environment: &str,
        region: &str,
        result: &RegionProvisioningResult,
    ) -> Result<ProvisionState> {
        if result.stack_id.is_none() {
            return self.load().await;
        }

        let lock = self.lock().await?;
        let updated = async {
            let mut state = self.load().await?;
            state.record(environment, region, result);
            self.save(&state).await?;
            Ok::<_, CloudError>(state)
        }
        .await;
        lock.release().await?;
        updated
    }

    /// Take the writer lock, waiting up to the configured timeout
    pub async fn lock(&self) -> Result<StateLock> {
        fs::create_dir_all(self.state_dir()).await?;

        let path = self.lock_path();
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    debug!(path = %path.display(), "State lock taken");
                    let lock = StateLock {
                        path,
                        released: false,
                    };
                    file.write_all(&serde_json::to_vec(&LockHolder::current())?)
                        .await?;
                    file.flush().await?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            if self.clear_stale_lock(&path).await? {
                continue;
            }
            if Instant::now() >= deadline {
                let holder = LockHolder::read(&path).await;
                return Err(CloudError::LockError(format!(
                    "{} still held after {:?}{}",
                    path.display(),
                    self.lock_timeout,
                    holder.map(|h| format!(" by {h}")).unwrap_or_default()
                )));
            }
            sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    /// Remove an abandoned lock file. True when the lock is gone, either
    /// removed here or released by its holder in the meantime.
    async fn clear_stale_lock(&self, path: &Path) -> Result<bool> {
        let modified = match fs::metadata(path).await {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age < STALE_LOCK_AGE {
            return Ok(false);
        }

        warn!(path = %path.display(), age_secs = age.as_secs(), "Removing stale state lock");
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    pid: u32,
    host: String,
    acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            host: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        }
    }

    async fn read(path: &Path) -> Option<Self> {
        let content = fs::read(path).await.ok()?;
        serde_json::from_slice(&content).ok()
    }
}

impl std::fmt::Display for LockHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid {} on {} since {}", self.pid, self.host, self.acquired_at)
    }
}

/// The lock file is removed on release, or on drop if a task bails early
pub struct StateLock {
    path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
