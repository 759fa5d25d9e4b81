//! File-backed managed resource store
//!
//! Each kind lives in its own `.flaresync/state/<kind>.json` file. Every
//! write goes through load / modify / save under an advisory lock on
//! `<kind>.json.lock`, with the previous file kept as `<kind>.json.backup`.
//! A separate `lock.json` keeps two controller processes from working on the
//! same project at once.

use crate::error::{CloudError, Result};
use crate::external::{Managed, ResourceKind};
use crate::managed::{ManagedResource, ResourceStatus};
use crate::store::{ResourceStore, SpecWriter, merge_applied};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".flaresync";
const STATE_SUBDIR: &str = "state";
const LOCK_FILE: &str = "lock.json";

/// On-disk contents of one kind's state file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "P: Serialize, O: Serialize",
    deserialize = "P: DeserializeOwned, O: DeserializeOwned"
))]
pub struct StateFile<P, O> {
    /// State file version
    pub version: u32,

    pub kind: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Managed resources indexed by name
    #[serde(default = "BTreeMap::new")]
    pub resources: BTreeMap<String, ManagedResource<P, O>>,
}

impl<P, O> StateFile<P, O> {
    pub fn new(kind: &str) -> Self {
        Self {
            version: STATE_VERSION,
            kind: kind.to_string(),
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

type KindState<K> = StateFile<<K as ResourceKind>::Params, <K as ResourceKind>::Observation>;

/// Path of the project state directory (`<root>/.flaresync`)
pub fn state_dir(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR)
}

pub struct FileStore<K: ResourceKind> {
    path: PathBuf,
    /// Readers share, load / modify / save cycles of this process are exclusive
    access: RwLock<()>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> FileStore<K> {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        let path = state_dir(project_root.as_ref())
            .join(STATE_SUBDIR)
            .join(format!("{}.json", K::KIND.to_lowercase()));
        Self {
            path,
            access: RwLock::new(()),
            _kind: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.backup")
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    /// Load the current state. A missing file is an empty state.
    pub async fn load(&self) -> Result<KindState<K>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(kind = K::KIND, "State file not found, returning empty state");
                return Ok(StateFile::new(K::KIND));
            }
            Err(e) => return Err(e.into()),
        };
        let state: KindState<K> = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        if state.kind != K::KIND {
            return Err(CloudError::StateError(format!(
                "{} holds {} resources, expected {}",
                self.path.display(),
                state.kind,
                K::KIND
            )));
        }

        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup. The new
    /// contents replace the state file by rename, so readers see either the
    /// old or the new file.
    async fn save(&self, state: &mut KindState<K>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        if self.path.exists() {
            fs::copy(&self.path, self.backup_path()).await?;
        }

        state.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(state)?;
        let temp = self.temp_path();
        fs::write(&temp, content).await?;
        fs::rename(&temp, &self.path).await?;

        tracing::debug!(
            kind = K::KIND,
            resources = state.resources.len(),
            "Saved state"
        );
        Ok(())
    }

    /// Exclusive advisory lock on `<kind>.json.lock`, shared with other
    /// processes on the same project. Released when the file is dropped.
    async fn lock_file(&self) -> Result<std::fs::File> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let path = self.lock_path();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&path)?;
            FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(|e| CloudError::LockError(format!("cannot lock state file: {}", e)))??;
        Ok(file)
    }

    async fn modify<T: Send>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Managed<K>>) -> Result<(T, bool)> + Send,
    ) -> Result<T> {
        let _guard = self.access.write().await;
        let _file_lock = self.lock_file().await?;
        let mut state = self.load().await?;
        let (value, dirty) = f(&mut state.resources)?;
        if dirty {
            self.save(&mut state).await?;
        }
        Ok(value)
    }

    fn missing(name: &str) -> CloudError {
        CloudError::ResourceNotFound(format!("{}/{}", K::KIND, name))
    }
}

#[async_trait]
impl<K: ResourceKind> ResourceStore<K> for FileStore<K> {
    async fn get(&self, name: &str) -> Result<Option<Managed<K>>> {
        let _guard = self.access.read().await;
        Ok(self.load().await?.resources.remove(name))
    }

    async fn list(&self) -> Result<Vec<Managed<K>>> {
        let _guard = self.access.read().await;
        Ok(self.load().await?.resources.into_values().collect())
    }

    async fn update_status(
        &self,
        name: &str,
        status: ResourceStatus<K::Observation>,
    ) -> Result<()> {
        self.modify(|resources| {
            let object = resources.get_mut(name).ok_or_else(|| Self::missing(name))?;
            object.status = status;
            Ok(((), true))
        })
        .await
    }

    async fn set_annotations(
        &self,
        name: &str,
        annotations: BTreeMap<String, String>,
    ) -> Result<()> {
        self.modify(|resources| {
            let object = resources.get_mut(name).ok_or_else(|| Self::missing(name))?;
            object.metadata.annotations.extend(annotations);
            Ok(((), true))
        })
        .await
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.modify(|resources| {
            let removed = resources.remove(name).is_some();
            Ok(((), removed))
        })
        .await
    }
}

#[async_trait]
impl<K: ResourceKind> SpecWriter<K> for FileStore<K> {
    async fn apply(&self, resource: Managed<K>) -> Result<()> {
        self.modify(|resources| {
            let name = resource.metadata.name.clone();
            let merged = merge_applied::<K>(resources.remove(&name), resource)?;
            resources.insert(name, merged);
            Ok(((), true))
        })
        .await
    }

    async fn request_deletion(&self, name: &str) -> Result<bool> {
        self.modify(|resources| match resources.get_mut(name) {
            Some(object) => {
                object
                    .metadata
                    .deletion_timestamp
                    .get_or_insert_with(Utc::now);
                Ok((true, true))
            }
            None => Ok((false, false)),
        })
        .await
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Acquire the project-wide controller lock. Locks older than one hour are
/// treated as stale and taken over.
pub async fn acquire_lock(project_root: impl AsRef<Path>) -> Result<StateLock> {
    let dir = state_dir(project_root.as_ref());
    fs::create_dir_all(&dir).await?;
    let lock_path = dir.join(LOCK_FILE);

    if lock_path.exists() {
        let content = fs::read_to_string(&lock_path).await?;
        let lock_info: LockInfo = serde_json::from_str(&content)?;

        let age = Utc::now().signed_duration_since(lock_info.acquired_at);
        if age.num_hours() < 1 {
            return Err(CloudError::LockError(format!(
                "State is locked by {} (pid {}) since {}",
                lock_info.holder, lock_info.pid, lock_info.acquired_at
            )));
        }

        tracing::warn!(holder = %lock_info.holder, "Removing stale lock");
    }

    let lock_info = LockInfo {
        holder: std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown".to_string()),
        pid: std::process::id(),
        acquired_at: Utc::now(),
    };
    fs::write(&lock_path, serde_json::to_string_pretty(&lock_info)?).await?;

    tracing::debug!("Acquired state lock");
    Ok(StateLock {
        lock_path,
        released: false,
    })
}

/// RAII guard for the controller lock
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
