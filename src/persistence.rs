//! Loading and saving the server set.
//!
//! The registry talks to a [`ServerStore`]. Saves are queued through a
//! background writer so mutations never wait on the disk; when several saves
//! pile up only the newest snapshot is written.
//!
//! The JSON layout is:
//!
//! ```json
//! {
//!   "servers": { "1": { "id": "1", "name": "blog", "host": "localhost", "port": "8000", ... } },
//!   "nextID": 2,
//!   "serverHost": "0.0.0.0",
//!   "serverPort": "8080"
//! }
//! ```

use crate::error::{Error, Result};
use crate::server::{ServerDefinition, ServerId, null_as_default};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything persisted about the server set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Definitions keyed by ID
    #[serde(default, deserialize_with = "null_as_default")]
    pub servers: BTreeMap<ServerId, ServerDefinition>,
    /// Next ID the registry will assign
    #[serde(rename = "nextID", default = "first_id")]
    pub next_id: u64,
    /// Management API host override
    #[serde(rename = "serverHost", default, skip_serializing_if = "String::is_empty")]
    pub server_host: String,
    /// Management API port override
    #[serde(rename = "serverPort", default, skip_serializing_if = "String::is_empty")]
    pub server_port: String,
}

fn first_id() -> u64 {
    1
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            servers: BTreeMap::new(),
            next_id: first_id(),
            server_host: String::new(),
            server_port: String::new(),
        }
    }
}

/// Load/save capability for the server set.
#[async_trait]
pub trait ServerStore: Send + Sync {
    /// Loads the persisted snapshot, or `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<Snapshot>>;

    /// Persists `snapshot`, replacing what was stored before.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Stores the server set as pretty-printed JSON in a single file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable file is moved on load, so the next save cannot
    /// overwrite it.
    pub fn corrupt_path(&self) -> PathBuf {
        let mut aside = self.path.clone().into_os_string();
        aside.push(".corrupt");
        PathBuf::from(aside)
    }
}

#[async_trait]
impl ServerStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        match serde_json::from_str(&content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                let aside = self.corrupt_path();
                match tokio::fs::rename(&self.path, &aside).await {
                    Ok(()) => tracing::warn!(
                        path = %self.path.display(),
                        moved_to = %aside.display(),
                        "Unreadable server set moved aside"
                    ),
                    Err(rename_err) => tracing::warn!(
                        path = %self.path.display(),
                        error = %rename_err,
                        "Failed to move unreadable server set aside"
                    ),
                }
                Err(Error::ConfigParse(format!(
                    "Failed to parse {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let data = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| Error::Persistence(format!("Failed to serialize server set: {}", e)))?;

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Persistence(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, data).await.map_err(|e| {
            Error::Persistence(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            Error::Persistence(format!("Failed to replace {}: {}", self.path.display(), e))
        })
    }
}

/// Keeps the server set in memory. Useful for embedding and tests.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<Snapshot>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that starts out holding `snapshot`
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    /// The last saved snapshot
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerStore for MemoryStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        self.snapshot
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| Error::Other("Failed to lock memory store".to_string()))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| Error::Other("Failed to lock memory store".to_string()))?;
        *guard = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Background writer; the latest queued snapshot wins.
///
/// Writes are serialized through `write_lock`, so a flush can never interleave
/// with a queued write.
pub(crate) struct SaveQueue {
    tx: watch::Sender<Option<Arc<Snapshot>>>,
    store: Arc<dyn ServerStore>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    writer: JoinHandle<()>,
}

impl SaveQueue {
    /// Spawns the writer task. Must be called inside a Tokio runtime.
    pub(crate) fn spawn(store: Arc<dyn ServerStore>) -> Self {
        let (tx, mut rx) = watch::channel::<Option<Arc<Snapshot>>>(None);
        let write_lock = Arc::new(tokio::sync::Mutex::new(()));

        let writer = {
            let store = Arc::clone(&store);
            let write_lock = Arc::clone(&write_lock);
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let _writing = write_lock.lock().await;
                    let pending = rx.borrow_and_update().clone();
                    if let Some(snapshot) = pending {
                        if let Err(e) = store.save(&snapshot).await {
                            tracing::warn!(error = %e, "Failed to save server set");
                        } else {
                            tracing::trace!(servers = snapshot.servers.len(), "Saved server set");
                        }
                    }
                }
            })
        };

        Self {
            tx,
            store,
            write_lock,
            writer,
        }
    }

    /// Queues `snapshot` for writing without waiting.
    pub(crate) fn schedule(&self, snapshot: Snapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }

    /// Writes `snapshot` now and waits for the result.
    pub(crate) async fn flush(&self, snapshot: Snapshot) -> Result<()> {
        let _writing = self.write_lock.lock().await;
        let snapshot = Arc::new(snapshot);
        self.tx.send_replace(Some(Arc::clone(&snapshot)));
        self.store.save(&snapshot).await
    }
}

impl Drop for SaveQueue {
    fn drop(&mut self) {
        self.writer.abort();
    }
}
