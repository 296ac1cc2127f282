//! File-backed document store
//!
//! The whole store lives in one JSON [`Snapshot`]. A transaction is first
//! appended to the snapshot's pending journal and persisted, then applied
//! and persisted again. If the process dies in between, the journal entry
//! survives and [`DocumentStore::resume_pending_transactions`] finishes it.
//!
//! Every write goes to a sibling temp file that is renamed over the
//! snapshot, so a reader never observes a half-written file.

use crate::document::Document;
use crate::error::StoreError;
use crate::memory::Snapshot;
use crate::operation::Operation;
use crate::query::Query;
use crate::store::{DocumentCursor, DocumentStore};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Document store persisted to a JSON snapshot file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Mutex<Snapshot>,
}

impl FileStore {
    /// Open an existing snapshot
    ///
    /// # Errors
    /// Fails if the file cannot be read or is not a valid snapshot.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        debug!(
            path = %path.display(),
            collections = snapshot.collections.len(),
            pending = snapshot.pending.len(),
            "opened store snapshot"
        );
        Ok(Self {
            path,
            state: Mutex::new(snapshot),
        })
    }

    /// Create a snapshot file holding `snapshot`, replacing any existing one
    ///
    /// # Errors
    /// Fails if the file cannot be written.
    pub async fn create(path: impl AsRef<Path>, snapshot: Snapshot) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        persist(&path, &snapshot).await?;
        Ok(Self {
            path,
            state: Mutex::new(snapshot),
        })
    }

    /// Path of the snapshot file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current contents
    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.clone()
    }

    /// Journal a transaction without applying it
    ///
    /// # Errors
    /// Fails if the journal cannot be persisted.
    pub async fn stage_pending(&self, ops: Vec<Operation>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.pending.push(ops);
        persist(&self.path, &state).await
    }
}

async fn persist(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state.lock().await.collections.keys().cloned().collect())
    }

    async fn find_all(&self, collection: &str, query: &Query) -> Result<DocumentCursor, StoreError> {
        let docs: Vec<Document> = self
            .state
            .lock()
            .await
            .documents(collection)
            .into_iter()
            .filter(|doc| query.matches(doc))
            .collect();
        Ok(futures::stream::iter(docs.into_iter().map(Ok)).boxed())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        self.state
            .lock()
            .await
            .get(collection, id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .collections
            .get(collection)
            .map_or(0, std::collections::BTreeMap::len))
    }

    async fn apply_transaction(&self, ops: &[Operation]) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        state.pending.push(ops.to_vec());
        if let Err(err) = persist(&self.path, &state).await {
            state.pending.pop();
            return Err(err);
        }

        state.pending.pop();
        let result = state.apply(ops);
        // Persist even on failure so the journal entry is cleared.
        persist(&self.path, &state).await?;
        result
    }

    async fn resume_pending_transactions(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.pending.is_empty() {
            return Ok(());
        }
        let result = state.resume_pending();
        persist(&self.path, &state).await?;
        let applied = result?;
        info!(applied, path = %self.path.display(), "resumed pending transactions");
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.collections.remove(collection).is_some() {
            persist(&self.path, &state).await?;
        }
        Ok(())
    }
}
