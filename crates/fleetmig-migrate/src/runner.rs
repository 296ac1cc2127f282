//! Transaction runner
//!
//! The runner is the only component that mutates the document store. It is
//! bound to one [`RunMode`] for its lifetime:
//!
//! - `Live`: transactions go to the store; a store error is returned as is.
//! - `Preview`: the store is never contacted and every call succeeds.
//!
//! In both modes each operation is described to the context's audit sink,
//! in apply order, so the two logs have the same shape.

use crate::error::RunnerError;
use fleetmig_context::{AuditRecord, Context, RunMode};
use fleetmig_store::{DocumentStore, Transaction};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A local file a step needs written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    /// Destination path
    pub path: PathBuf,
    /// File contents
    pub contents: String,
    /// Unix permission bits
    pub mode: u32,
}

impl PlannedFile {
    /// Owner-only file
    #[must_use]
    pub fn private(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            mode: 0o600,
        }
    }
}

/// Applies transactions, or describes them in preview
#[derive(Clone)]
pub struct TransactionRunner {
    store: Arc<dyn DocumentStore>,
    context: Context,
}

impl TransactionRunner {
    /// Runner over `store` with the mode and audit sink of `context`
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, context: Context) -> Self {
        Self { store, context }
    }

    /// Run mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.context.mode()
    }

    /// Run context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Read access to the store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Apply `tx` atomically, or describe it in preview
    ///
    /// Empty transactions are skipped in both modes.
    ///
    /// # Errors
    /// Live: the store's error, unchanged. Either mode: audit sink failures.
    pub async fn apply(&self, tx: &Transaction) -> Result<(), RunnerError> {
        if tx.is_empty() {
            debug!("empty transaction, nothing to apply");
            return Ok(());
        }

        match self.mode() {
            RunMode::Preview => {
                debug!(operations = tx.len(), "transaction (dry-run)");
                for op in tx {
                    debug!("  {op}");
                }
            }
            RunMode::Live => {
                if let Err(err) = self.store.apply_transaction(tx.operations()).await {
                    error!(error = %err, operations = tx.len(), "transaction failed");
                    for op in tx {
                        error!("  {op}");
                    }
                    return Err(err.into());
                }
                debug!(operations = tx.len(), "transaction applied");
            }
        }

        for op in tx {
            self.context.audit().record(&AuditRecord::from(op))?;
        }
        Ok(())
    }

    /// Finish transactions an interrupted run left behind; no-op in preview
    ///
    /// # Errors
    /// The store's error.
    pub async fn resume_pending(&self) -> Result<(), RunnerError> {
        if !self.mode().is_live() {
            debug!("skipping resume of pending transactions (dry-run)");
            return Ok(());
        }
        info!("making sure any pending transactions are complete");
        self.store.resume_pending_transactions().await?;
        Ok(())
    }

    /// Drop a whole collection
    ///
    /// # Errors
    /// Live: the store's error.
    pub async fn drop_collection(&self, collection: &str) -> Result<(), RunnerError> {
        info!(collection, mode = %self.mode(), "drop collection");
        if self.mode().is_live() {
            self.store.drop_collection(collection).await?;
        }
        Ok(())
    }

    /// Write a local file, creating its directory
    ///
    /// # Errors
    /// Live: I/O errors.
    pub async fn write_file(&self, file: &PlannedFile) -> Result<(), RunnerError> {
        if !self.mode().is_live() {
            debug!(
                path = %file.path.display(),
                "writing file (dry-run):\n{}\n------",
                file.contents
            );
            return Ok(());
        }

        let io_err = |source| RunnerError::File {
            path: file.path.clone(),
            source,
        };
        if let Some(parent) = file.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&file.path, &file.contents)
            .await
            .map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&file.path, std::fs::Permissions::from_mode(file.mode))
                .await
                .map_err(io_err)?;
        }
        info!(path = %file.path.display(), "wrote file");
        Ok(())
    }
}

impl std::fmt::Debug for TransactionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRunner")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmig_context::MemoryAuditSink;
    use fleetmig_store::{Document, MemoryStore, Operation, Update};

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store
            .insert_raw("units", Document::with_id("u1").with("service", "db"))
            .unwrap();
        Arc::new(store)
    }

    fn rename_tx() -> Transaction {
        Transaction::from(vec![Operation::update(
            "units",
            "u1",
            Update::new().set("application", "db").unset("service"),
        )])
    }

    #[tokio::test]
    async fn preview_records_without_mutating() {
        let store = store();
        let sink = Arc::new(MemoryAuditSink::new());
        let runner = TransactionRunner::new(store.clone(), Context::preview().with_audit(sink.clone()));

        runner.apply(&rename_tx()).await.unwrap();

        assert_eq!(sink.records().len(), 1);
        assert_eq!(store.get("units", "u1").unwrap().get_str("service").unwrap(), "db");
    }

    #[tokio::test]
    async fn preview_ignores_preconditions() {
        let store = store();
        let runner = TransactionRunner::new(store, Context::preview());
        let tx = Transaction::from(vec![Operation::remove("units", "absent")]);
        runner.apply(&tx).await.unwrap();
    }

    #[tokio::test]
    async fn live_failure_records_nothing() {
        let store = store();
        let sink = Arc::new(MemoryAuditSink::new());
        let runner = TransactionRunner::new(store, Context::live().with_audit(sink.clone()));
        let tx = Transaction::from(vec![Operation::remove("units", "absent")]);

        let err = runner.apply(&tx).await.unwrap_err();

        assert!(err.is_precondition_failure());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn empty_transactions_are_skipped() {
        let sink = Arc::new(MemoryAuditSink::new());
        let runner = TransactionRunner::new(store(), Context::live().with_audit(sink.clone()));
        runner.apply(&Transaction::new()).await.unwrap();
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn drop_collection_respects_mode() {
        let store = store();
        TransactionRunner::new(store.clone(), Context::preview())
            .drop_collection("units")
            .await
            .unwrap();
        assert_eq!(store.documents("units").len(), 1);

        TransactionRunner::new(store.clone(), Context::live())
            .drop_collection("units")
            .await
            .unwrap();
        assert!(store.documents("units").is_empty());
    }

    #[tokio::test]
    async fn write_file_respects_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = PlannedFile::private(dir.path().join("juju/lxd-client.key"), "KEY");

        TransactionRunner::new(store(), Context::preview())
            .write_file(&file)
            .await
            .unwrap();
        assert!(!file.path.exists());

        TransactionRunner::new(store(), Context::live())
            .write_file(&file)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&file.path).unwrap(), "KEY");
    }
}
