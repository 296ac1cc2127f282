//! In-process document store
//!
//! [`Snapshot`] holds the full store contents plus the journal of
//! transactions that were recorded but not yet applied. [`MemoryStore`]
//! wraps a snapshot behind a lock; the file-backed store reuses the same
//! apply logic.

use crate::document::{Document, ID_FIELD};
use crate::error::StoreError;
use crate::operation::{Change, Operation};
use crate::query::Query;
use crate::store::{DocumentCursor, DocumentStore};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// One collection: id to document, kept in id order
pub type Collection = BTreeMap<String, Document>;

/// Complete store contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Collections by name
    pub collections: BTreeMap<String, Collection>,
    /// Transactions recorded but not applied, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<Vec<Operation>>,
}

impl Snapshot {
    /// Empty snapshot
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `doc` directly, bypassing transactions
    ///
    /// # Errors
    /// Fails if the document has no string `_id`.
    pub fn put(&mut self, collection: &str, doc: Document) -> Result<(), StoreError> {
        let id = doc
            .id()
            .map_err(|e| StoreError::InvalidOperation {
                collection: collection.to_string(),
                id: String::new(),
                reason: e.to_string(),
            })?
            .to_string();
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, doc);
        Ok(())
    }

    /// Document by id
    #[must_use]
    pub fn get(&self, collection: &str, id: &str) -> Option<&Document> {
        self.collections.get(collection)?.get(id)
    }

    /// Documents of one collection in id order
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply `ops` atomically
    ///
    /// Operations run in order against a working copy of every collection
    /// they touch; the copy replaces the originals only if all of them
    /// succeed.
    ///
    /// # Errors
    /// `StoreError::PreconditionFailed` on the first failed precondition,
    /// `StoreError::InvalidOperation` if an update cannot be applied.
    pub fn apply(&mut self, ops: &[Operation]) -> Result<(), StoreError> {
        let touched: BTreeSet<&str> = ops.iter().map(|op| op.collection.as_str()).collect();
        let mut working: BTreeMap<&str, Collection> = touched
            .iter()
            .map(|name| (*name, self.collections.get(*name).cloned().unwrap_or_default()))
            .collect();

        for op in ops {
            let Some(collection) = working.get_mut(op.collection.as_str()) else {
                continue;
            };
            apply_one(collection, op)?;
        }

        for (name, collection) in working {
            if collection.is_empty() && !self.collections.contains_key(name) {
                continue;
            }
            self.collections.insert(name.to_string(), collection);
        }
        Ok(())
    }

    /// Apply journaled transactions in order, returning how many were applied
    ///
    /// # Errors
    /// Stops at the first failing transaction, which stays at the head of
    /// the journal.
    pub fn resume_pending(&mut self) -> Result<usize, StoreError> {
        let mut applied = 0;
        while !self.pending.is_empty() {
            let ops = self.pending[0].clone();
            self.apply(&ops)?;
            self.pending.remove(0);
            applied += 1;
        }
        Ok(applied)
    }

    fn find(&self, collection: &str, query: &Query) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|c| c.values().filter(|doc| query.matches(doc)).cloned().collect())
            .unwrap_or_default()
    }
}

fn apply_one(collection: &mut Collection, op: &Operation) -> Result<(), StoreError> {
    let exists = collection.contains_key(&op.id);
    if !op.precondition.holds(exists) {
        return Err(StoreError::PreconditionFailed {
            collection: op.collection.clone(),
            id: op.id.clone(),
            expected: op.precondition,
        });
    }

    match &op.change {
        Change::Insert(body) => {
            if exists {
                return Ok(());
            }
            let mut doc = Document::with_id(op.id.as_str());
            for (name, value) in body.iter().filter(|(name, _)| *name != ID_FIELD) {
                doc.insert(name, value.clone());
            }
            collection.insert(op.id.clone(), doc);
        }
        Change::Update(update) => {
            let Some(doc) = collection.get_mut(&op.id) else {
                return Ok(());
            };
            let invalid = |reason: String| StoreError::InvalidOperation {
                collection: op.collection.clone(),
                id: op.id.clone(),
                reason,
            };
            for (path, value) in update.set.iter() {
                if path == ID_FIELD {
                    return Err(invalid("document ids are immutable".into()));
                }
                doc.set_path(path, value.clone())
                    .map_err(|e| invalid(e.to_string()))?;
            }
            for path in &update.unset {
                if path == ID_FIELD {
                    return Err(invalid("document ids are immutable".into()));
                }
                doc.unset_path(path);
            }
        }
        Change::Remove => {
            collection.remove(&op.id);
        }
    }
    Ok(())
}

/// Document store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded from a snapshot
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().clone()
    }

    /// Store `doc` directly, bypassing transactions
    ///
    /// # Errors
    /// Fails if the document has no string `_id`.
    pub fn insert_raw(&self, collection: &str, doc: Document) -> Result<(), StoreError> {
        self.state.write().put(collection, doc)
    }

    /// Document by id, if present
    #[must_use]
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.state.read().get(collection, id).cloned()
    }

    /// Documents of one collection in id order
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state.read().documents(collection)
    }

    /// Record a transaction as pending without applying it
    ///
    /// This is the state an interrupted run leaves behind.
    pub fn stage_pending(&self, ops: Vec<Operation>) {
        self.state.write().pending.push(ops);
    }

    /// Number of journaled transactions
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state.read().collections.keys().cloned().collect())
    }

    async fn find_all(&self, collection: &str, query: &Query) -> Result<DocumentCursor, StoreError> {
        let docs = self.state.read().find(collection, query);
        Ok(futures::stream::iter(docs.into_iter().map(Ok)).boxed())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        self.get(collection, id)
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self
            .state
            .read()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len))
    }

    async fn apply_transaction(&self, ops: &[Operation]) -> Result<(), StoreError> {
        self.state.write().apply(ops)
    }

    async fn resume_pending_transactions(&self) -> Result<(), StoreError> {
        let applied = self.state.write().resume_pending()?;
        debug!(applied, "resumed pending transactions");
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.state.write().collections.remove(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Precondition, Update};
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_raw("units", Document::with_id("u1").with("service", "db"))
            .unwrap();
        store
            .insert_raw("units", Document::with_id("u2").with("service", "web"))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn failed_precondition_leaves_store_untouched() {
        let store = seeded();
        let before = store.snapshot();

        let ops = vec![
            Operation::update("units", "u1", Update::new().set("application", "db")),
            Operation::insert("units", "u3", Document::new().with("service", "x")),
            Operation::remove("units", "missing"),
        ];
        let err = store.apply_transaction(&ops).await.unwrap_err();

        assert!(err.is_precondition_failure());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn applies_in_order() {
        let store = seeded();
        let ops = vec![
            Operation::remove("units", "u1"),
            Operation::insert(
                "applications",
                "m:db",
                Document::with_id("ignored").with("name", "db"),
            ),
            Operation::update(
                "units",
                "u2",
                Update::new().set("application", "web").unset("service"),
            ),
        ];
        store.apply_transaction(&ops).await.unwrap();

        assert!(store.get("units", "u1").is_none());
        assert_eq!(
            store.get("applications", "m:db").unwrap(),
            Document::with_id("m:db").with("name", "db")
        );
        assert_eq!(
            store.get("units", "u2").unwrap(),
            Document::with_id("u2").with("application", "web")
        );
    }

    #[tokio::test]
    async fn unasserted_operations_tolerate_state() {
        let store = seeded();
        let ops = vec![
            Operation::insert("units", "u1", Document::new().with("service", "other"))
                .with_precondition(Precondition::None),
            Operation::update("units", "nope", Update::new().set("a", 1))
                .with_precondition(Precondition::None),
            Operation::remove("cleanups", "c1").with_precondition(Precondition::None),
        ];
        store.apply_transaction(&ops).await.unwrap();

        assert_eq!(store.get("units", "u1").unwrap().get_str("service").unwrap(), "db");
        assert!(store.get("units", "nope").is_none());
        assert_eq!(store.list_collections().await.unwrap(), vec!["units"]);
    }

    #[tokio::test]
    async fn ids_cannot_be_updated() {
        let store = seeded();
        let err = store
            .apply_transaction(&[Operation::update("units", "u1", Update::new().set("_id", "u9"))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation { .. }));
    }

    #[tokio::test]
    async fn find_all_filters_and_orders_by_id() {
        let store = seeded();
        let docs: Vec<Document> = store
            .find_all("units", &Query::all())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);

        let web: Vec<Document> = store
            .find_all("units", &Query::all().eq("service", "web"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(web.len(), 1);

        let none: Vec<Document> = store
            .find_all("nothing", &Query::all())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn find_by_id_reports_missing() {
        let store = seeded();
        assert!(store.find_by_id("units", "u9").await.unwrap_err().is_not_found());
        assert_eq!(store.count("units").await.unwrap(), 2);
        assert_eq!(store.count("nothing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resume_applies_staged_transactions() {
        let store = seeded();
        store.stage_pending(vec![Operation::remove("units", "u1")]);
        store.stage_pending(vec![Operation::remove("units", "u2")]);
        assert_eq!(store.count("units").await.unwrap(), 2);

        store.resume_pending_transactions().await.unwrap();

        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.count("units").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_pending_transaction_stays_journaled() {
        let store = seeded();
        store.stage_pending(vec![Operation::remove("units", "u1")]);
        store.stage_pending(vec![Operation::remove("units", "u1")]);

        let err = store.resume_pending_transactions().await.unwrap_err();
        assert!(err.is_precondition_failure());
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn drop_collection_is_idempotent() {
        let store = seeded();
        store.drop_collection("units").await.unwrap();
        store.drop_collection("units").await.unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn any_failing_op_rolls_back_everything(n in 1usize..8, fail_at in 0usize..8) {
            let fail_at = fail_at % n;
            let mut snapshot = Snapshot::new();
            let ops: Vec<Operation> = (0..n)
                .map(|i| {
                    if i == fail_at {
                        Operation::remove("things", "absent")
                    } else {
                        Operation::insert("things", format!("t{i}"), Document::new().with("n", i as i64))
                    }
                })
                .collect();

            prop_assert!(snapshot.apply(&ops).is_err());
            prop_assert_eq!(snapshot, Snapshot::new());
        }
    }
}
