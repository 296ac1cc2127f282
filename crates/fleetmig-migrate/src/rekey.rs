//! Composite-key rekeying
//!
//! Document ids follow `<scope>:<local>`. Ids are immutable once stored, so
//! giving a document a new id is always a pair of operations: remove the
//! old id (asserting it exists) and insert a copy under the new id
//! (asserting it is free). The copy never carries store bookkeeping fields.

use crate::error::{FieldResultExt, StepError};
use crate::step::{MigrationState, Scan, Step, StepPlan};
use async_trait::async_trait;
use fleetmig_store::{Document, DocumentStore, Operation, Transaction, ID_FIELD};
use tracing::debug;

/// Store-internal fields dropped from every copied document
pub const BOOKKEEPING_FIELDS: [&str; 3] = [ID_FIELD, "txn-revno", "txn-queue"];

/// Split `scope:local` on the first `:`
///
/// Returns `None` unless both parts are non-empty.
#[must_use]
pub fn split_doc_id(id: &str) -> Option<(&str, &str)> {
    match id.split_once(':') {
        Some((scope, local)) if !scope.is_empty() && !local.is_empty() => Some((scope, local)),
        _ => None,
    }
}

/// Local part of a scoped id, or the id itself if it has no scope
#[must_use]
pub fn local_id(id: &str) -> &str {
    split_doc_id(id).map_or(id, |(_, local)| local)
}

/// Copy of `doc` without bookkeeping fields
#[must_use]
pub fn strip_bookkeeping(doc: &Document) -> Document {
    doc.without(&BOOKKEEPING_FIELDS)
}

/// Remove `old_id` from one collection and insert `body` as `new_id` in another
#[must_use]
pub fn relocate(
    from_collection: &str,
    old_id: &str,
    to_collection: &str,
    new_id: &str,
    body: Document,
) -> [Operation; 2] {
    [
        Operation::remove(from_collection, old_id),
        Operation::insert(to_collection, new_id, body),
    ]
}

/// Prefix substitution on the local part of scoped ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RekeyRule {
    from_prefix: String,
    to_prefix: String,
    key_field: Option<String>,
    strip_fields: Vec<String>,
}

impl RekeyRule {
    /// Replace local prefix `from` with `to`
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_prefix: from.into(),
            to_prefix: to.into(),
            key_field: None,
            strip_fields: Vec::new(),
        }
    }

    /// Also rewrite this field to the new local key, when present
    #[must_use]
    pub fn with_key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }

    /// Drop this field from the copy
    #[must_use]
    pub fn strip_field(mut self, field: impl Into<String>) -> Self {
        self.strip_fields.push(field.into());
        self
    }

    /// New id for `id`, if it is scoped and carries the old prefix
    #[must_use]
    pub fn rekey(&self, id: &str) -> Option<String> {
        let (scope, local) = split_doc_id(id)?;
        let rest = local.strip_prefix(self.from_prefix.as_str())?;
        Some(format!("{scope}:{}{rest}", self.to_prefix))
    }

    /// Remove/insert pair moving `doc` to its new id, or `None` to skip it
    ///
    /// # Errors
    /// Fails if the document has no string id, or if the new id would have
    /// an empty local part.
    pub fn operations(
        &self,
        collection: &str,
        doc: &Document,
    ) -> Result<Option<[Operation; 2]>, StepError> {
        let old_id = doc.id().in_doc(collection, "?")?;
        let Some(new_id) = self.rekey(old_id) else {
            return Ok(None);
        };
        if split_doc_id(&new_id).is_none() {
            return Err(StepError::unexpected(
                collection,
                old_id,
                format!("rekeyed id {new_id:?} has an empty local part"),
            ));
        }

        let mut body = strip_bookkeeping(doc);
        if let Some(field) = &self.key_field {
            body.replace(field, local_id(&new_id));
        }
        for field in &self.strip_fields {
            body.remove(field);
        }
        Ok(Some(relocate(collection, old_id, collection, &new_id, body)))
    }
}

/// Step rekeying every matching document of one collection
#[derive(Debug, Clone)]
pub struct RekeyStep {
    name: String,
    description: String,
    collection: String,
    rule: RekeyRule,
}

impl RekeyStep {
    /// Rekey `collection` with `rule`; the step is named after the collection
    #[must_use]
    pub fn new(collection: impl Into<String>, rule: RekeyRule) -> Self {
        let collection = collection.into();
        Self {
            name: format!("rekey-{collection}"),
            description: format!("Updating {collection}"),
            collection,
            rule,
        }
    }
}

#[async_trait]
impl Step for RekeyStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let mut tx = Transaction::new();
        let mut scan = Scan::open(store, &self.collection).await?;
        while let Some(doc) = scan.next().await? {
            match self.rule.operations(&self.collection, &doc)? {
                Some(ops) => tx.extend(ops),
                None => debug!(
                    collection = %self.collection,
                    id = doc.id().unwrap_or("?"),
                    "skipping, not a legacy key"
                ),
            }
        }
        Ok(StepPlan::transaction(tx))
    }
}
