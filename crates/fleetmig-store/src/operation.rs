//! Document operations and transactions
//!
//! An [`Operation`] names one document (collection + id), the state that
//! document must be in for the enclosing [`Transaction`] to apply, and the
//! change to make. Transactions are applied all-or-nothing.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Required document state at apply time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precondition {
    /// No assertion
    #[default]
    None,
    /// Document must be present
    MustExist,
    /// Document must be absent
    MustNotExist,
}

impl Precondition {
    /// Whether the precondition holds for a document that does / does not exist
    #[inline]
    #[must_use]
    pub fn holds(self, exists: bool) -> bool {
        match self {
            Precondition::None => true,
            Precondition::MustExist => exists,
            Precondition::MustNotExist => !exists,
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Precondition::None => "none",
            Precondition::MustExist => "must-exist",
            Precondition::MustNotExist => "must-not-exist",
        };
        f.write_str(name)
    }
}

/// Kind of an operation, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Insert a new document
    Insert,
    /// Modify fields of an existing document
    Update,
    /// Delete a document
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Field changes of an update
///
/// `set` entries are applied before `unset` entries. Keys may be dotted
/// paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Fields to set, in order
    pub set: Document,
    /// Fields to remove, in order
    pub unset: Vec<String>,
}

impl Update {
    /// Empty update
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to set
    #[inline]
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<crate::Value>) -> Self {
        self.set.insert(path, value);
        self
    }

    /// Add a field to unset
    #[inline]
    #[must_use]
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.unset.push(path.into());
        self
    }

    /// Whether the update changes nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

/// The change an operation makes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    /// Insert this document body; `_id` is taken from the operation
    Insert(Document),
    /// Apply these field changes
    Update(Update),
    /// Delete the document
    Remove,
}

/// One document mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Target collection
    pub collection: String,
    /// Target document id
    pub id: String,
    /// Required state of the target
    #[serde(default)]
    pub precondition: Precondition,
    /// What to do
    pub change: Change,
}

impl Operation {
    /// Insert `doc` as `id`, asserting the id is free
    #[must_use]
    pub fn insert(collection: impl Into<String>, id: impl Into<String>, doc: Document) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            precondition: Precondition::MustNotExist,
            change: Change::Insert(doc),
        }
    }

    /// Update `id`, asserting it exists
    #[must_use]
    pub fn update(collection: impl Into<String>, id: impl Into<String>, update: Update) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            precondition: Precondition::MustExist,
            change: Change::Update(update),
        }
    }

    /// Remove `id`, asserting it exists
    #[must_use]
    pub fn remove(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            precondition: Precondition::MustExist,
            change: Change::Remove,
        }
    }

    /// Replace the precondition
    #[inline]
    #[must_use]
    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = precondition;
        self
    }

    /// Kind of this operation
    #[inline]
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self.change {
            Change::Insert(_) => OperationKind::Insert,
            Change::Update(_) => OperationKind::Update,
            Change::Remove => OperationKind::Remove,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} [{}]",
            self.kind(),
            self.collection,
            self.id,
            self.precondition
        )?;
        match &self.change {
            Change::Insert(doc) => write!(f, " {doc}"),
            Change::Update(update) => {
                if !update.set.is_empty() {
                    write!(f, " set {}", update.set)?;
                }
                if !update.unset.is_empty() {
                    write!(f, " unset [{}]", update.unset.join(", "))?;
                }
                Ok(())
            }
            Change::Remove => Ok(()),
        }
    }
}

/// Ordered list of operations applied as a unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction {
    ops: Vec<Operation>,
}

impl Transaction {
    /// Empty transaction
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one operation
    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    /// Append several operations
    pub fn extend(&mut self, ops: impl IntoIterator<Item = Operation>) {
        self.ops.extend(ops);
    }

    /// Operations in apply order
    #[inline]
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Number of operations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether there is nothing to apply
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Take the operations out
    #[must_use]
    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }
}

impl From<Vec<Operation>> for Transaction {
    fn from(ops: Vec<Operation>) -> Self {
        Self { ops }
    }
}

impl FromIterator<Operation> for Transaction {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Transaction {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Transaction {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
