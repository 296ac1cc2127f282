//! Field rewrite tables
//!
//! A [`FieldRewriteStep`] turns every document of its collections into one
//! `Update` built from a fixed list of [`FieldAction`]s. A renamed field is
//! always removed by an explicit unset, and a rename whose source field is
//! absent is an error rather than a silent null.

use crate::error::{FieldResultExt, StepError};
use crate::step::{MigrationState, Scan, Step, StepPlan};
use async_trait::async_trait;
use fleetmig_store::{Document, DocumentStore, Operation, Transaction, Update, Value};

/// One entry of a rewrite table
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAction {
    /// Set `to` from `from`, then unset `from`
    Rename {
        /// Old field
        from: String,
        /// New field
        to: String,
    },
    /// Set `to` from `from`, keeping `from`
    Copy {
        /// Source field
        from: String,
        /// Destination field
        to: String,
    },
    /// Rename a field inside every element of a list of documents
    RenameEach {
        /// List field
        list: String,
        /// Old element field
        from: String,
        /// New element field
        to: String,
    },
    /// Unset a field
    Unset(String),
    /// Set a field to a constant
    Set(String, Value),
}

impl FieldAction {
    fn apply(&self, doc: &Document, update: &mut Update) -> Result<(), fleetmig_store::FieldError> {
        match self {
            FieldAction::Rename { from, to } => {
                update.set.insert(to.as_str(), doc.require(from)?.clone());
                update.unset.push(from.clone());
            }
            FieldAction::Copy { from, to } => {
                update.set.insert(to.as_str(), doc.require(from)?.clone());
            }
            FieldAction::RenameEach { list, from, to } => {
                for (index, element) in doc.get_list(list)?.iter().enumerate() {
                    let value = match element {
                        Value::Document(element) => element.require(from)?.clone(),
                        other => {
                            return Err(fleetmig_store::FieldError::WrongKind {
                                field: format!("{list}.{index}"),
                                expected: fleetmig_store::ValueKind::Document,
                                found: other.kind(),
                            })
                        }
                    };
                    update.set.insert(format!("{list}.{index}.{to}"), value);
                    update.unset.push(format!("{list}.{index}.{from}"));
                }
            }
            FieldAction::Unset(field) => update.unset.push(field.clone()),
            FieldAction::Set(field, value) => {
                update.set.insert(field.as_str(), value.clone());
            }
        }
        Ok(())
    }
}

/// Applies a rewrite table to every document of its collections
#[derive(Debug, Clone)]
pub struct FieldRewriteStep {
    name: String,
    description: String,
    collections: Vec<String>,
    actions: Vec<FieldAction>,
}

impl FieldRewriteStep {
    /// Step over one collection
    #[must_use]
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        Self {
            name: name.into(),
            description: format!("Updating {collection}"),
            collections: vec![collection],
            actions: Vec::new(),
        }
    }

    /// Override the progress line
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Apply the same table to another collection, in the same transaction
    #[must_use]
    pub fn and_collection(mut self, collection: impl Into<String>) -> Self {
        self.collections.push(collection.into());
        self
    }

    /// Rename `from` to `to`
    #[must_use]
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.actions.push(FieldAction::Rename {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Copy `from` into `to`
    #[must_use]
    pub fn copy(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.actions.push(FieldAction::Copy {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Rename `from` to `to` inside each element of `list`
    #[must_use]
    pub fn rename_each(
        mut self,
        list: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.actions.push(FieldAction::RenameEach {
            list: list.into(),
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Unset `field`
    #[must_use]
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.actions.push(FieldAction::Unset(field.into()));
        self
    }

    /// Set `field` to `value`
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.actions.push(FieldAction::Set(field.into(), value.into()));
        self
    }

    /// The update this table produces for `doc`
    ///
    /// # Errors
    /// Fails if a source field is missing or of the wrong kind.
    pub fn update_for(&self, collection: &str, doc: &Document) -> Result<Operation, StepError> {
        let id = doc.id().in_doc(collection, "?")?;
        let mut update = Update::new();
        for action in &self.actions {
            action.apply(doc, &mut update).in_doc(collection, id)?;
        }
        Ok(Operation::update(collection, id, update))
    }
}

#[async_trait]
impl Step for FieldRewriteStep {
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
        for collection in &self.collections {
            let mut scan = Scan::open(store, collection).await?;
            while let Some(doc) = scan.next().await? {
                tx.push(self.update_for(collection, &doc)?);
            }
        }
        Ok(StepPlan::transaction(tx))
    }
}
