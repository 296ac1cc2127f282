//! Migration steps and the state they share
//!
//! A step reads whatever it needs from the store and returns a
//! [`StepPlan`]: one transaction covering every document it touches, plus
//! any collection drops and local files. Planning never mutates anything,
//! so the same plan is computed in preview and live runs.

use crate::error::StepError;
use crate::runner::PlannedFile;
use async_trait::async_trait;
use fleetmig_store::{Document, DocumentCursor, DocumentStore, Operation, Query, Transaction};
use futures::StreamExt;

/// One named, ordered unit of migration
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable step name, used in errors and summaries
    fn name(&self) -> &str;

    /// Progress line printed before the step runs
    fn description(&self) -> &str;

    /// Compute the step's mutations
    async fn plan(
        &self,
        store: &dyn DocumentStore,
        state: &mut MigrationState,
    ) -> Result<StepPlan, StepError>;
}

/// Everything one step wants changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPlan {
    /// Document mutations, applied as one transaction
    pub transaction: Transaction,
    /// Collections to drop after the transaction
    pub dropped_collections: Vec<String>,
    /// Local files to write before the transaction
    pub files: Vec<PlannedFile>,
}

impl StepPlan {
    /// Plan with just a transaction
    #[inline]
    #[must_use]
    pub fn transaction(transaction: Transaction) -> Self {
        Self {
            transaction,
            ..Self::default()
        }
    }

    /// Add a collection drop
    #[inline]
    #[must_use]
    pub fn drop_collection(mut self, collection: impl Into<String>) -> Self {
        self.dropped_collections.push(collection.into());
        self
    }

    /// Add local files
    #[inline]
    #[must_use]
    pub fn with_files(mut self, files: Vec<PlannedFile>) -> Self {
        self.files.extend(files);
        self
    }

    /// Number of document operations
    #[inline]
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.transaction.len()
    }
}

impl From<Vec<Operation>> for StepPlan {
    fn from(ops: Vec<Operation>) -> Self {
        Self::transaction(Transaction::from(ops))
    }
}

/// Values discovered or generated by earlier steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationState {
    /// Controller UUID being introduced
    pub controller_uuid: String,
    /// UUID of the controller model
    pub controller_model_uuid: Option<String>,
    /// Cloud type tag of the controller
    pub cloud: Option<String>,
    /// Owner of the controller model
    pub owner: Option<String>,
    /// Credential reference `cloud/owner/name`
    pub credential: Option<String>,
}

impl MigrationState {
    /// State for a new run with a freshly generated controller UUID
    #[must_use]
    pub fn generate() -> Self {
        Self::with_controller_uuid(uuid::Uuid::new_v4().to_string())
    }

    /// State with a known controller UUID
    #[must_use]
    pub fn with_controller_uuid(controller_uuid: impl Into<String>) -> Self {
        Self {
            controller_uuid: controller_uuid.into(),
            controller_model_uuid: None,
            cloud: None,
            owner: None,
            credential: None,
        }
    }

    /// Cloud tag set by the controller step
    ///
    /// # Errors
    /// `StepError::MissingState` if not yet set.
    pub fn cloud(&self) -> Result<&str, StepError> {
        self.cloud.as_deref().ok_or(StepError::MissingState("cloud"))
    }

    /// Credential reference set by the controller step
    ///
    /// # Errors
    /// `StepError::MissingState` if not yet set.
    pub fn credential(&self) -> Result<&str, StepError> {
        self.credential
            .as_deref()
            .ok_or(StepError::MissingState("cloud credential"))
    }
}

/// Read one document, tagging errors with its collection
///
/// # Errors
/// `StepError::Read`, including when the document does not exist.
pub async fn fetch(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Document, StepError> {
    store
        .find_by_id(collection, id)
        .await
        .map_err(|source| StepError::Read {
            collection: collection.to_string(),
            source,
        })
}

/// Forward cursor over one collection with errors tagged by collection
pub struct Scan {
    collection: String,
    cursor: DocumentCursor,
}

impl Scan {
    /// Start reading every document of `collection`
    ///
    /// # Errors
    /// `StepError::Read` if the store cannot open the cursor.
    pub async fn open(store: &dyn DocumentStore, collection: &str) -> Result<Self, StepError> {
        let cursor = store
            .find_all(collection, &Query::all())
            .await
            .map_err(|source| StepError::Read {
                collection: collection.to_string(),
                source,
            })?;
        Ok(Self {
            collection: collection.to_string(),
            cursor,
        })
    }

    /// Next document, or `None` at the end
    ///
    /// # Errors
    /// `StepError::Read` if iteration fails.
    pub async fn next(&mut self) -> Result<Option<Document>, StepError> {
        match self.cursor.next().await {
            None => Ok(None),
            Some(Ok(doc)) => Ok(Some(doc)),
            Some(Err(source)) => Err(StepError::Read {
                collection: self.collection.clone(),
                source,
            }),
        }
    }

    /// Collection being scanned
    #[inline]
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl std::fmt::Debug for Scan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scan")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}
