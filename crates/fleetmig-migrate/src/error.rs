//! Error types for the migration engine
//!
//! Any error reaching the engine halts the run. Errors carry the step and
//! collection they came from so the operator can see where it stopped.

use fleetmig_context::AuditError;
use fleetmig_store::{FieldError, StoreError};
use std::path::PathBuf;

/// Errors from the transaction runner
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The store rejected the transaction
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The audit sink failed
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// A local file could not be written
    #[error("writing {path}: {source}")]
    File {
        /// Target path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// Whether the store reported a failed precondition
    #[inline]
    #[must_use]
    pub fn is_precondition_failure(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_precondition_failure())
    }
}

/// Errors while planning a step
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Reading a collection failed
    #[error("failed to read {collection}: {source}")]
    Read {
        /// Collection being read
        collection: String,
        /// Store error
        #[source]
        source: StoreError,
    },

    /// A document did not have the expected shape
    #[error("{collection}/{id}: {source}")]
    Field {
        /// Collection of the document
        collection: String,
        /// Document id
        id: String,
        /// Field error
        #[source]
        source: FieldError,
    },

    /// The controller's cloud type has no variant
    #[error("unsupported cloud type {0:?}")]
    UnsupportedCloud(String),

    /// A value an earlier step should have produced is missing
    #[error("missing {0}; has the controller step run?")]
    MissingState(&'static str),

    /// Document content is not in a state the step can migrate
    #[error("{collection}/{id}: {reason}")]
    Unexpected {
        /// Collection of the document
        collection: String,
        /// Document id
        id: String,
        /// What is wrong
        reason: String,
    },

    /// A built-in match pattern failed to compile
    #[error("invalid pattern: {0}")]
    Pattern(#[source] regex::Error),

    /// A local input file could not be read
    #[error("reading {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl StepError {
    /// Create an unexpected-content error
    #[inline]
    pub fn unexpected(
        collection: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Unexpected {
            collection: collection.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Attach document coordinates to field errors
pub trait FieldResultExt<T> {
    /// Convert a field error into a [`StepError::Field`]
    ///
    /// # Errors
    /// Returns the converted error.
    fn in_doc(self, collection: &str, id: &str) -> Result<T, StepError>;
}

impl<T> FieldResultExt<T> for Result<T, FieldError> {
    fn in_doc(self, collection: &str, id: &str) -> Result<T, StepError> {
        self.map_err(|source| StepError::Field {
            collection: collection.to_string(),
            id: id.to_string(),
            source,
        })
    }
}

/// Errors that halt a migration run
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A collection that must be empty has documents
    #[error("{collection:?} has {count} documents, shouldn't have data")]
    PrecheckFailed {
        /// Collection name
        collection: String,
        /// Documents found
        count: usize,
    },

    /// Precheck could not count a collection
    #[error("getting row count for {collection:?}: {source}")]
    PrecheckRead {
        /// Collection name
        collection: String,
        /// Store error
        #[source]
        source: StoreError,
    },

    /// Resuming pending transactions failed
    #[error("resuming pending transactions: {0}")]
    Resume(#[source] RunnerError),

    /// A step could not compute its transaction
    #[error("step {step}: {source}")]
    Step {
        /// Step name
        step: String,
        /// Cause
        #[source]
        source: StepError,
    },

    /// A step's transaction or side effects failed to apply
    #[error("step {step}: {source}")]
    Apply {
        /// Step name
        step: String,
        /// Cause
        #[source]
        source: RunnerError,
    },
}

impl MigrationError {
    /// Name of the step that failed, if the failure belongs to one
    #[must_use]
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::Step { step, .. } | Self::Apply { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Whether a store precondition failed
    #[must_use]
    pub fn is_precondition_failure(&self) -> bool {
        match self {
            Self::Apply { source, .. } | Self::Resume(source) => source.is_precondition_failure(),
            _ => false,
        }
    }
}
