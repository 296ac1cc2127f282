//! Error types for the document store
//!
//! Precondition failures are distinguished from every other failure so that
//! callers can tell "the data was not in the expected state" from "the store
//! could not be read or written".

use crate::operation::Precondition;
use std::path::PathBuf;

/// Document store error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A precondition did not hold; nothing in the transaction was applied
    #[error("precondition failed: {collection}/{id} expected {expected}")]
    PreconditionFailed {
        /// Collection of the offending operation
        collection: String,
        /// Id of the offending operation
        id: String,
        /// The precondition that did not hold
        expected: Precondition,
    },

    /// Document not found by id
    #[error("document {collection}/{id} not found")]
    NotFound {
        /// Collection searched
        collection: String,
        /// Id searched for
        id: String,
    },

    /// Reading a collection failed
    #[error("reading {collection}: {reason}")]
    Read {
        /// Collection being read
        collection: String,
        /// Underlying cause
        reason: String,
    },

    /// Operation cannot be applied to the stored document
    #[error("invalid operation on {collection}/{id}: {reason}")]
    InvalidOperation {
        /// Target collection
        collection: String,
        /// Target id
        id: String,
        /// What went wrong
        reason: String,
    },

    /// Store is not reachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot file I/O failed
    #[error("snapshot {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be encoded or decoded
    #[error("snapshot encoding: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether this is a precondition failure
    #[inline]
    #[must_use]
    pub fn is_precondition_failure(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }

    /// Whether this is a not-found lookup
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Create a read error for a collection
    #[inline]
    pub fn read(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Read {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    #[inline]
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
