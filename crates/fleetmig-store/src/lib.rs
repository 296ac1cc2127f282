//! fleetmig store - collection-oriented document store adapter
//!
//! Provides:
//! - Ordered documents with typed, explicitly failing field access
//! - Insert / update / remove operations with existence preconditions
//! - The [`DocumentStore`] trait consumed by the migration engine
//! - An in-memory store and a JSON snapshot file store
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetmig_store::{Document, DocumentStore, MemoryStore, Operation, Update};
//!
//! # async fn example() -> Result<(), fleetmig_store::StoreError> {
//! let store = MemoryStore::new();
//! store.insert_raw("units", Document::with_id("u1").with("service", "db"))?;
//!
//! let op = Operation::update(
//!     "units",
//!     "u1",
//!     Update::new().set("application", "db").unset("service"),
//! );
//! store.apply_transaction(&[op]).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod document;
pub mod error;
pub mod file;
pub mod memory;
pub mod operation;
pub mod query;
pub mod store;

pub use document::{Document, FieldError, Value, ValueKind, ID_FIELD};
pub use error::StoreError;
pub use file::FileStore;
pub use memory::{Collection, MemoryStore, Snapshot};
pub use operation::{Change, Operation, OperationKind, Precondition, Transaction, Update};
pub use query::Query;
pub use store::{DocumentCursor, DocumentStore};
