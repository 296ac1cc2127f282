//! fleetmig migrate - transactional, previewable schema migration
//!
//! Provides:
//! - [`TransactionRunner`]: applies or previews transactions and audits them
//! - [`MigrationEngine`]: ordered steps behind a precheck, halting on the first error
//! - Reusable step shapes: [`RekeyStep`] for composite-key moves and
//!   [`FieldRewriteStep`] for field renames
//! - The concrete upgrade table in [`steps`]
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetmig_context::Context;
//! use fleetmig_migrate::{steps, MigrationEngine, MigrationState, TransactionRunner};
//! use std::sync::Arc;
//!
//! # async fn example(store: Arc<dyn fleetmig_store::DocumentStore>) -> Result<(), fleetmig_migrate::MigrationError> {
//! let runner = TransactionRunner::new(store, Context::preview());
//! let engine = MigrationEngine::new(runner)
//!     .with_precheck(steps::upgrade_precheck())
//!     .with_steps(steps::upgrade_steps(&steps::UpgradeOptions::default()));
//!
//! let summary = engine.run(&mut MigrationState::generate()).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod cloud;
pub mod engine;
pub mod error;
pub mod rekey;
pub mod rename;
pub mod runner;
pub mod step;
pub mod steps;

pub use cloud::{cloud_variant, CloudVariant, LxdCloud, MaasCloud};
pub use engine::{MigrationEngine, MigrationSummary, Precheck, StepReport};
pub use error::{FieldResultExt, MigrationError, RunnerError, StepError};
pub use rekey::{local_id, relocate, split_doc_id, strip_bookkeeping, RekeyRule, RekeyStep};
pub use rename::{FieldAction, FieldRewriteStep};
pub use runner::{PlannedFile, TransactionRunner};
pub use step::{fetch, MigrationState, Scan, Step, StepPlan};
pub use steps::UpgradeOptions;
