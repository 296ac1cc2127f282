//! Migration step engine
//!
//! Runs a precheck, resumes pending transactions unless told not to, then
//! executes steps strictly in the order they were added. Each step's plan is applied
//! before the next step is planned, and the first error ends the run.

use crate::error::MigrationError;
use crate::runner::TransactionRunner;
use crate::step::{MigrationState, Step};
use fleetmig_context::RunMode;
use fleetmig_store::DocumentStore;
use std::fmt;
use tracing::info;

/// Collections that must be empty before migrating
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precheck {
    empty_collections: Vec<String>,
}

impl Precheck {
    /// Precheck with no requirements
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Require `collection` to be empty
    #[must_use]
    pub fn require_empty(mut self, collection: impl Into<String>) -> Self {
        self.empty_collections.push(collection.into());
        self
    }

    /// Check every requirement
    ///
    /// # Errors
    /// `MigrationError::PrecheckFailed` for the first non-empty collection.
    pub async fn verify(&self, store: &dyn DocumentStore) -> Result<(), MigrationError> {
        for collection in &self.empty_collections {
            let count = store
                .count(collection)
                .await
                .map_err(|source| MigrationError::PrecheckRead {
                    collection: collection.clone(),
                    source,
                })?;
            if count > 0 {
                return Err(MigrationError::PrecheckFailed {
                    collection: collection.clone(),
                    count,
                });
            }
        }
        Ok(())
    }
}

/// What one step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Step name
    pub name: String,
    /// Document operations applied or previewed
    pub operations: usize,
    /// Collections dropped
    pub dropped_collections: Vec<String>,
    /// Local files written
    pub files: usize,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Mode the run used
    pub mode: RunMode,
    /// One entry per step, in run order
    pub steps: Vec<StepReport>,
}

impl MigrationSummary {
    /// Operations across all steps
    #[must_use]
    pub fn total_operations(&self) -> usize {
        self.steps.iter().map(|s| s.operations).sum()
    }
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "  {}: {} operations", step.name, step.operations)?;
        }
        let total = self.total_operations();
        if self.mode.is_live() {
            write!(f, "{total} operations applied")
        } else {
            write!(f, "{total} operations would be applied")
        }
    }
}

/// Ordered list of steps bound to one runner
pub struct MigrationEngine {
    runner: TransactionRunner,
    precheck: Precheck,
    resume: bool,
    steps: Vec<Box<dyn Step>>,
}

impl MigrationEngine {
    /// Engine with no steps
    #[must_use]
    pub fn new(runner: TransactionRunner) -> Self {
        Self {
            runner,
            precheck: Precheck::none(),
            resume: true,
            steps: Vec::new(),
        }
    }

    /// Set the precheck
    #[must_use]
    pub fn with_precheck(mut self, precheck: Precheck) -> Self {
        self.precheck = precheck;
        self
    }

    /// Leave pending transactions alone instead of resuming them first
    #[must_use]
    pub fn without_resume(mut self) -> Self {
        self.resume = false;
        self
    }

    /// Append one step
    #[must_use]
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Append several steps
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<Box<dyn Step>>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Step names in run order
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name())
    }

    /// Run every step in order
    ///
    /// # Errors
    /// The first precheck, resume, planning or apply failure.
    pub async fn run(&self, state: &mut MigrationState) -> Result<MigrationSummary, MigrationError> {
        let mode = self.runner.mode();
        info!(%mode, steps = self.steps.len(), "starting migration");

        self.precheck.verify(self.runner.store()).await?;
        if self.resume {
            self.runner
                .resume_pending()
                .await
                .map_err(MigrationError::Resume)?;
        }

        let mut reports = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let name = step.name().to_string();
            info!(step = %name, "{}", step.description());

            let plan = step
                .plan(self.runner.store(), state)
                .await
                .map_err(|source| MigrationError::Step {
                    step: name.clone(),
                    source,
                })?;

            let apply_err = |source| MigrationError::Apply {
                step: name.clone(),
                source,
            };
            for file in &plan.files {
                self.runner.write_file(file).await.map_err(apply_err)?;
            }
            self.runner
                .apply(&plan.transaction)
                .await
                .map_err(apply_err)?;
            for collection in &plan.dropped_collections {
                self.runner
                    .drop_collection(collection)
                    .await
                    .map_err(apply_err)?;
            }

            reports.push(StepReport {
                name,
                operations: plan.operation_count(),
                dropped_collections: plan.dropped_collections,
                files: plan.files.len(),
            });
        }

        let summary = MigrationSummary {
            mode,
            steps: reports,
        };
        info!(
            %mode,
            operations = summary.total_operations(),
            "migration complete"
        );
        Ok(summary)
    }
}

impl fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("runner", &self.runner)
            .field("precheck", &self.precheck)
            .field("resume", &self.resume)
            .field("steps", &self.step_names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use crate::step::StepPlan;
    use async_trait::async_trait;
    use fleetmig_context::Context;
    use fleetmig_store::{Document, MemoryStore, Operation};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Step for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "recording"
        }

        async fn plan(
            &self,
            _store: &dyn DocumentStore,
            _state: &mut MigrationState,
        ) -> Result<StepPlan, StepError> {
            self.log.lock().push(self.name);
            if self.fail {
                return Err(StepError::MissingState("test"));
            }
            Ok(StepPlan::from(vec![Operation::insert(
                "log",
                self.name,
                Document::new(),
            )]))
        }
    }

    fn engine(store: Arc<MemoryStore>, fail_second: bool) -> (MigrationEngine, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = MigrationEngine::new(TransactionRunner::new(store, Context::live()))
            .with_step(Recording { name: "first", log: log.clone(), fail: false })
            .with_step(Recording { name: "second", log: log.clone(), fail: fail_second })
            .with_step(Recording { name: "third", log: log.clone(), fail: false });
        (engine, log)
    }

    #[tokio::test]
    async fn runs_steps_in_order() {
        let store = Arc::new(MemoryStore::new());
        let (engine, log) = engine(store.clone(), false);

        let summary = engine
            .run(&mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
        assert_eq!(summary.total_operations(), 3);
        assert_eq!(store.documents("log").len(), 3);
        assert!(summary.to_string().ends_with("3 operations applied"));
    }

    #[tokio::test]
    async fn first_error_halts_the_run() {
        let store = Arc::new(MemoryStore::new());
        let (engine, log) = engine(store.clone(), true);

        let err = engine
            .run(&mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap_err();

        assert_eq!(err.step_name(), Some("second"));
        assert_eq!(*log.lock(), vec!["first", "second"]);
        assert_eq!(store.documents("log").len(), 1);
    }

    #[tokio::test]
    async fn precheck_blocks_non_empty_collections() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw("cleanups", Document::with_id("c1")).unwrap();
        let (engine, log) = engine(store, false);
        let engine = engine.with_precheck(Precheck::none().require_empty("migrations").require_empty("cleanups"));

        let err = engine
            .run(&mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::PrecheckFailed { ref collection, count: 1 } if collection == "cleanups"
        ));
        assert!(log.lock().is_empty());
    }
}
