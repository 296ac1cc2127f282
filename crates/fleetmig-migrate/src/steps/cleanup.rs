use super::collections as c;
use crate::error::{FieldResultExt, StepError};
use crate::step::{MigrationState, Scan, Step, StepPlan};
use async_trait::async_trait;
use fleetmig_store::{DocumentStore, Operation, Precondition, Transaction};
use tracing::info;

/// Removes every pending cleanup document
///
/// Removals carry no precondition: a cleanup the controller finishes while
/// the step runs is simply already gone.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupsStep;

#[async_trait]
impl Step for CleanupsStep {
    fn name(&self) -> &str {
        "cleanups"
    }

    fn description(&self) -> &str {
        "Cleaning cleanups"
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let mut tx = Transaction::new();
        let mut scan = Scan::open(store, c::CLEANUPS).await?;
        while let Some(doc) = scan.next().await? {
            let id = doc.id().in_doc(c::CLEANUPS, "?")?;
            let kind = doc.opt_str("kind").in_doc(c::CLEANUPS, id)?.unwrap_or_default();
            let prefix = doc.opt_str("prefix").in_doc(c::CLEANUPS, id)?.unwrap_or_default();
            info!("Adding {kind}: {prefix:?}");
            tx.push(Operation::remove(c::CLEANUPS, id).with_precondition(Precondition::None));
        }
        Ok(StepPlan::transaction(tx))
    }
}
