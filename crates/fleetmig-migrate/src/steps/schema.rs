use super::collections as c;
use crate::error::{FieldResultExt, StepError};
use crate::rekey::{relocate, split_doc_id, strip_bookkeeping};
use crate::step::{MigrationState, Scan, Step, StepPlan};
use async_trait::async_trait;
use fleetmig_store::{Document, DocumentStore, Operation, Transaction, Update, Value};
use tracing::debug;

/// Container type no longer supported on machines
const RETIRED_CONTAINER: &str = "lxc";

/// Drops `lxc` from each machine's supported containers
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineContainersStep;

#[async_trait]
impl Step for MachineContainersStep {
    fn name(&self) -> &str {
        "machines"
    }

    fn description(&self) -> &str {
        "Updating machines"
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let mut tx = Transaction::new();
        let mut scan = Scan::open(store, c::MACHINES).await?;
        while let Some(doc) = scan.next().await? {
            let id = doc.id().in_doc(c::MACHINES, "?")?;
            if !doc.contains("supportedcontainers") {
                continue;
            }
            let containers: Vec<Value> = doc
                .get_list("supportedcontainers")
                .in_doc(c::MACHINES, id)?
                .iter()
                .filter(|value| value.as_str() != Some(RETIRED_CONTAINER))
                .cloned()
                .collect();
            tx.push(Operation::update(
                c::MACHINES,
                id,
                Update::new().set("supportedcontainers", containers),
            ));
        }
        Ok(StepPlan::transaction(tx))
    }
}

/// Moves image metadata from model-scoped ids to global ones
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudImageMetadataStep;

#[async_trait]
impl Step for CloudImageMetadataStep {
    fn name(&self) -> &str {
        "cloud-image-metadata"
    }

    fn description(&self) -> &str {
        "Updating cloudimagemetadata"
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let mut tx = Transaction::new();
        let mut scan = Scan::open(store, c::CLOUD_IMAGE_METADATA).await?;
        while let Some(doc) = scan.next().await? {
            let old_id = doc.id().in_doc(c::CLOUD_IMAGE_METADATA, "?")?;
            let Some((_, local)) = split_doc_id(old_id) else {
                debug!(id = old_id, "skipping unscoped image metadata");
                continue;
            };
            let mut body = strip_bookkeeping(&doc);
            body.remove("model-uuid");
            tx.extend(relocate(
                c::CLOUD_IMAGE_METADATA,
                old_id,
                c::CLOUD_IMAGE_METADATA,
                local,
                body,
            ));
        }
        Ok(StepPlan::transaction(tx))
    }
}

/// Strips the model prefix from provider ids and registers them
///
/// Each rewritten provider id gets a `<model>:<kind>:<id>` entry in
/// `providerIDs`, which the new schema uses to keep them unique per model.
#[derive(Debug, Clone)]
pub struct ProviderIdsStep {
    name: String,
    description: String,
    collection: String,
    kind: String,
}

impl ProviderIdsStep {
    /// Rewrite `collection`, registering ids under `kind`
    #[must_use]
    pub fn new(collection: &str, kind: &str) -> Self {
        Self {
            name: format!("provider-ids-{collection}"),
            description: format!("Updating {collection}"),
            collection: collection.to_string(),
            kind: kind.to_string(),
        }
    }

    fn operations(&self, doc: &Document) -> Result<Option<[Operation; 2]>, StepError> {
        let id = doc.id().in_doc(&self.collection, "?")?;
        let model_uuid = doc.get_str("model-uuid").in_doc(&self.collection, id)?;
        let Some(provider_id) = doc.opt_str("providerid").in_doc(&self.collection, id)? else {
            return Ok(None);
        };
        let Some(stripped) = provider_id
            .strip_prefix(model_uuid)
            .and_then(|rest| rest.strip_prefix(':'))
        else {
            return Ok(None);
        };

        Ok(Some([
            Operation::update(
                self.collection.as_str(),
                id,
                Update::new().set("providerid", stripped),
            ),
            Operation::insert(
                c::PROVIDER_IDS,
                format!("{model_uuid}:{}:{stripped}", self.kind),
                Document::new().with("model-uuid", model_uuid),
            ),
        ]))
    }
}

#[async_trait]
impl Step for ProviderIdsStep {
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
            if let Some(ops) = self.operations(&doc)? {
                tx.extend(ops);
            }
        }
        Ok(StepPlan::transaction(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmig_store::{Change, MemoryStore};
    use pretty_assertions::assert_eq;

    fn state() -> MigrationState {
        MigrationState::with_controller_uuid("c")
    }

    #[tokio::test]
    async fn lxc_is_filtered_from_containers() {
        let store = MemoryStore::new();
        store
            .insert_raw(
                c::MACHINES,
                Document::with_id("m:0").with(
                    "supportedcontainers",
                    vec![Value::from("lxc"), Value::from("lxd"), Value::from("kvm")],
                ),
            )
            .unwrap();
        store.insert_raw(c::MACHINES, Document::with_id("m:1")).unwrap();

        let plan = MachineContainersStep.plan(&store, &mut state()).await.unwrap();
        let ops = plan.transaction.operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0].change,
            Change::Update(Update::new().set(
                "supportedcontainers",
                vec![Value::from("lxd"), Value::from("kvm")]
            ))
        );
    }

    #[tokio::test]
    async fn image_metadata_moves_to_local_id() {
        let store = MemoryStore::new();
        store
            .insert_raw(
                c::CLOUD_IMAGE_METADATA,
                Document::with_id("m:xenial-amd64")
                    .with("model-uuid", "m")
                    .with("image_id", "ami-1"),
            )
            .unwrap();
        store
            .insert_raw(c::CLOUD_IMAGE_METADATA, Document::with_id("trusty-amd64"))
            .unwrap();

        let plan = CloudImageMetadataStep.plan(&store, &mut state()).await.unwrap();
        let ops = plan.transaction.operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].id, "xenial-amd64");
        assert_eq!(
            ops[1].change,
            Change::Insert(Document::new().with("image_id", "ami-1"))
        );
    }

    #[test]
    fn provider_ids_are_unprefixed_and_registered() {
        let step = ProviderIdsStep::new(c::SUBNETS, "subnet");
        let doc = Document::with_id("m:10.0.0.0/24")
            .with("model-uuid", "m")
            .with("providerid", "m:subnet-1");

        let [update, insert] = step.operations(&doc).unwrap().unwrap();
        assert_eq!(
            update.change,
            Change::Update(Update::new().set("providerid", "subnet-1"))
        );
        assert_eq!(insert.collection, c::PROVIDER_IDS);
        assert_eq!(insert.id, "m:subnet:subnet-1");
        assert_eq!(step.name(), "provider-ids-subnets");
    }

    #[test]
    fn provider_ids_without_model_prefix_are_left_alone() {
        let step = ProviderIdsStep::new(c::SPACES, "space");
        for doc in [
            Document::with_id("m:1").with("model-uuid", "m"),
            Document::with_id("m:2").with("model-uuid", "m").with("providerid", "space-1"),
            Document::with_id("m:3").with("model-uuid", "m").with("providerid", "mx:space-1"),
        ] {
            assert!(step.operations(&doc).unwrap().is_none());
        }
    }
}
