//! Models and machines read from the controller store
//!
//! Machines are flattened to [`RemoteTarget`]s labelled with their model UUID
//! and machine id, which is how the reporter names them.

use fleetmig_dispatch::RemoteTarget;
use fleetmig_store::{Document, DocumentStore, FieldError, Query, StoreError};
use futures::TryStreamExt;
use tracing::{debug, warn};

const MODELS: &str = "models";
const MACHINES: &str = "machines";
const CONTROLLERS: &str = "controllers";

/// Inventory errors
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// The store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A document lacks a field the inventory needs
    #[error("{collection} {id:?}: {source}")]
    Field {
        /// Collection
        collection: &'static str,
        /// Document id
        id: String,
        /// Cause
        #[source]
        source: FieldError,
    },

    /// The controller model has no machine 0
    #[error("couldn't find controller machine")]
    NoControllerMachine,

    /// No model carries a controller UUID yet
    #[error("missing controller UUID, has upgrade-db been run?")]
    MissingControllerUuid,
}

fn field<T>(
    result: Result<T, FieldError>,
    collection: &'static str,
    doc: &Document,
) -> Result<T, InventoryError> {
    result.map_err(|source| InventoryError::Field {
        collection,
        id: doc.id().unwrap_or("?").to_string(),
        source,
    })
}

/// A machine and how to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetMachine {
    /// Owning model
    pub model_uuid: String,
    /// Machine id within the model
    pub machine_id: String,
    /// Preferred public address
    pub address: String,
}

impl FleetMachine {
    /// Dispatch target labelled `<model uuid> <machine id>`
    #[must_use]
    pub fn target(&self) -> RemoteTarget {
        RemoteTarget::new(self.address.as_str())
            .with_label(self.model_uuid.as_str())
            .with_label(self.machine_id.as_str())
    }
}

/// A model with its machines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetModel {
    /// Model name
    pub name: String,
    /// Model UUID
    pub uuid: String,
    /// Whether this is the controller model
    pub controller: bool,
    /// Machines in id order
    pub machines: Vec<FleetMachine>,
}

/// Every model and machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Models in id order
    pub models: Vec<FleetModel>,
}

async fn all_documents(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<Document>, StoreError> {
    store.find_all(collection, &Query::all()).await?.try_collect().await
}

/// UUID of the model hosting the controller
///
/// # Errors
/// Store failures, or `controllers/e` without a `model-uuid`.
pub async fn controller_model_uuid(store: &dyn DocumentStore) -> Result<String, InventoryError> {
    let controller = store.find_by_id(CONTROLLERS, "e").await?;
    Ok(field(controller.get_str("model-uuid"), CONTROLLERS, &controller)?.to_string())
}

/// Controller UUID written into the models by `upgrade-db`
///
/// # Errors
/// `InventoryError::MissingControllerUuid` if the first model has none.
pub async fn controller_uuid(store: &dyn DocumentStore) -> Result<String, InventoryError> {
    let models = all_documents(store, MODELS).await?;
    let Some(first) = models.first() else {
        return Err(InventoryError::MissingControllerUuid);
    };
    match field(first.opt_str("controller-uuid"), MODELS, first)? {
        Some(uuid) if !uuid.is_empty() => Ok(uuid.to_string()),
        _ => Err(InventoryError::MissingControllerUuid),
    }
}

impl Inventory {
    /// Read models and machines
    ///
    /// # Errors
    /// Store failures, or documents missing a name or id. A machine without
    /// a public address is kept with an empty one.
    pub async fn load(store: &dyn DocumentStore) -> Result<Self, InventoryError> {
        let controller_model = controller_model_uuid(store).await?;
        let machine_docs = all_documents(store, MACHINES).await?;

        let mut models = Vec::new();
        for doc in all_documents(store, MODELS).await? {
            let uuid = field(doc.id(), MODELS, &doc)?.to_string();
            let name = field(doc.get_str("name"), MODELS, &doc)?.to_string();

            let mut machines = Vec::new();
            for machine in &machine_docs {
                if field(machine.get_str("model-uuid"), MACHINES, machine)? != uuid {
                    continue;
                }
                let machine_id = field(machine.get_str("machineid"), MACHINES, machine)?;
                let address = field(
                    machine.opt_str("preferredpublicaddress.value"),
                    MACHINES,
                    machine,
                )?
                .unwrap_or_default();
                if address.is_empty() {
                    warn!(model = %uuid, machine = machine_id, "machine has no public address");
                }
                machines.push(FleetMachine {
                    model_uuid: uuid.clone(),
                    machine_id: machine_id.to_string(),
                    address: address.to_string(),
                });
            }
            debug!(model = %name, machines = machines.len(), "inventory");

            models.push(FleetModel {
                controller: uuid == controller_model,
                name,
                uuid,
                machines,
            });
        }
        Ok(Self { models })
    }

    /// Every machine of every model
    #[must_use]
    pub fn all_machines(&self) -> Vec<FleetMachine> {
        self.models
            .iter()
            .flat_map(|m| m.machines.iter().cloned())
            .collect()
    }

    /// Every machine except the controller's machine 0
    #[must_use]
    pub fn other_machines(&self) -> Vec<FleetMachine> {
        self.models
            .iter()
            .flat_map(|model| {
                model
                    .machines
                    .iter()
                    .filter(move |m| !(model.controller && m.machine_id == "0"))
                    .cloned()
            })
            .collect()
    }

    /// Machine 0 of the controller model
    ///
    /// # Errors
    /// `InventoryError::NoControllerMachine` if it is absent.
    pub fn server_machine(&self) -> Result<FleetMachine, InventoryError> {
        self.models
            .iter()
            .filter(|m| m.controller)
            .flat_map(|m| m.machines.iter())
            .find(|m| m.machine_id == "0")
            .cloned()
            .ok_or(InventoryError::NoControllerMachine)
    }
}

/// Dispatch targets for `machines`
#[must_use]
pub fn targets(machines: &[FleetMachine]) -> Vec<RemoteTarget> {
    machines.iter().map(FleetMachine::target).collect()
}
