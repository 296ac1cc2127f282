//! The 2.0-beta7 to 2.0 upgrade step table
//!
//! Order matters: later steps read the shapes earlier steps produce, and the
//! controller step records the cloud and credential every model needs.

mod applications;
mod cleanup;
mod controller;
mod schema;
mod tools;

pub use applications::{
    DropLegacyCollectionsStep, LeasesStep, SequencesStep, ServicesToApplicationsStep,
    StatusHistoryStep,
};
pub use cleanup::CleanupsStep;
pub use controller::{escape_key, UpdateControllerStep, UpdateModelsStep, ADMIN_USER};
pub use schema::{CloudImageMetadataStep, MachineContainersStep, ProviderIdsStep};
pub use tools::{hash_tools, ToolsMetadataStep};

use crate::engine::Precheck;
use crate::rekey::{RekeyRule, RekeyStep};
use crate::rename::FieldRewriteStep;
use crate::step::Step;
use std::path::PathBuf;

/// Collection names
pub mod collections {
    #![allow(missing_docs)]

    pub const ANNOTATIONS: &str = "annotations";
    pub const APPLICATIONS: &str = "applications";
    pub const ASSIGN_UNITS: &str = "assignUnits";
    pub const CLEANUPS: &str = "cleanups";
    pub const CLOUDS: &str = "clouds";
    pub const CLOUD_CREDENTIALS: &str = "cloudCredentials";
    pub const CLOUD_IMAGE_METADATA: &str = "cloudimagemetadata";
    pub const CONSTRAINTS: &str = "constraints";
    pub const CONTROLLERS: &str = "controllers";
    pub const CONTROLLER_USERS: &str = "controllerusers";
    pub const ENDPOINT_BINDINGS: &str = "endpointbindings";
    pub const IP_ADDRESSES: &str = "ip.addresses";
    pub const LEASES: &str = "leases";
    pub const LEGACY_IP_ADDRESSES: &str = "ipaddresses";
    pub const LINK_LAYER_DEVICES: &str = "linklayerdevices";
    pub const MACHINES: &str = "machines";
    pub const MIGRATIONS: &str = "migrations";
    pub const MODELS: &str = "models";
    pub const MODEL_ENTITY_REFS: &str = "modelEntityRefs";
    pub const MODEL_USERS: &str = "modelusers";
    pub const PERMISSIONS: &str = "permissions";
    pub const PROVIDER_IDS: &str = "providerIDs";
    pub const REFCOUNTS: &str = "refcounts";
    pub const RELATIONS: &str = "relations";
    pub const RESOURCES: &str = "resources";
    pub const SEQUENCE: &str = "sequence";
    pub const SERVICES: &str = "services";
    pub const SETTINGS: &str = "settings";
    pub const SETTINGS_REFS: &str = "settingsrefs";
    pub const SPACES: &str = "spaces";
    pub const STATUSES: &str = "statuses";
    pub const STATUSES_HISTORY: &str = "statuseshistory";
    pub const STORAGE_CONSTRAINTS: &str = "storageconstraints";
    pub const STORAGE_INSTANCES: &str = "storageinstances";
    pub const SUBNETS: &str = "subnets";
    pub const TOOLS_METADATA: &str = "toolsmetadata";
    pub const UNITS: &str = "units";
    pub const USER_MODEL_NAME: &str = "usermodelname";
    pub const USERS: &str = "users";
}

use collections as c;

/// Inputs of the upgrade that do not come from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOptions {
    /// Agent version written into model settings
    pub agent_version: String,
    /// Tools version written onto machines and units
    pub tools_version: String,
    /// Tools tarball to register; no metadata step without it
    pub tools_file: Option<PathBuf>,
    /// Directory receiving cloud credential files
    pub cert_dir: PathBuf,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            agent_version: "2.0.0".into(),
            tools_version: "2.0.0-xenial-amd64".into(),
            tools_file: None,
            cert_dir: PathBuf::from("/etc/juju"),
        }
    }
}

impl UpgradeOptions {
    /// Register this tools tarball
    #[must_use]
    pub fn with_tools_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tools_file = Some(path.into());
        self
    }

    /// Write credential files under `dir`
    #[must_use]
    pub fn with_cert_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cert_dir = dir.into();
        self
    }
}

/// Collections that must be empty before upgrading
#[must_use]
pub fn upgrade_precheck() -> Precheck {
    Precheck::none()
        // no pending work
        .require_empty(c::ASSIGN_UNITS)
        .require_empty(c::CLEANUPS)
        .require_empty(c::MIGRATIONS)
        // legacy, never populated
        .require_empty(c::LEGACY_IP_ADDRESSES)
        // shape changed but is not migrated
        .require_empty(c::STORAGE_INSTANCES)
}

/// Every upgrade step, in run order
#[must_use]
pub fn upgrade_steps(options: &UpgradeOptions) -> Vec<Box<dyn Step>> {
    let legacy_key = || RekeyRule::new("s#", "a#").strip_field("env-uuid");

    let mut steps: Vec<Box<dyn Step>> = vec![
        Box::new(UpdateControllerStep::new(options.cert_dir.clone())),
        Box::new(UpdateModelsStep::new(options.agent_version.clone())),
        Box::new(ServicesToApplicationsStep),
        Box::new(
            FieldRewriteStep::new("units", c::UNITS)
                .rename("service", "application")
                .unset("ports")
                .unset("privateaddress")
                .unset("publicaddress"),
        ),
        Box::new(LeasesStep),
        Box::new(
            FieldRewriteStep::new("model-entity-refs", c::MODEL_ENTITY_REFS)
                .rename("services", "applications"),
        ),
        Box::new(
            FieldRewriteStep::new("relations", c::RELATIONS)
                .rename_each("endpoints", "servicename", "applicationname"),
        ),
        Box::new(
            FieldRewriteStep::new("resources", c::RESOURCES)
                .rename("service-id", "application-id")
                .unset("env-uuid"),
        ),
        Box::new(RekeyStep::new(
            c::ANNOTATIONS,
            legacy_key().with_key_field("globalkey"),
        )),
        Box::new(RekeyStep::new(c::CONSTRAINTS, legacy_key())),
        Box::new(RekeyStep::new(c::ENDPOINT_BINDINGS, legacy_key())),
        Box::new(RekeyStep::new(c::SETTINGS, legacy_key())),
        Box::new(RekeyStep::new(c::STATUSES, legacy_key())),
        Box::new(StatusHistoryStep),
        Box::new(SequencesStep),
        Box::new(DropLegacyCollectionsStep),
        Box::new(FieldRewriteStep::new("users", c::USERS).unset("deactivated")),
        Box::new(
            FieldRewriteStep::new("model-users", c::MODEL_USERS)
                .copy("model-uuid", "object-uuid")
                .unset("access"),
        ),
        Box::new(MachineContainersStep),
        Box::new(CloudImageMetadataStep),
        Box::new(ProviderIdsStep::new(c::SPACES, "space")),
        Box::new(ProviderIdsStep::new(c::SUBNETS, "subnet")),
        Box::new(ProviderIdsStep::new(c::LINK_LAYER_DEVICES, "linklayerdevice")),
        Box::new(ProviderIdsStep::new(c::IP_ADDRESSES, "address")),
        Box::new(
            FieldRewriteStep::new("agent-tools", c::MACHINES)
                .and_collection(c::UNITS)
                .describe("Updating tools field on units and machines")
                .set("tools.version", options.tools_version.as_str()),
        ),
    ];

    if let Some(tools_file) = &options.tools_file {
        steps.push(Box::new(ToolsMetadataStep::new(
            tools_file.clone(),
            options.tools_version.clone(),
        )));
    }
    steps
}

/// Steps of the `clean-db` action
#[must_use]
pub fn cleanup_steps() -> Vec<Box<dyn Step>> {
    vec![Box::new(CleanupsStep)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_runs_first_and_tools_metadata_last() {
        let names = |options: &UpgradeOptions| -> Vec<String> {
            upgrade_steps(options)
                .iter()
                .map(|s| s.name().to_string())
                .collect()
        };

        let without = names(&UpgradeOptions::default());
        assert_eq!(without.first().map(String::as_str), Some("update-controller"));
        assert_eq!(without.last().map(String::as_str), Some("agent-tools"));

        let with = names(&UpgradeOptions::default().with_tools_file("/tmp/juju.tgz"));
        assert_eq!(with.len(), without.len() + 1);
        assert_eq!(with.last().map(String::as_str), Some("tools-metadata"));
    }

    #[test]
    fn step_names_are_unique() {
        let steps = upgrade_steps(&UpgradeOptions::default());
        let mut names: Vec<_> = steps.iter().map(|s| s.name().to_string()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), steps.len());
    }
}
