use super::collections as c;
use crate::cloud::cloud_variant;
use crate::error::{FieldResultExt, StepError};
use crate::step::{fetch, MigrationState, Scan, Step, StepPlan};
use async_trait::async_trait;
use chrono::{SecondsFormat, TimeZone, Utc};
use fleetmig_store::{Document, DocumentStore, Operation, Transaction, Update};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// The administrative user every permission is granted to
pub const ADMIN_USER: &str = "admin@local";

const FULL_WIDTH_DOT: char = '\u{ff0e}';
const FULL_WIDTH_DOLLAR: char = '\u{ff04}';

/// Model settings removed from every model regardless of cloud
const REMOVED_MODEL_SETTINGS: [&str; 13] = [
    "admin-secret",
    "api-port",
    "bootstrap-addresses-delay",
    "bootstrap-retry-delay",
    "bootstrap-timeout",
    "ca-cert",
    "ca-private-key",
    "controller-uuid",
    "lxc-clone-aufs",
    "prefer-ipv6",
    "set-numa-control-policy",
    "state-port",
    "tools-metadata-url",
];

/// Escape a settings key for storage: `.` and `$` become full-width forms
#[must_use]
pub fn escape_key(key: &str) -> String {
    key.chars()
        .map(|ch| match ch {
            '.' => FULL_WIDTH_DOT,
            '$' => FULL_WIDTH_DOLLAR,
            other => other,
        })
        .collect()
}

fn escaped(settings: &Document) -> Document {
    settings
        .iter()
        .map(|(key, value)| (escape_key(key), value.clone()))
        .collect()
}

/// Adds the cloud, credential, controller settings and admin access
#[derive(Debug, Clone)]
pub struct UpdateControllerStep {
    cert_dir: PathBuf,
}

impl UpdateControllerStep {
    /// Step writing credential files under `cert_dir`
    #[must_use]
    pub fn new(cert_dir: PathBuf) -> Self {
        Self { cert_dir }
    }
}

#[async_trait]
impl Step for UpdateControllerStep {
    fn name(&self) -> &str {
        "update-controller"
    }

    fn description(&self) -> &str {
        "Adding controller settings"
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let serving = fetch(store, c::CONTROLLERS, "stateServingInfo").await?;
        let controller = fetch(store, c::CONTROLLERS, "e").await?;
        let model_uuid = controller
            .get_str("model-uuid")
            .in_doc(c::CONTROLLERS, "e")?
            .to_string();
        debug!(%model_uuid, "controller model");

        let model = fetch(store, c::MODELS, &model_uuid).await?;
        let owner = model.get_str("owner").in_doc(c::MODELS, &model_uuid)?.to_string();

        let settings_id = format!("{model_uuid}:e");
        let settings_doc = fetch(store, c::SETTINGS, &settings_id).await?;
        let settings = settings_doc.get_doc("settings").in_doc(c::SETTINGS, &settings_id)?;
        let cloud = settings.get_str("type").in_doc(c::SETTINGS, &settings_id)?.to_string();
        let variant = cloud_variant(&cloud)?;
        variant
            .check_settings(settings)
            .in_doc(c::SETTINGS, &settings_id)?;

        let controller_settings = Document::new()
            .with(
                "api-port",
                serving.require("apiport").in_doc(c::CONTROLLERS, "stateServingInfo")?.clone(),
            )
            .with("auditing-enabled", false)
            .with(
                "ca-cert",
                settings.get_str("ca-cert").in_doc(c::SETTINGS, &settings_id)?,
            )
            .with("controller-uuid", state.controller_uuid.as_str())
            .with("set-numa-control-policy", false)
            .with(
                "state-port",
                serving.require("stateport").in_doc(c::CONTROLLERS, "stateServingInfo")?.clone(),
            );

        let credential_id = format!("{cloud}#{owner}#{cloud}");
        let mut credential = Document::new()
            .with("owner", owner.as_str())
            .with("cloud", cloud.as_str())
            .with("name", cloud.as_str())
            .with("auth-type", variant.auth_type());
        if let Some(attributes) = variant
            .credential_attributes(settings)
            .in_doc(c::SETTINGS, &settings_id)?
        {
            credential.insert("attributes", attributes);
        }

        let cloud_doc = variant.cloud_document(settings).in_doc(c::SETTINGS, &settings_id)?;
        let files = variant
            .credential_files(settings, &self.cert_dir)
            .in_doc(c::SETTINGS, &settings_id)?;

        let controller_uuid = state.controller_uuid.clone();
        let created = Utc
            .with_ymd_and_hms(2016, 11, 18, 12, 0, 0)
            .single()
            .ok_or_else(|| StepError::unexpected(c::CONTROLLER_USERS, ADMIN_USER, "invalid creation date"))?
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let tx = Transaction::from(vec![
            Operation::update(c::CONTROLLERS, "e", Update::new().set("cloud", cloud.as_str())),
            Operation::insert(c::CLOUDS, cloud.as_str(), cloud_doc),
            Operation::insert(c::CLOUD_CREDENTIALS, credential_id, credential),
            Operation::insert(
                c::CONTROLLERS,
                "controllerSettings",
                Document::new().with("settings", escaped(&controller_settings)),
            ),
            Operation::insert(
                c::PERMISSIONS,
                format!("c#{controller_uuid}#us#{ADMIN_USER}"),
                Document::new()
                    .with("access", "superuser")
                    .with("object-global-key", format!("c#{controller_uuid}"))
                    .with("subject-global-key", format!("us#{ADMIN_USER}")),
            ),
            Operation::insert(
                c::CONTROLLER_USERS,
                ADMIN_USER,
                Document::new()
                    .with("createdby", ADMIN_USER)
                    .with("datecreated", created)
                    .with("displayname", "admin")
                    .with("object-uuid", controller_uuid.as_str())
                    .with("user", ADMIN_USER),
            ),
        ]);

        info!(%cloud, %owner, "controller cloud");
        state.credential = Some(format!("{cloud}/{owner}/{cloud}"));
        state.controller_model_uuid = Some(model_uuid);
        state.cloud = Some(cloud);
        state.owner = Some(owner);

        Ok(StepPlan::transaction(tx).with_files(files))
    }
}

/// Points every model at the new cloud, credential and controller
#[derive(Debug, Clone)]
pub struct UpdateModelsStep {
    agent_version: String,
}

impl UpdateModelsStep {
    /// Step setting `agent-version` to `agent_version`
    #[must_use]
    pub fn new(agent_version: String) -> Self {
        Self { agent_version }
    }
}

#[async_trait]
impl Step for UpdateModelsStep {
    fn name(&self) -> &str {
        "update-models"
    }

    fn description(&self) -> &str {
        "Updating models"
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let cloud = state.cloud()?;
        let credential = state.credential()?;
        let variant = cloud_variant(cloud)?;

        let removed: BTreeSet<&str> = REMOVED_MODEL_SETTINGS
            .iter()
            .chain(variant.removed_model_settings())
            .copied()
            .collect();

        let mut tx = Transaction::new();
        let mut renamed_admin = false;
        let mut scan = Scan::open(store, c::MODELS).await?;
        while let Some(doc) = scan.next().await? {
            let uuid = doc.id().in_doc(c::MODELS, "?")?;
            let name = doc.get_str("name").in_doc(c::MODELS, uuid)?;

            let mut model = Update::new()
                .set("cloud", cloud)
                .set("cloud-credential", credential)
                .set("controller-uuid", state.controller_uuid.as_str());
            if name == "admin" {
                model = model.set("name", "controller");
                renamed_admin = true;
            }
            tx.push(Operation::update(c::MODELS, uuid, model.unset("server-uuid")));

            tx.push(Operation::insert(
                c::PERMISSIONS,
                format!("e#{uuid}#us#{ADMIN_USER}"),
                Document::new()
                    .with("access", "admin")
                    .with("object-global-key", format!("e#{uuid}"))
                    .with("subject-global-key", format!("us#{ADMIN_USER}")),
            ));

            let mut settings = Update::new()
                .set("settings.agent-version", self.agent_version.as_str())
                .set("settings.provisioner-harvest-mode", "destroyed")
                .set("settings.transmit-vendor-metrics", true);
            for name in &removed {
                settings = settings.unset(format!("settings.{name}"));
            }
            tx.push(Operation::update(c::SETTINGS, format!("{uuid}:e"), settings));
        }

        if renamed_admin {
            tx.push(Operation::remove(
                c::USER_MODEL_NAME,
                format!("{ADMIN_USER}:admin"),
            ));
            tx.push(Operation::insert(
                c::USER_MODEL_NAME,
                format!("{ADMIN_USER}:controller"),
                Document::new(),
            ));
        }
        Ok(StepPlan::transaction(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_dots_and_dollars() {
        assert_eq!(escape_key("api-port"), "api-port");
        assert_eq!(escape_key("a.b$c"), "a\u{ff0e}b\u{ff04}c");
    }

    #[test]
    fn removed_settings_are_sorted_and_merged() {
        let variant = cloud_variant("maas").unwrap();
        let removed: BTreeSet<&str> = REMOVED_MODEL_SETTINGS
            .iter()
            .chain(variant.removed_model_settings())
            .copied()
            .collect();
        let removed: Vec<_> = removed.into_iter().collect();
        assert_eq!(removed.len(), 16);
        assert_eq!(removed[0], "admin-secret");
        assert!(removed.windows(2).all(|w| w[0] < w[1]));
    }
}
