use super::collections as c;
use crate::error::{FieldResultExt, StepError};
use crate::rekey::{relocate, split_doc_id, strip_bookkeeping};
use crate::step::{fetch, MigrationState, Scan, Step, StepPlan};
use async_trait::async_trait;
use fleetmig_store::{Document, DocumentStore, Operation, Transaction, Update};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

const SERVICE_LEADERSHIP: &str = "service-leadership";
const APPLICATION_LEADERSHIP: &str = "application-leadership";

/// Moves `services` documents into `applications`
///
/// Also rekeys each service's storage constraints to the
/// `asc#<app>#<charm>` form and creates the reference counts the new
/// schema keeps for charms, applications and storage constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServicesToApplicationsStep;

#[async_trait]
impl Step for ServicesToApplicationsStep {
    fn name(&self) -> &str {
        "services-to-applications"
    }

    fn description(&self) -> &str {
        "Moving documents from services collection to applications"
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let mut tx = Transaction::new();
        let mut refcounts: BTreeMap<String, i64> = BTreeMap::new();

        let mut scan = Scan::open(store, c::SERVICES).await?;
        while let Some(doc) = scan.next().await? {
            let id = doc.id().in_doc(c::SERVICES, "?")?;
            let (model_uuid, app) = split_doc_id(id)
                .ok_or_else(|| StepError::unexpected(c::SERVICES, id, "failed to split id"))?;
            let charm_url = doc.get_str("charmurl").in_doc(c::SERVICES, id)?;
            let unit_count = doc.get_i64("unitcount").in_doc(c::SERVICES, id)?;

            let old_constraints = format!("{model_uuid}:s#{app}");
            let new_constraints = format!("{model_uuid}:asc#{app}#{charm_url}");
            for key in [
                format!("{model_uuid}:c#{charm_url}"),
                format!("{model_uuid}:a#{app}#{charm_url}"),
                new_constraints.clone(),
            ] {
                *refcounts.entry(key).or_default() += 1 + unit_count;
            }

            let constraints = fetch(store, c::STORAGE_CONSTRAINTS, &old_constraints).await?;

            let mut body = strip_bookkeeping(&doc);
            body.remove("ownertag");
            tx.extend(relocate(c::SERVICES, id, c::APPLICATIONS, id, body));
            tx.extend(relocate(
                c::STORAGE_CONSTRAINTS,
                &old_constraints,
                c::STORAGE_CONSTRAINTS,
                &new_constraints,
                strip_bookkeeping(&constraints),
            ));
        }

        for (key, count) in refcounts {
            let model_uuid = split_doc_id(&key).map_or("", |(scope, _)| scope).to_string();
            tx.push(Operation::insert(
                c::REFCOUNTS,
                key,
                Document::new()
                    .with("model-uuid", model_uuid)
                    .with("refcount", count),
            ));
        }
        Ok(StepPlan::transaction(tx))
    }
}

/// Moves service leadership leases to the application namespace
#[derive(Debug, Clone, Copy, Default)]
pub struct LeasesStep;

#[async_trait]
impl Step for LeasesStep {
    fn name(&self) -> &str {
        "leases"
    }

    fn description(&self) -> &str {
        "Updating leases"
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let mut tx = Transaction::new();
        let mut scan = Scan::open(store, c::LEASES).await?;
        while let Some(doc) = scan.next().await? {
            let old_id = doc.id().in_doc(c::LEASES, "?")?;
            match doc.opt_str("namespace").in_doc(c::LEASES, old_id)? {
                Some(APPLICATION_LEADERSHIP) => {
                    return Err(StepError::unexpected(
                        c::LEASES,
                        old_id,
                        "lease already has application-leadership",
                    ));
                }
                Some(SERVICE_LEADERSHIP) => {}
                _ => {
                    debug!(id = old_id, "skipping lease");
                    continue;
                }
            }

            let model_uuid = doc.get_str("model-uuid").in_doc(c::LEASES, old_id)?;
            let kind = doc.get_str("type").in_doc(c::LEASES, old_id)?;
            let mut new_id = format!("{model_uuid}:{kind}#{APPLICATION_LEADERSHIP}#");
            if let Some(name) = doc.opt_str("name").in_doc(c::LEASES, old_id)? {
                if !name.is_empty() {
                    new_id.push_str(name);
                    new_id.push('#');
                }
            }

            let mut body = strip_bookkeeping(&doc);
            body.replace("namespace", APPLICATION_LEADERSHIP);
            tx.extend(relocate(c::LEASES, old_id, c::LEASES, &new_id, body));
        }
        Ok(StepPlan::transaction(tx))
    }
}

/// Points status history entries at application global keys
///
/// History entries are keyed by generated ids, so only the `globalkey`
/// field changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusHistoryStep;

#[async_trait]
impl Step for StatusHistoryStep {
    fn name(&self) -> &str {
        "statuses-history"
    }

    fn description(&self) -> &str {
        "Updating status history"
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let mut tx = Transaction::new();
        let mut scan = Scan::open(store, c::STATUSES_HISTORY).await?;
        while let Some(doc) = scan.next().await? {
            let id = doc.id().in_doc(c::STATUSES_HISTORY, "?")?;
            let key = doc.get_str("globalkey").in_doc(c::STATUSES_HISTORY, id)?;
            let Some(rest) = key.strip_prefix("s#") else {
                continue;
            };
            tx.push(Operation::update(
                c::STATUSES_HISTORY,
                id,
                Update::new().set("globalkey", format!("a#{rest}")),
            ));
        }
        Ok(StepPlan::transaction(tx))
    }
}

fn service_tag() -> Result<&'static Regex, StepError> {
    static TAG: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"^service-([a-z][a-z0-9]*(?:-[a-z0-9]*[a-z][a-z0-9]*)*)$"))
        .as_ref()
        .map_err(|e| StepError::Pattern(e.clone()))
}

/// Name of the service a `service-<name>` tag refers to
///
/// # Errors
/// `StepError::Pattern` if the tag pattern does not compile.
pub(crate) fn parse_service_tag(tag: &str) -> Result<Option<&str>, StepError> {
    Ok(service_tag()?
        .captures(tag)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str()))
}

/// Renames per-service sequences to per-application ones
#[derive(Debug, Clone, Copy, Default)]
pub struct SequencesStep;

#[async_trait]
impl Step for SequencesStep {
    fn name(&self) -> &str {
        "sequences"
    }

    fn description(&self) -> &str {
        "Updating sequences"
    }

    async fn plan(
        &self,
        store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let mut tx = Transaction::new();
        let mut scan = Scan::open(store, c::SEQUENCE).await?;
        while let Some(doc) = scan.next().await? {
            let old_id = doc.id().in_doc(c::SEQUENCE, "?")?;
            let name = doc.get_str("name").in_doc(c::SEQUENCE, old_id)?;
            let Some(service) = parse_service_tag(name)? else {
                continue;
            };

            let model_uuid = doc.get_str("model-uuid").in_doc(c::SEQUENCE, old_id)?;
            let app_tag = format!("application-{service}");
            let new_id = format!("{model_uuid}:{app_tag}");

            let mut body = strip_bookkeeping(&doc);
            body.replace("name", app_tag);
            tx.extend(relocate(c::SEQUENCE, old_id, c::SEQUENCE, &new_id, body));
        }
        Ok(StepPlan::transaction(tx))
    }
}

/// Drops collections the new schema no longer has
#[derive(Debug, Clone, Copy, Default)]
pub struct DropLegacyCollectionsStep;

#[async_trait]
impl Step for DropLegacyCollectionsStep {
    fn name(&self) -> &str {
        "drop-legacy-collections"
    }

    fn description(&self) -> &str {
        "Dropping legacy collections"
    }

    async fn plan(
        &self,
        _store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        Ok(StepPlan::default()
            .drop_collection(c::SERVICES)
            .drop_collection(c::SETTINGS_REFS)
            .drop_collection(c::LEGACY_IP_ADDRESSES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmig_store::{Change, MemoryStore};
    use pretty_assertions::assert_eq;

    #[test]
    fn service_tags() {
        fn parse(tag: &str) -> Option<&str> {
            parse_service_tag(tag).unwrap()
        }
        assert_eq!(parse("service-mysql"), Some("mysql"));
        assert_eq!(parse("service-my-sql2"), Some("my-sql2"));
        assert_eq!(parse("machine"), None);
        assert_eq!(parse("service-9lives"), None);
        assert_eq!(parse("application-mysql"), None);
    }

    #[test]
    fn service_tag_pattern_compiles_once() {
        let first = service_tag().unwrap();
        let second = service_tag().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[tokio::test]
    async fn refcounts_sum_across_services_sharing_a_charm() {
        let store = MemoryStore::new();
        for (app, units) in [("db", 2), ("db2", 0)] {
            store
                .insert_raw(
                    c::SERVICES,
                    Document::with_id(format!("m:{app}"))
                        .with("charmurl", "cs:mysql-1")
                        .with("unitcount", units)
                        .with("ownertag", "user-admin"),
                )
                .unwrap();
            store
                .insert_raw(
                    c::STORAGE_CONSTRAINTS,
                    Document::with_id(format!("m:s#{app}")).with("constraints", Document::new()),
                )
                .unwrap();
        }

        let plan = ServicesToApplicationsStep
            .plan(&store, &mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap();

        let refcount = |id: &str| {
            plan.transaction
                .operations()
                .iter()
                .find(|op| op.collection == c::REFCOUNTS && op.id == id)
                .map(|op| match &op.change {
                    Change::Insert(doc) => doc.get_i64("refcount").unwrap(),
                    other => panic!("unexpected {other:?}"),
                })
        };
        assert_eq!(refcount("m:c#cs:mysql-1"), Some(4));
        assert_eq!(refcount("m:a#db#cs:mysql-1"), Some(3));
        assert_eq!(refcount("m:asc#db2#cs:mysql-1"), Some(1));

        let app = plan
            .transaction
            .operations()
            .iter()
            .find(|op| op.collection == c::APPLICATIONS && op.id == "m:db")
            .unwrap();
        assert_eq!(
            app.change,
            Change::Insert(
                Document::new()
                    .with("charmurl", "cs:mysql-1")
                    .with("unitcount", 2)
            )
        );
    }

    #[tokio::test]
    async fn missing_storage_constraints_fail_the_step() {
        let store = MemoryStore::new();
        store
            .insert_raw(
                c::SERVICES,
                Document::with_id("m:db").with("charmurl", "cs:mysql-1").with("unitcount", 1),
            )
            .unwrap();

        let err = ServicesToApplicationsStep
            .plan(&store, &mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Read { ref collection, .. } if collection == c::STORAGE_CONSTRAINTS));
    }

    #[tokio::test]
    async fn leases_move_namespace() {
        let store = MemoryStore::new();
        store
            .insert_raw(
                c::LEASES,
                Document::with_id("m:application-leadership#service-leadership#db")
                    .with("namespace", "service-leadership")
                    .with("model-uuid", "m")
                    .with("type", "lease")
                    .with("name", "db")
                    .with("holder", "db/0"),
            )
            .unwrap();
        store
            .insert_raw(
                c::LEASES,
                Document::with_id("m:clock").with("type", "clock").with("model-uuid", "m"),
            )
            .unwrap();

        let plan = LeasesStep
            .plan(&store, &mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap();

        let ops = plan.transaction.operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].id, "m:lease#application-leadership#db#");
        let Change::Insert(body) = &ops[1].change else {
            panic!("expected insert");
        };
        assert_eq!(body.get_str("namespace").unwrap(), APPLICATION_LEADERSHIP);
        assert_eq!(body.get_str("holder").unwrap(), "db/0");
    }

    #[tokio::test]
    async fn already_migrated_lease_is_an_error() {
        let store = MemoryStore::new();
        store
            .insert_raw(
                c::LEASES,
                Document::with_id("m:x").with("namespace", APPLICATION_LEADERSHIP),
            )
            .unwrap();
        let err = LeasesStep
            .plan(&store, &mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Unexpected { .. }));
    }

    #[tokio::test]
    async fn sequences_are_rekeyed() {
        let store = MemoryStore::new();
        store
            .insert_raw(
                c::SEQUENCE,
                Document::with_id("m:service-mysql")
                    .with("name", "service-mysql")
                    .with("model-uuid", "m")
                    .with("counter", 3),
            )
            .unwrap();
        store
            .insert_raw(
                c::SEQUENCE,
                Document::with_id("m:machine").with("name", "machine").with("model-uuid", "m"),
            )
            .unwrap();

        let plan = SequencesStep
            .plan(&store, &mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap();
        let ops = plan.transaction.operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].id, "m:service-mysql");
        assert_eq!(ops[1].id, "m:application-mysql");
        assert_eq!(
            ops[1].change,
            Change::Insert(
                Document::new()
                    .with("name", "application-mysql")
                    .with("model-uuid", "m")
                    .with("counter", 3)
            )
        );
    }
}
