//! Testing utilities for the fleetmig workspace
//!
//! Shared fakes and fixtures: a scripted remote transport, a fault
//! injecting document store, and a seeded 2.0-beta7 shaped store.

#![allow(missing_docs)]

use async_trait::async_trait;
use fleetmig_dispatch::{RunOutput, Transport, TransportError};
use fleetmig_store::{
    Document, DocumentCursor, DocumentStore, MemoryStore, Operation, Query, StoreError, Value,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// How a fake host responds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeOutcome {
    /// Scripts run and produce this output
    Output(RunOutput),
    /// Every call fails with an unreachable error
    Unreachable(String),
    /// Copies fail; scripts would succeed
    CopyFails(String),
}

/// One call the fake transport received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Copy {
        user_host: String,
        local: PathBuf,
        remote_path: String,
    },
    Run {
        user_host: String,
        script: String,
    },
}

impl FakeCall {
    pub fn user_host(&self) -> &str {
        match self {
            Self::Copy { user_host, .. } | Self::Run { user_host, .. } => user_host,
        }
    }
}

/// Transport with scripted per-host outcomes that records every call
///
/// Hosts are keyed by address; unknown hosts succeed with empty output.
#[derive(Debug, Default)]
pub struct FakeTransport {
    outcomes: Mutex<HashMap<String, FakeOutcome>>,
    calls: Mutex<Vec<FakeCall>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(self, address: &str, outcome: FakeOutcome) -> Self {
        self.outcomes.lock().insert(address.to_string(), outcome);
        self
    }

    pub fn with_output(self, address: &str, output: RunOutput) -> Self {
        self.with_outcome(address, FakeOutcome::Output(output))
    }

    pub fn unreachable(self, address: &str) -> Self {
        self.with_outcome(address, FakeOutcome::Unreachable("connection refused".into()))
    }

    pub fn failing_copy(self, address: &str) -> Self {
        self.with_outcome(address, FakeOutcome::CopyFails("permission denied".into()))
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().clone()
    }

    pub fn scripts_for(&self, address: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                FakeCall::Run { user_host, script } if host_of(user_host) == address => {
                    Some(script.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn copies(&self) -> Vec<FakeCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, FakeCall::Copy { .. }))
            .cloned()
            .collect()
    }

    fn outcome(&self, user_host: &str) -> FakeOutcome {
        self.outcomes
            .lock()
            .get(host_of(user_host))
            .cloned()
            .unwrap_or(FakeOutcome::Output(RunOutput::default()))
    }
}

fn host_of(user_host: &str) -> &str {
    user_host.rsplit_once('@').map_or(user_host, |(_, host)| host)
}

#[async_trait]
impl Transport for FakeTransport {
    async fn copy_file(
        &self,
        local: &Path,
        user_host: &str,
        remote_path: &str,
    ) -> Result<(), TransportError> {
        self.calls.lock().push(FakeCall::Copy {
            user_host: user_host.to_string(),
            local: local.to_path_buf(),
            remote_path: remote_path.to_string(),
        });
        match self.outcome(user_host) {
            FakeOutcome::Unreachable(reason) => Err(TransportError::unreachable(user_host, reason)),
            FakeOutcome::CopyFails(reason) => Err(TransportError::Copy {
                local: local.to_path_buf(),
                destination: format!("{user_host}:{remote_path}"),
                reason,
            }),
            FakeOutcome::Output(_) => Ok(()),
        }
    }

    async fn run_script(&self, user_host: &str, script: &str) -> Result<RunOutput, TransportError> {
        self.calls.lock().push(FakeCall::Run {
            user_host: user_host.to_string(),
            script: script.to_string(),
        });
        match self.outcome(user_host) {
            FakeOutcome::Unreachable(reason) => Err(TransportError::unreachable(user_host, reason)),
            FakeOutcome::CopyFails(_) => Ok(RunOutput::default()),
            FakeOutcome::Output(output) => Ok(output),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Store wrapper that fails reads of chosen collections or every apply
pub struct FaultyStore {
    inner: Arc<dyn DocumentStore>,
    failing_reads: Mutex<HashSet<String>>,
    fail_apply: Mutex<bool>,
    apply_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            failing_reads: Mutex::new(HashSet::new()),
            fail_apply: Mutex::new(false),
            apply_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_reads_of(self, collection: &str) -> Self {
        self.failing_reads.lock().insert(collection.to_string());
        self
    }

    pub fn fail_applies(self) -> Self {
        *self.fail_apply.lock() = true;
        self
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    fn check_read(&self, collection: &str) -> Result<(), StoreError> {
        if self.failing_reads.lock().contains(collection) {
            return Err(StoreError::read(collection, "injected cursor failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_collections().await
    }

    async fn find_all(&self, collection: &str, query: &Query) -> Result<DocumentCursor, StoreError> {
        self.check_read(collection)?;
        self.inner.find_all(collection, query).await
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        self.check_read(collection)?;
        self.inner.find_by_id(collection, id).await
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        self.check_read(collection)?;
        self.inner.count(collection).await
    }

    async fn apply_transaction(&self, ops: &[Operation]) -> Result<(), StoreError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_apply.lock() {
            return Err(StoreError::Unavailable("injected apply failure".into()));
        }
        self.inner.apply_transaction(ops).await
    }

    async fn resume_pending_transactions(&self) -> Result<(), StoreError> {
        self.inner.resume_pending_transactions().await
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.inner.drop_collection(collection).await
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

pub const CONTROLLER_MODEL_UUID: &str = "deadbeef-0bad-400d-8000-4b1d0d06f00d";
pub const HOSTED_MODEL_UUID: &str = "c0ffee00-0bad-400d-8000-4b1d0d06f00d";

/// Addresses of the fixture machines: controller 0, hosted 0, hosted 1
pub const MACHINE_ADDRESSES: [&str; 3] = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];

fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Value {
    Value::List(items.into_iter().map(Into::into).collect())
}

fn scoped(model: &str, local: &str) -> String {
    format!("{model}:{local}")
}

fn lxd_settings(model: &str, name: &str) -> Document {
    Document::new()
        .with("type", "lxd")
        .with("name", name)
        .with("uuid", model)
        .with("agent-version", "2.0-beta7")
        .with("ca-cert", "-----BEGIN CERTIFICATE-----\nCA\n-----END CERTIFICATE-----")
        .with("client-cert", "CLIENT CERT")
        .with("client-key", "CLIENT KEY")
        .with("server-cert", "SERVER CERT")
        .with("namespace", "admin")
        .with("admin-secret", "s3cret")
        .with("api-port", 17070)
        .with("state-port", 37017)
        .with("controller-uuid", CONTROLLER_MODEL_UUID)
}

fn machine(model: &str, id: &str, address: &str) -> Document {
    Document::with_id(scoped(model, id))
        .with("machineid", id)
        .with("model-uuid", model)
        .with("series", "xenial")
        .with("supportedcontainers", list(["lxc", "lxd"]))
        .with("preferredpublicaddress", Document::new().with("value", address))
        .with("tools", Document::new().with("version", "2.0-beta7-xenial-amd64"))
        .with("txn-revno", 5)
}

/// A controller with one hosted model running mysql, in 2.0-beta7 shape
pub fn juju_fixture() -> MemoryStore {
    let (ctrl, hosted) = (CONTROLLER_MODEL_UUID, HOSTED_MODEL_UUID);
    let store = MemoryStore::new();
    let put = |collection: &str, doc: Document| {
        store.insert_raw(collection, doc).unwrap();
    };

    put(
        "controllers",
        Document::with_id("stateServingInfo")
            .with("apiport", 17070)
            .with("stateport", 37017),
    );
    put("controllers", Document::with_id("e").with("model-uuid", ctrl));

    put(
        "models",
        Document::with_id(ctrl)
            .with("name", "admin")
            .with("owner", "admin@local")
            .with("server-uuid", ctrl)
            .with("life", 0),
    );
    put(
        "models",
        Document::with_id(hosted)
            .with("name", "default")
            .with("owner", "admin@local")
            .with("server-uuid", ctrl)
            .with("life", 0),
    );
    put("usermodelname", Document::with_id("admin@local:admin"));
    put("usermodelname", Document::with_id("admin@local:default"));

    put(
        "settings",
        Document::with_id(scoped(ctrl, "e"))
            .with("model-uuid", ctrl)
            .with("settings", lxd_settings(ctrl, "admin")),
    );
    put(
        "settings",
        Document::with_id(scoped(hosted, "e"))
            .with("model-uuid", hosted)
            .with("settings", lxd_settings(hosted, "default")),
    );
    put(
        "settings",
        Document::with_id(scoped(hosted, "s#mysql"))
            .with("model-uuid", hosted)
            .with("env-uuid", hosted)
            .with("settings", Document::new().with("dataset-size", "80%"))
            .with("txn-revno", 2),
    );
    put(
        "settingsrefs",
        Document::with_id(scoped(hosted, "s#mysql#cs:trusty/mysql-38")).with("refcount", 1),
    );

    put(
        "services",
        Document::with_id(scoped(hosted, "mysql"))
            .with("name", "mysql")
            .with("model-uuid", hosted)
            .with("charmurl", "cs:trusty/mysql-38")
            .with("unitcount", 1)
            .with("relationcount", 1)
            .with("ownertag", "user-admin@local")
            .with("txn-revno", 3)
            .with("txn-queue", list(["abc_1"])),
    );
    put(
        "storageconstraints",
        Document::with_id(scoped(hosted, "s#mysql"))
            .with("model-uuid", hosted)
            .with("constraints", Document::new()),
    );
    put(
        "units",
        Document::with_id(scoped(hosted, "mysql/0"))
            .with("name", "mysql/0")
            .with("model-uuid", hosted)
            .with("service", "mysql")
            .with("machineid", "1")
            .with("ports", list(Vec::<Value>::new()))
            .with("privateaddress", MACHINE_ADDRESSES[2])
            .with("publicaddress", MACHINE_ADDRESSES[2]),
    );
    put(
        "leases",
        Document::with_id(scoped(hosted, "lease#service-leadership#mysql#"))
            .with("model-uuid", hosted)
            .with("namespace", "service-leadership")
            .with("type", "lease")
            .with("name", "mysql")
            .with("holder", "mysql/0"),
    );
    put(
        "leases",
        Document::with_id(scoped(hosted, "clock#service-leadership#"))
            .with("model-uuid", hosted)
            .with("namespace", "service-leadership")
            .with("type", "clock"),
    );
    put(
        "modelEntityRefs",
        Document::with_id(ctrl)
            .with("machines", list(["0"]))
            .with("services", list(Vec::<Value>::new())),
    );
    put(
        "modelEntityRefs",
        Document::with_id(hosted)
            .with("machines", list(["0", "1"]))
            .with("services", list(["mysql"])),
    );
    put(
        "relations",
        Document::with_id(scoped(hosted, "mysql:cluster"))
            .with("key", "mysql:cluster")
            .with("model-uuid", hosted)
            .with(
                "endpoints",
                list([Document::new()
                    .with("servicename", "mysql")
                    .with("relation", Document::new().with("name", "cluster").with("role", "peer"))]),
            ),
    );
    put(
        "resources",
        Document::with_id(scoped(hosted, "mysql/data"))
            .with("model-uuid", hosted)
            .with("env-uuid", hosted)
            .with("service-id", "mysql"),
    );

    let legacy = |doc: Document| doc.with("model-uuid", hosted).with("env-uuid", hosted);
    put(
        "annotations",
        legacy(Document::with_id(scoped(hosted, "s#mysql")))
            .with("globalkey", "s#mysql")
            .with("annotations", Document::new().with("owner", "db-team")),
    );
    put(
        "constraints",
        legacy(Document::with_id(scoped(hosted, "s#mysql"))).with("mem", 1024),
    );
    put("constraints", Document::with_id(scoped(hosted, "m#1")).with("model-uuid", hosted));
    put(
        "endpointbindings",
        legacy(Document::with_id(scoped(hosted, "s#mysql"))).with("bindings", Document::new()),
    );
    put(
        "statuses",
        legacy(Document::with_id(scoped(hosted, "s#mysql"))).with("status", "active"),
    );
    put(
        "statuses",
        Document::with_id(scoped(hosted, "u#mysql/0"))
            .with("model-uuid", hosted)
            .with("status", "idle"),
    );
    put(
        "statuseshistory",
        Document::with_id("1")
            .with("model-uuid", hosted)
            .with("globalkey", "s#mysql")
            .with("status", "active"),
    );
    put(
        "statuseshistory",
        Document::with_id("2")
            .with("model-uuid", hosted)
            .with("globalkey", "u#mysql/0")
            .with("status", "idle"),
    );
    put(
        "sequence",
        Document::with_id(scoped(hosted, "service-mysql"))
            .with("name", "service-mysql")
            .with("model-uuid", hosted)
            .with("counter", 1),
    );
    put(
        "sequence",
        Document::with_id(scoped(hosted, "machine"))
            .with("name", "machine")
            .with("model-uuid", hosted)
            .with("counter", 2),
    );

    put(
        "users",
        Document::with_id("admin")
            .with("name", "admin")
            .with("deactivated", false),
    );
    for model in [ctrl, hosted] {
        put(
            "modelusers",
            Document::with_id(scoped(model, "admin@local"))
                .with("model-uuid", model)
                .with("user", "admin@local")
                .with("access", "admin"),
        );
    }

    put("machines", machine(ctrl, "0", MACHINE_ADDRESSES[0]));
    put("machines", machine(hosted, "0", MACHINE_ADDRESSES[1]));
    put("machines", machine(hosted, "1", MACHINE_ADDRESSES[2]));

    put(
        "cloudimagemetadata",
        Document::with_id(scoped(ctrl, "xenial-amd64-released"))
            .with("model-uuid", ctrl)
            .with("image_id", "ubuntu-16.04-amd64"),
    );
    put(
        "spaces",
        Document::with_id(scoped(hosted, "default"))
            .with("model-uuid", hosted)
            .with("providerid", scoped(hosted, "space-1")),
    );
    put(
        "subnets",
        Document::with_id(scoped(hosted, "10.0.0.0/24"))
            .with("model-uuid", hosted)
            .with("providerid", scoped(hosted, "subnet-1")),
    );
    put(
        "linklayerdevices",
        Document::with_id(scoped(hosted, "m#1#d#eth0"))
            .with("model-uuid", hosted)
            .with("name", "eth0"),
    );

    store
}

/// Convenience: fixture behind a trait object
pub fn shared_fixture() -> (Arc<MemoryStore>, Arc<dyn DocumentStore>) {
    let store = Arc::new(juju_fixture());
    let dyn_store: Arc<dyn DocumentStore> = store.clone();
    (store, dyn_store)
}
