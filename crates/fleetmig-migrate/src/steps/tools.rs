use super::collections as c;
use crate::error::StepError;
use crate::step::{MigrationState, Step, StepPlan};
use async_trait::async_trait;
use fleetmig_store::{Document, DocumentStore, Operation};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::debug;

/// Size and lowercase hex SHA-256 of a tools tarball
#[must_use]
pub fn hash_tools(data: &[u8]) -> (u64, String) {
    let digest = Sha256::digest(data);
    (data.len() as u64, hex::encode(digest))
}

/// Registers the 2.0 agent tools tarball in tools metadata
#[derive(Debug, Clone)]
pub struct ToolsMetadataStep {
    path: PathBuf,
    version: String,
}

impl ToolsMetadataStep {
    /// Register the tarball at `path` as binary `version`
    #[must_use]
    pub fn new(path: PathBuf, version: String) -> Self {
        Self { path, version }
    }
}

#[async_trait]
impl Step for ToolsMetadataStep {
    fn name(&self) -> &str {
        "tools-metadata"
    }

    fn description(&self) -> &str {
        "Adding 2.0 agent binaries"
    }

    async fn plan(
        &self,
        _store: &dyn DocumentStore,
        _state: &mut MigrationState,
    ) -> Result<StepPlan, StepError> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|source| StepError::Io {
                path: self.path.clone(),
                source,
            })?;
        let (size, sha256) = hash_tools(&data);
        debug!(version = %self.version, size, %sha256, "tools metadata");

        let size = i64::try_from(size).map_err(|_| {
            StepError::unexpected(c::TOOLS_METADATA, self.version.as_str(), "tarball too large")
        })?;
        Ok(StepPlan::from(vec![Operation::insert(
            c::TOOLS_METADATA,
            self.version.as_str(),
            Document::new()
                .with("version", self.version.as_str())
                .with("size", size)
                .with("sha256", sha256),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmig_store::{Change, MemoryStore};
    use pretty_assertions::assert_eq;

    #[test]
    fn hash_of_known_input() {
        let (size, sha) = hash_tools(b"abc");
        assert_eq!(size, 3);
        assert_eq!(
            sha,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn plan_inserts_metadata_for_the_tarball() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("juju-2.0.0-xenial-amd64.tgz");
        std::fs::write(&path, b"abc").unwrap();

        let step = ToolsMetadataStep::new(path, "2.0.0-xenial-amd64".into());
        let plan = step
            .plan(&MemoryStore::new(), &mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap();

        let ops = plan.transaction.operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, "2.0.0-xenial-amd64");
        let Change::Insert(doc) = &ops[0].change else {
            panic!("expected insert");
        };
        assert_eq!(doc.get_i64("size").unwrap(), 3);
        assert!(doc.get_str("sha256").unwrap().starts_with("ba7816bf"));
    }

    #[tokio::test]
    async fn missing_tarball_is_an_io_error() {
        let step = ToolsMetadataStep::new(PathBuf::from("/nonexistent/tools.tgz"), "2.0.0".into());
        let err = step
            .plan(&MemoryStore::new(), &mut MigrationState::with_controller_uuid("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Io { .. }));
    }
}
