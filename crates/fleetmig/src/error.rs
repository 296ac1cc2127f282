//! Command errors

use crate::config::ConfigError;
use crate::inventory::InventoryError;
use fleetmig_dispatch::DispatchError;
use fleetmig_migrate::MigrationError;
use fleetmig_store::StoreError;

/// Anything an operator command can fail with
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Bad or missing command arguments
    #[error("{0}")]
    Usage(String),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store could not be opened or read
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Models or machines could not be listed
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// A migration step failed
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// One or more machines had a problem
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Writing operator output failed
    #[error("writing output: {0}")]
    Output(#[from] std::io::Error),
}

impl CommandError {
    /// Usage error with `message`
    #[inline]
    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Whether the command ran but some machine reported a problem
    #[inline]
    #[must_use]
    pub fn is_target_failure(&self) -> bool {
        matches!(self, Self::Dispatch(DispatchError::TargetsFailed { .. }))
    }
}
