//! Resources shared by every command of one invocation

use crate::config::FleetConfig;
use crate::error::CommandError;
use fleetmig_context::Context;
use fleetmig_dispatch::{Dispatcher, SshTransport};
use fleetmig_migrate::TransactionRunner;
use fleetmig_store::{DocumentStore, FileStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Store, run context, dispatcher and configuration for one invocation
pub struct Session {
    store: Arc<dyn DocumentStore>,
    context: Context,
    dispatcher: Dispatcher,
    config: FleetConfig,
}

impl Session {
    /// Session over explicit parts
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        context: Context,
        dispatcher: Dispatcher,
        config: FleetConfig,
    ) -> Self {
        Self {
            store,
            context,
            dispatcher,
            config,
        }
    }

    /// Open the configured store snapshot and an ssh dispatcher
    ///
    /// # Errors
    /// `CommandError::Store` if the snapshot cannot be opened.
    pub async fn open(config: FleetConfig, context: Context) -> Result<Self, CommandError> {
        let store = FileStore::open(&config.store_path).await?;
        let transport = SshTransport::new(config.identity_file.clone());
        let dispatcher = Dispatcher::new(Arc::new(transport)).with_user(config.ssh_user.as_str());
        Ok(Self::new(Arc::new(store), context, dispatcher, config))
    }

    /// Announce the run mode
    pub fn log_mode(&self) {
        if self.context.is_live() {
            warn!("Running LIVE");
        } else {
            info!("Running dry-run");
        }
    }

    /// Document store
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Run context
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Remote dispatcher
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Transaction runner over this session's store and context
    #[must_use]
    pub fn runner(&self) -> TransactionRunner {
        TransactionRunner::new(Arc::clone(&self.store), self.context.clone())
    }
}
