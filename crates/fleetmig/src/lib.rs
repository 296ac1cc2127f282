//! fleetmig - upgrade a Juju 2.0-beta7 controller and its machines to 2.0
//!
//! Provides:
//! - [`FleetConfig`]: paths, remote user and versions, loaded from TOML
//! - [`Inventory`]: models and machines read from the controller store
//! - [`Session`]: the store, run context and dispatcher of one invocation
//! - [`commands`]: `upgrade-db`, `clean-db`, `verify-db`, `agents`,
//!   `distribute` and `upgrade-agents`
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetmig::{commands, FleetConfig, Session};
//! use fleetmig_context::Context;
//!
//! # async fn example() -> Result<(), fleetmig::CommandError> {
//! let session = Session::open(FleetConfig::default(), Context::preview()).await?;
//! commands::verify_db(&session, &mut std::io::stdout()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod commands;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod session;

pub use config::{ConfigError, FleetConfig};
pub use error::CommandError;
pub use inventory::{FleetMachine, FleetModel, Inventory, InventoryError};
pub use session::Session;
