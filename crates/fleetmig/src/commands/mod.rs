//! Operator commands
//!
//! Each command takes a [`Session`](crate::Session) and writes its
//! operator-facing output to `out`; logging goes through `tracing`.

pub mod agents;
pub mod db;
pub mod fleet;

pub use agents::{agents, service_script, AgentAction};
pub use db::{clean_db, upgrade_db, verify_db};
pub use fleet::{distribute, upgrade_agents, upgrade_agents_script, JUJUC_COMMANDS};

use crate::error::CommandError;
use fleetmig_dispatch::{CommandResult, Report};
use std::io::Write;

/// Print every result, problems last, then fail if any target had one
fn report(out: &mut impl Write, results: &[CommandResult]) -> Result<(), CommandError> {
    let report = Report::new(results);
    write!(out, "{report}")?;
    out.flush()?;
    report.check()?;
    Ok(())
}
