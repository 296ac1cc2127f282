//! Commands run against the controller store

use crate::error::CommandError;
use crate::inventory::Inventory;
use crate::session::Session;
use fleetmig_migrate::steps::{cleanup_steps, upgrade_precheck, upgrade_steps};
use fleetmig_migrate::{MigrationEngine, MigrationState, MigrationSummary, UpgradeOptions};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Upgrade the store to the 2.0 schema, registering `tools` as the 2.0 agent binaries
///
/// # Errors
/// The first failing migration step, or an output failure.
pub async fn upgrade_db(
    session: &Session,
    tools: &Path,
    out: &mut impl Write,
) -> Result<MigrationSummary, CommandError> {
    session.log_mode();
    let config = session.config();
    let options = UpgradeOptions {
        agent_version: config.agent_version.clone(),
        tools_version: config.tools_version.clone(),
        tools_file: Some(tools.to_path_buf()),
        cert_dir: config.cert_dir.clone(),
    };

    let mut state = MigrationState::generate();
    writeln!(out, "Generated new controller UUID: {}", state.controller_uuid)?;

    let summary = MigrationEngine::new(session.runner())
        .with_precheck(upgrade_precheck())
        .with_steps(upgrade_steps(&options))
        .run(&mut state)
        .await?;
    writeln!(out, "{summary}")?;
    Ok(summary)
}

/// Remove every pending cleanup document
///
/// Pending store transactions are not resumed.
///
/// # Errors
/// Store failures, or an output failure.
pub async fn clean_db(session: &Session, out: &mut impl Write) -> Result<usize, CommandError> {
    session.log_mode();
    writeln!(out, "Cleaning cleanups")?;

    let summary = MigrationEngine::new(session.runner())
        .with_steps(cleanup_steps())
        .without_resume()
        .run(&mut MigrationState::generate())
        .await?;

    let removed = summary.total_operations();
    if session.context().is_live() {
        writeln!(out, "{removed} cleanup docs removed.")?;
    } else {
        writeln!(out, "{removed} cleanup docs would be removed.")?;
    }
    Ok(removed)
}

/// Print the controller machine and every model's machines
///
/// # Errors
/// Inventory failures, including a missing controller machine.
pub async fn verify_db(session: &Session, out: &mut impl Write) -> Result<Inventory, CommandError> {
    let inventory = Inventory::load(session.store()).await?;
    let server = inventory.server_machine()?;
    info!(address = %server.address, "found controller machine");

    writeln!(out, "Server Machine:")?;
    writeln!(
        out,
        "  {}, {}, {}\n",
        server.model_uuid, server.machine_id, server.address
    )?;
    writeln!(out, "Models and Machines:")?;
    for model in &inventory.models {
        writeln!(out, "{} ({})", model.name, model.uuid)?;
        for machine in &model.machines {
            writeln!(out, "  {}: {}", machine.machine_id, machine.address)?;
        }
    }
    Ok(inventory)
}
