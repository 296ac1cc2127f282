//! Stopping, starting and querying the jujud services on every machine

use super::report;
use crate::error::CommandError;
use crate::inventory::{targets, Inventory};
use crate::session::Session;
use fleetmig_dispatch::{Script, DO_OP};
use std::fmt;
use std::io::Write;
use std::path::Path;

const USAGE: &str = "missing action: [status, stop, start-controller, start-others]";

/// What `agents` does, and on which machines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    /// Service status on every machine
    Status,
    /// Stop agents on every machine
    Stop,
    /// Start agents on the controller machine
    StartController,
    /// Start agents on every other machine
    StartOthers,
}

impl AgentAction {
    /// Parse the action argument
    ///
    /// # Errors
    /// `CommandError::Usage` if missing or unknown.
    pub fn parse(arg: Option<&str>) -> Result<Self, CommandError> {
        match arg {
            None => Err(CommandError::usage(USAGE)),
            Some("status") => Ok(Self::Status),
            Some("stop") => Ok(Self::Stop),
            Some("start-controller") => Ok(Self::StartController),
            Some("start-others") => Ok(Self::StartOthers),
            Some(other) => Err(CommandError::usage(format!("unknown action: {other:?}"))),
        }
    }

    /// Argument passed to `service`
    #[must_use]
    pub fn service_command(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Stop => "stop",
            Self::StartController | Self::StartOthers => "start",
        }
    }

    fn mutates(self) -> bool {
        !matches!(self, Self::Status)
    }
}

impl fmt::Display for AgentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Status => "status",
            Self::Stop => "stop",
            Self::StartController => "start-controller",
            Self::StartOthers => "start-others",
        })
    }
}

/// Script running `service jujud-<agent> <command>` for every agent directory
#[must_use]
pub fn service_script(agents_dir: &Path, action: AgentAction) -> Script {
    // status is read-only and runs in preview too
    let marker = if action.mutates() { DO_OP } else { "" };
    Script::new(format!(
        "cd {}\nfor agent in *\ndo\n    {marker}service jujud-$agent {}\ndone\n",
        agents_dir.display(),
        action.service_command()
    ))
}

/// Run `action` on its machines and report per machine
///
/// # Errors
/// Inventory failures, or `DispatchError::TargetsFailed` after reporting.
pub async fn agents(
    session: &Session,
    action: AgentAction,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    session.log_mode();
    let inventory = Inventory::load(session.store()).await?;
    let machines = match action {
        AgentAction::Status | AgentAction::Stop => inventory.all_machines(),
        AgentAction::StartController => vec![inventory.server_machine()?],
        AgentAction::StartOthers => inventory.other_machines(),
    };

    let job = service_script(&session.config().agents_dir, action).job(session.context());
    let results = session.dispatcher().dispatch(&targets(&machines), &job).await;
    report(out, &results)
}
