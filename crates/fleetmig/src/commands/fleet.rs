//! Commands that push files to the machines

use super::report;
use crate::config::FleetConfig;
use crate::error::CommandError;
use crate::inventory::{controller_uuid, targets, Inventory};
use crate::session::Session;
use fleetmig_dispatch::{Script, Upload, DO_OP};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Hook tools symlinked to `jujud` in a 2.0 tools directory
pub const JUJUC_COMMANDS: [&str; 29] = [
    "action-fail",
    "action-get",
    "action-set",
    "add-metric",
    "application-version-set",
    "close-port",
    "config-get",
    "is-leader",
    "juju-log",
    "juju-reboot",
    "leader-get",
    "leader-set",
    "network-get",
    "opened-ports",
    "open-port",
    "payload-register",
    "payload-status-set",
    "payload-unregister",
    "relation-get",
    "relation-ids",
    "relation-list",
    "relation-set",
    "resource-get",
    "status-get",
    "status-set",
    "storage-add",
    "storage-get",
    "storage-list",
    "unit-get",
];

/// Copy `binary` to every machine but the controller and move it into place
///
/// # Errors
/// Inventory failures, or `DispatchError::TargetsFailed` after reporting.
pub async fn distribute(
    session: &Session,
    binary: &Path,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    session.log_mode();
    debug!(binary = %binary.display(), "distributing");
    let config = session.config();
    let machines = Inventory::load(session.store()).await?.other_machines();

    let upload = Upload::keep_name(binary);
    let script = Script::new(format!(
        "{DO_OP}mv {}/{} {}\n",
        config.remote_home(),
        upload.remote_name,
        config.remote_binary_path.display()
    ));
    let job = script.job_with_upload(session.context(), upload);

    let results = session.dispatcher().dispatch(&targets(&machines), &job).await;
    report(out, &results)
}

/// Unpack the tools, relink every agent and move `agent.conf` to format 2.0
#[must_use]
pub fn upgrade_agents_script(config: &FleetConfig, tarball: &str, controller_tag: &str) -> Script {
    let version = &config.tools_version;
    let tools_dir = config.tools_dir.display();
    let target = format!("{tools_dir}/{version}");
    let jujuc = JUJUC_COMMANDS.join(" ");

    Script::new(format!(
        r##"if [ ! -d {target} ]; then
    echo Unpack {version} tools and create jujuc command symlinks
    {DO_OP}mkdir -p {target}
    {DO_OP}tar --extract --gzip --file={tarball} --directory={target}
    for i in {jujuc}; do
        {DO_OP}ln -s {target}/jujud "{target}/$i"
    done
fi

cd {agents_dir}
for agent in *
do
    echo Set tools symlink for $agent
    {DO_OP}rm {tools_dir}/$agent
    {DO_OP}ln -s {version} {tools_dir}/$agent

    version=$(head -n 1 $agent/agent.conf)
    if [ "$version" = "# format 2.0" ]; then
        echo $agent/agent.conf already in format 2.0
    elif [ "$version" = "# format 1.18" ]; then
        echo Update $agent/agent.conf to be format 2.0
        {DO_OP}cp $agent/agent.conf $agent/agent.conf.old
        {DO_OP}sed -i 's/# format 1.18/# format 2.0/; s/upgradedToVersion: 2.0-beta7/upgradedToVersion: 2.0-rc1\ncontroller: {controller_tag}/' $agent/agent.conf
    else
        echo $agent/agent.conf has unexpected format: $version
    fi
done
"##,
        agents_dir = config.agents_dir.display(),
    ))
}

/// Copy the 2.0 tools to the machines and switch their agents over
///
/// Only machines whose address is in `addresses` are touched, unless it is
/// empty.
///
/// # Errors
/// `InventoryError::MissingControllerUuid` before `upgrade-db` has run,
/// other inventory failures, or `DispatchError::TargetsFailed` after
/// reporting.
pub async fn upgrade_agents(
    session: &Session,
    tools: &Path,
    addresses: &[String],
    out: &mut impl Write,
) -> Result<(), CommandError> {
    session.log_mode();
    let config = session.config();
    let controller_tag = format!("controller-{}", controller_uuid(session.store()).await?);

    let machines: Vec<_> = Inventory::load(session.store())
        .await?
        .all_machines()
        .into_iter()
        .filter(|m| addresses.is_empty() || addresses.contains(&m.address))
        .collect();
    for machine in &machines {
        debug!(
            "initiate copy to {}:{} ({})",
            machine.model_uuid, machine.machine_id, machine.address
        );
    }

    let upload = Upload::new(tools, format!("juju-{}.tgz", config.tools_version));
    let tarball = format!("{}/{}", config.remote_home(), upload.remote_name);
    let job = upgrade_agents_script(config, &tarball, &controller_tag)
        .job_with_upload(session.context(), upload);

    let results = session.dispatcher().dispatch(&targets(&machines), &job).await;
    report(out, &results)
}
