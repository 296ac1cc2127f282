//! `fleetmig` command line entry point

use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use fleetmig::commands::{self, AgentAction};
use fleetmig::{logging, FleetConfig, Session};
use fleetmig_context::{
    AuditSink, Context, JsonLinesAuditSink, RunMode, TeeAuditSink, TracingAuditSink, Verbosity,
};
use std::path::PathBuf;
use std::sync::Arc;

fn cli() -> Command {
    Command::new("fleetmig")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Upgrade a Juju 2.0-beta7 controller and its machines to 2.0")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("live")
                .long("live")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Do for real, not just dry-run"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Document store snapshot, overriding the configuration"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("More logging; remote scripts trace their commands"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log as JSON lines"),
        )
        .arg(
            Arg::new("audit-log")
                .long("audit-log")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Write one JSON record per store operation to this file"),
        )
        .subcommand(
            Command::new("upgrade-db")
                .about("Upgrade the controller database to 2.0")
                .arg(
                    Arg::new("tools")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the 2.0 tools tarball"),
                ),
        )
        .subcommand(Command::new("clean-db").about("Remove pending cleanup documents"))
        .subcommand(Command::new("verify-db").about("Show the controller machine and every model's machines"))
        .subcommand(
            Command::new("agents")
                .about("Manage the jujud services")
                .arg(Arg::new("action").help("status, stop, start-controller or start-others")),
        )
        .subcommand(Command::new("distribute").about("Copy this executable to every other machine"))
        .subcommand(
            Command::new("upgrade-agents")
                .about("Install the 2.0 tools and update agent configuration on the machines")
                .arg(
                    Arg::new("tools")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the 2.0 tools tarball"),
                )
                .arg(
                    Arg::new("addresses")
                        .num_args(0..)
                        .help("Limit to machines with these addresses"),
                ),
        )
}

fn audit_sink(matches: &ArgMatches, verbosity: Verbosity) -> anyhow::Result<Arc<dyn AuditSink>> {
    let mut sink = TeeAuditSink::new();
    if verbosity.is_debug() {
        sink = sink.with(Arc::new(TracingAuditSink));
    }
    if let Some(path) = matches.get_one::<PathBuf>("audit-log") {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating audit log {}", path.display()))?;
        sink = sink.with(Arc::new(JsonLinesAuditSink::new(file)));
    }
    Ok(Arc::new(sink))
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<FleetConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => FleetConfig::load(path)?,
        None => FleetConfig::default(),
    };
    if let Some(store) = matches.get_one::<PathBuf>("store") {
        config = config.with_store_path(store);
    }
    Ok(config)
}

fn tools_arg(args: &ArgMatches) -> anyhow::Result<PathBuf> {
    args.get_one::<PathBuf>("tools")
        .cloned()
        .context("missing path to 2.0 tools file")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let verbosity = Verbosity::from_occurrences(matches.get_count("verbose"));
    logging::init(verbosity, matches.get_flag("log-json"))
        .map_err(|e| anyhow::anyhow!("initialising logging: {e}"))?;

    let config = load_config(&matches)?;
    let context = Context::new(RunMode::from_live_flag(matches.get_flag("live")))
        .with_verbosity(verbosity)
        .with_audit(audit_sink(&matches, verbosity)?);
    let session = Session::open(config, context)
        .await
        .context("opening the controller store")?;

    let mut out = std::io::stdout();
    match matches.subcommand() {
        Some(("upgrade-db", args)) => {
            commands::upgrade_db(&session, &tools_arg(args)?, &mut out).await?;
        }
        Some(("clean-db", _)) => {
            commands::clean_db(&session, &mut out).await?;
        }
        Some(("verify-db", _)) => {
            commands::verify_db(&session, &mut out).await?;
        }
        Some(("agents", args)) => {
            let action = AgentAction::parse(args.get_one::<String>("action").map(String::as_str))?;
            commands::agents(&session, action, &mut out).await?;
        }
        Some(("distribute", _)) => {
            let binary = std::env::current_exe().context("locating this executable")?;
            commands::distribute(&session, &binary, &mut out).await?;
        }
        Some(("upgrade-agents", args)) => {
            let addresses: Vec<String> = args
                .get_many::<String>("addresses")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            commands::upgrade_agents(&session, &tools_arg(args)?, &addresses, &mut out).await?;
        }
        _ => anyhow::bail!("unknown command"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let matches = cli()
            .try_get_matches_from(["fleetmig", "upgrade-agents", "/tmp/t.tgz", "10.0.0.2", "--live", "-vv"])
            .unwrap();
        assert!(matches.get_flag("live"));
        assert_eq!(matches.get_count("verbose"), 2);
        let (_, args) = matches.subcommand().unwrap();
        let addresses: Vec<_> = args.get_many::<String>("addresses").unwrap().collect();
        assert_eq!(addresses, vec!["10.0.0.2"]);
    }

    #[test]
    fn upgrade_db_requires_tools() {
        assert!(cli().try_get_matches_from(["fleetmig", "upgrade-db"]).is_err());
    }
}
