//! `celims` operator command line

use anyhow::{bail, Context, Result};
use celims_store::repo::audit::ChainReport;
use celims_workflow::{Lab, LabConfig};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("celims")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Civil engineering laboratory workflow tracker")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("database")
                .long("db")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Database file (overrides the configuration)"),
        )
        .subcommand(
            Command::new("init")
                .about("Create the database and seed reference data")
                .arg(
                    Arg::new("no-seed")
                        .long("no-seed")
                        .action(ArgAction::SetTrue)
                        .help("Create tables only"),
                ),
        )
        .subcommand(
            Command::new("calc")
                .about("Run a calculator without touching the database")
                .arg(
                    Arg::new("standard")
                        .long("standard")
                        .required(true)
                        .help("Standard code, e.g. \"ASTM C39\""),
                )
                .arg(
                    Arg::new("input")
                        .long("input")
                        .required(true)
                        .help("Inputs as a JSON object"),
                ),
        )
        .subcommand(
            Command::new("audit")
                .about("Show audit rows")
                .arg(Arg::new("table").long("table").requires("record").help("Table name"))
                .arg(
                    Arg::new("record")
                        .long("record")
                        .value_parser(value_parser!(i64))
                        .help("Record id"),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .default_value("20")
                        .value_parser(value_parser!(u32))
                        .help("Most recent rows to show when no record is given"),
                ),
        )
        .subcommand(Command::new("verify-audit").about("Verify the audit hash chain"))
        .subcommand(
            Command::new("status")
                .about("Laboratory summary")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<LabConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => LabConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LabConfig::default(),
    };
    if let Some(path) = matches.get_one::<PathBuf>("database") {
        config = config.with_database_path(path.clone());
    }
    Ok(config)
}

fn init_tracing(config: &LabConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_lab(config: &LabConfig) -> Result<Lab> {
    if config.database.path.is_none() {
        bail!("no database configured; pass --db or set database.path");
    }
    Lab::open(config).context("opening database")
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    init_tracing(&config);
    tracing::debug!(?config, "configuration loaded");

    match matches.subcommand() {
        Some(("init", args)) => {
            let config = config
                .clone()
                .with_seed_reference_data(!args.get_flag("no-seed"));
            let lab = open_lab(&config)?;
            let stats = lab.stats()?;
            println!(
                "Database ready: {} active projects",
                stats.active_projects
            );
        }
        Some(("calc", args)) => {
            let standard = args
                .get_one::<String>("standard")
                .map(String::as_str)
                .unwrap_or_default();
            let raw = args
                .get_one::<String>("input")
                .map(String::as_str)
                .unwrap_or_default();
            let input: celims_calc::Input =
                serde_json::from_str(raw).context("--input must be a JSON object")?;
            let output = celims_calc::compute_map(standard, &input);
            println!("{}", serde_json::to_string_pretty(&output)?);
            if output.contains_key("error") {
                std::process::exit(2);
            }
        }
        Some(("audit", args)) => {
            let lab = open_lab(&config)?;
            let entries = match (
                args.get_one::<String>("table"),
                args.get_one::<i64>("record"),
            ) {
                (Some(table), Some(record)) => lab.audit_trail(table, *record)?,
                _ => lab.recent_audit(args.get_one::<u32>("limit").copied().unwrap_or(20))?,
            };
            for entry in entries {
                println!(
                    "#{:<6} {} {:<7} {}:{} by user {} {}",
                    entry.id,
                    entry.changed_at.format("%F %T"),
                    entry.action,
                    entry.table_name,
                    entry.record_id,
                    entry.changed_by,
                    entry
                        .new_values
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                );
            }
        }
        Some(("verify-audit", _)) => {
            let lab = open_lab(&config)?;
            match lab.verify_audit()? {
                ChainReport::Intact { entries, head } => {
                    println!("Audit chain intact: {entries} entries, head {head}");
                }
                ChainReport::Broken { at, reason } => {
                    println!("Audit chain BROKEN at entry {at}: {reason}");
                    std::process::exit(1);
                }
            }
        }
        Some(("status", args)) => {
            let lab = open_lab(&config)?;
            let stats = lab.stats()?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Active projects:        {}", stats.active_projects);
                println!("Samples:                {}", stats.live_samples);
                println!("Awaiting assignment:    {}", stats.samples_awaiting_tests);
                println!("Open assignments:       {}", stats.open_assignments);
                println!("Results to approve:     {}", stats.pending_approvals);
                println!("Audit entries:          {}", stats.audit_entries);
            }
        }
        _ => unreachable!("subcommand_required is set"),
    }
    Ok(())
}
