//! `entry-sync` command line: simulated submissions and config inspection

use anyhow::{ensure, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use entry_sync::simulator::{run_scenario, BackendBehavior, ScenarioSpec};
use entry_sync::{MatchingMode, NotificationKind, SaveError, SyncConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("entry-sync")
        .version(entry_sync::VERSION)
        .about("Paged bulk save of entry figures")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Submit a randomized entry form against the in-memory backend")
                .arg(
                    Arg::new("figures")
                        .long("figures")
                        .default_value("12")
                        .value_parser(value_parser!(usize))
                        .help("New figures to add"),
                )
                .arg(
                    Arg::new("existing")
                        .long("existing")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Figures already saved on the server"),
                )
                .arg(
                    Arg::new("delete")
                        .long("delete")
                        .default_value("1")
                        .value_parser(value_parser!(usize))
                        .help("Existing figures to delete"),
                )
                .arg(
                    Arg::new("invalid-ratio")
                        .long("invalid-ratio")
                        .default_value("0.1")
                        .value_parser(value_parser!(f64))
                        .help("Share of figures left without a reported number"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("page-size")
                        .long("page-size")
                        .value_parser(value_parser!(usize))
                        .help("Requests per bulk call (overrides the config file)"),
                )
                .arg(
                    Arg::new("keyed")
                        .long("keyed")
                        .action(ArgAction::SetTrue)
                        .help("Match responses by echoed correlation keys"),
                )
                .arg(
                    Arg::new("fail-page")
                        .long("fail-page")
                        .value_parser(value_parser!(usize))
                        .help("Zero-based bulk call that fails at the transport level"),
                )
                .arg(
                    Arg::new("drop")
                        .long("drop")
                        .value_parser(value_parser!(usize))
                        .action(ArgAction::Append)
                        .help("Save position dropped from every page's response"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the summary as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file (defaults when omitted)"),
                ),
        )
}

fn load_config(path: Option<&PathBuf>) -> Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(SyncConfig::default()),
    }
}

fn required<T: Clone + Send + Sync + 'static>(args: &ArgMatches, name: &str) -> Result<T> {
    args.get_one::<T>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

fn invalid_ratio(args: &ArgMatches) -> Result<f64> {
    let ratio: f64 = required(args, "invalid-ratio")?;
    ensure!(
        ratio.is_finite() && (0.0..=1.0).contains(&ratio),
        "--invalid-ratio must be between 0 and 1, got {ratio}"
    );
    Ok(ratio)
}

async fn simulate(args: &ArgMatches) -> Result<bool> {
    let mut config = load_config(args.get_one::<PathBuf>("config"))?;
    if let Some(page_size) = args.get_one::<usize>("page-size") {
        config = config.with_page_size(*page_size);
    }
    if args.get_flag("keyed") {
        config = config.with_matching(MatchingMode::Keyed);
    }
    config.validate()?;

    let scenario = ScenarioSpec {
        figures: required(args, "figures")?,
        existing: required(args, "existing")?,
        delete: required(args, "delete")?,
        invalid_ratio: invalid_ratio(args)?,
        seed: required(args, "seed")?,
    };

    let mut behavior = BackendBehavior::default();
    if config.matching == MatchingMode::Keyed {
        behavior = behavior.echoing_keys();
    }
    if let Some(page) = args.get_one::<usize>("fail-page") {
        behavior = behavior.failing_bulk_call(*page);
    }
    if let Some(positions) = args.get_many::<usize>("drop") {
        behavior = behavior.dropping_saves(positions.copied());
    }

    let report = run_scenario(config, &scenario, behavior).await?;

    if args.get_flag("json") {
        let summary = match &report.outcome {
            Ok(summary) => Some(summary),
            Err(SaveError::PageTransport { partial, .. }) => Some(partial.as_ref()),
            Err(_) => None,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(report.succeeded());
    }

    println!("Notifications:");
    for notification in &report.notifications {
        let marker = match notification.kind {
            NotificationKind::Success => "+",
            NotificationKind::Error => "!",
            NotificationKind::Info => "-",
        };
        println!("  {marker} {}", notification.message);
    }
    println!();

    match &report.outcome {
        Ok(summary) => {
            println!("Entry {} saved", summary.entry_id);
            println!("  Pages sent: {}", summary.pages_sent);
            println!("  Requests sent: {}", summary.requests_sent);
            println!("  Saved: {} ({} new)", summary.counts.saved, summary.counts.created);
            println!("  Deleted: {}", summary.counts.deleted);
            println!("  Rejected: {}", summary.counts.errored);
            println!("  Skipped: {}", summary.counts.save_skipped + summary.counts.delete_skipped);
        }
        Err(e) => println!("Submission failed: {e}"),
    }
    println!();
    println!("Figures in form: {}", report.figures_in_form);
    println!("Figures with errors: {}", report.figures_with_errors);
    println!("Figures on server: {}", report.figures_on_server);
    println!("Bulk calls: {}", report.bulk_calls);
    println!("Cached organizations: {}", report.cached_organizations);

    Ok(report.succeeded())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let passed = simulate(args).await?;
            std::process::exit(if passed { 0 } else { 1 });
        }
        Some(("config", args)) => {
            let config = load_config(args.get_one::<PathBuf>("path"))?;
            print!("{}", config.to_toml_string()?);
        }
        _ => {}
    }
    Ok(())
}
