//! `dirmigrate` entry point.
//!
//! Loads the migration file, connects to both directories, runs the selected strategies and
//! prints the Created/Skipped/Failed tally.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dirmigrate_core::config::MigrationConfig;
use dirmigrate_engine::{MigrationReport, Migrator, StrategyRegistry};
use dirmigrate_ldap::{LdapConfig, LdapDirectory};

/// Copy users and groups from one LDAP directory into another.
#[derive(Parser, Debug)]
#[command(name = "dirmigrate", version, about)]
struct Args {
    /// Path to the TOML migration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Strategy to run; repeat for several. Defaults to `[migration] kinds`, then to all.
    #[arg(short, long = "kind", value_name = "NAME")]
    kinds: Vec<String>,

    /// Entries created concurrently (overrides `[migration] concurrency`).
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=64))]
    concurrency: Option<u16>,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// List the configured strategies and exit.
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = MigrationConfig::load_from_file(&args.config)
        .context("failed to load migration configuration")?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    info!(path = %args.config.display(), "loaded migration configuration");

    let registry =
        StrategyRegistry::from_config(&config).context("failed to build migration strategies")?;
    if args.list {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let requested = if args.kinds.is_empty() {
        &config.migration.kinds
    } else {
        &args.kinds
    };
    let strategies = registry
        .select(requested)
        .context("unknown strategy requested")?;

    let concurrency = args
        .concurrency
        .map_or(config.migration.concurrency, usize::from);

    info!(
        source = %config.source.url(),
        target = %config.target.url(),
        kinds = ?strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
        concurrency,
        "dirmigrate v{}",
        env!("CARGO_PKG_VERSION")
    );

    let source = LdapDirectory::new(
        LdapConfig::from_settings("source", &config.source)
            .context("invalid [source] connection settings")?,
    );
    let target = LdapDirectory::new(
        LdapConfig::from_settings("target", &config.target)
            .context("invalid [target] connection settings")?,
    );

    let report = Migrator::new(Arc::new(source), Arc::new(target))
        .with_concurrency(concurrency)
        .run(strategies)
        .await
        .context("migration run failed")?;

    if args.json {
        println!("{}", report.to_json().context("failed to render report")?);
    } else {
        print_report(&report);
    }

    if report.is_clean() {
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(err) = &report.release_error {
        warn!(error = %err, "directories were not released cleanly");
    }
    let failed = report.summary().failed;
    if failed > 0 {
        warn!(failed, "some entries were not migrated");
    }
    Ok(ExitCode::FAILURE)
}

fn print_report(report: &MigrationReport) {
    for kind in &report.kinds {
        println!("[{}] {}", kind.kind, kind.summary);
        for outcome in kind.outcomes.iter().filter(|outcome| !outcome.is_created()) {
            println!("  {outcome}");
        }
    }
    let elapsed = report.finished_at - report.started_at;
    println!(
        "total: {} in {} ms",
        report.summary(),
        elapsed.num_milliseconds()
    );
    if let Some(err) = &report.release_error {
        println!("release failed: {err}");
    }
}
