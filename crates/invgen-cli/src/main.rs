//! Invgen CLI - command-line front end for the inventory engine.
//!
//! This binary parses arguments, loads configuration and hands each command to
//! `invgen-core`. Logs go to stderr so `--json` output on stdout stays
//! machine-readable.

mod commands;
mod output;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use invgen_core::{InventoryConfig, InvgenError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, Level};
use tracing_subscriber::FmtSubscriber;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "invgen.yml";

#[derive(Parser, Debug)]
#[command(name = "invgen")]
#[command(version, about = "Generate and maintain an Ansible inventory from a CSV host registry")]
struct Args {
    /// Configuration file (defaults to ./invgen.yml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Source CSV file, overriding configuration and environment
    #[arg(short, long, global = true)]
    source: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the source and write inventory and host_vars files
    Generate(GenerateArgs),
    /// Validate the source and report every problem
    Validate {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Score the health of the source and generated files
    Health {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Warn when the score falls below this value
        #[arg(long, value_parser = clap::value_parser!(f64))]
        threshold: Option<f64>,
    },
    /// Decommission and clean up hosts
    #[command(subcommand)]
    Lifecycle(LifecycleCommand),
}

#[derive(ClapArgs, Debug)]
struct GenerateArgs {
    /// Only generate these environments (repeatable)
    #[arg(short, long = "env")]
    environments: Vec<String>,

    /// Directory for environment inventory files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Directory for host_vars files
    #[arg(long)]
    host_vars_dir: Option<PathBuf>,

    /// Show planned changes without writing
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum LifecycleCommand {
    /// Mark active hosts as decommissioned
    MarkDecommission {
        /// Host key to decommission (repeatable)
        #[arg(long = "host", required = true)]
        hosts: Vec<String>,

        /// Decommission date (YYYY-MM-DD), today or later
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,

        /// Free-text reason, logged with the change
        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },
    /// List decommissioned hosts past their grace period
    ListExpired {
        /// Use this grace period for every environment
        #[arg(long)]
        grace_days: Option<u32>,

        #[arg(long)]
        json: bool,
    },
    /// Remove expired hosts and orphaned host_vars files
    Cleanup {
        /// Use this grace period for every environment
        #[arg(long)]
        grace_days: Option<u32>,

        /// Remove at most this many expired hosts
        #[arg(long)]
        max_hosts: Option<usize>,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}': {} (expected YYYY-MM-DD)", value, e))
}

/// Resolve configuration: explicit file, then `./invgen.yml`, then defaults.
fn load_config(args: &Args) -> Result<InventoryConfig> {
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let config = match &args.config {
        Some(path) => InventoryConfig::load(path)?,
        None => {
            let candidate = cwd.join(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                InventoryConfig::load(&candidate)?
            } else {
                debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                InventoryConfig::default().with_base_dir(&cwd)
            }
        }
    };

    let mut config = config.with_env_overrides()?;
    if let Some(source) = &args.source {
        config.source_file = absolute(&cwd, source);
    }
    Ok(config)
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        cwd.join(path)
    } else {
        path.to_path_buf()
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<InvgenError>()
        .map(|e| e.exit_code())
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(3)
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let result = load_config(&args).and_then(|config| commands::run(config, &args.command));
    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2026-01-31"),
            Ok(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap())
        );
        assert!(parse_date("31/01/2026").is_err());
    }

    #[test]
    fn test_args_parse_generate() {
        let args = Args::try_parse_from([
            "invgen", "generate", "--env", "production", "--env", "test", "--dry-run",
        ])
        .unwrap();
        match args.command {
            Command::Generate(generate) => {
                assert_eq!(generate.environments, vec!["production", "test"]);
                assert!(generate.dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_args_parse_lifecycle() {
        let args = Args::try_parse_from([
            "invgen",
            "lifecycle",
            "mark-decommission",
            "--host",
            "web01",
            "--host",
            "web02",
            "--date",
            "2030-01-01",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Lifecycle(LifecycleCommand::MarkDecommission { ref hosts, .. }) if hosts.len() == 2
        ));

        assert!(Args::try_parse_from(["invgen", "lifecycle", "mark-decommission", "--date", "2030-01-01"]).is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        let err = anyhow::Error::new(InvgenError::FileNotFound(PathBuf::from("hosts.csv")));
        assert_eq!(exit_code_for(&err), 2);
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&err), 3);
    }
}
