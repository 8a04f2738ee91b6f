//! Command dispatch.
//!
//! Each handler calls one engine operation, renders the result and returns the
//! process exit code. Engine errors propagate to `main`, which maps them onto
//! exit codes.

use crate::output;
use crate::{Command, GenerateArgs, LifecycleCommand};
use anyhow::Result;
use invgen_core::{
    CleanupOptions, DecommissionRequest, GenerateOptions, InventoryConfig, InventoryEngine,
    InvgenError,
};
use tracing::{info, warn};

/// Exit code for a user-correctable problem.
const EXIT_USER_ERROR: u8 = 1;
/// Exit code for an unexpected failure.
const EXIT_INTERNAL_ERROR: u8 = 3;

pub fn run(config: InventoryConfig, command: &Command) -> Result<u8> {
    info!("Using source {}", config.source_file.display());
    let engine = InventoryEngine::new(config)?;

    match command {
        Command::Generate(args) => generate(&engine, args),
        Command::Validate { json } => validate(&engine, *json),
        Command::Health { json, threshold } => health(&engine, *json, *threshold),
        Command::Lifecycle(lifecycle) => run_lifecycle(&engine, lifecycle),
    }
}

fn generate(engine: &InventoryEngine, args: &GenerateArgs) -> Result<u8> {
    let options = GenerateOptions {
        environments: args.environments.clone(),
        inventory_dir: args.output_dir.clone(),
        host_vars_dir: args.host_vars_dir.clone(),
        dry_run: args.dry_run,
    };

    match engine.generate(&options) {
        Ok(report) => {
            output::generate_report(&report, args.json)?;
            Ok(0)
        }
        Err(InvgenError::Validation { file, report }) => {
            warn!("Nothing written: {} failed validation", file.display());
            output::validation_report(&report, args.json)?;
            Ok(EXIT_USER_ERROR)
        }
        Err(e) => Err(e.into()),
    }
}

fn validate(engine: &InventoryEngine, json: bool) -> Result<u8> {
    let outcome = engine.validate()?;
    output::validation_report(&outcome.report, json)?;
    Ok(if outcome.report.is_valid() {
        0
    } else {
        EXIT_USER_ERROR
    })
}

fn health(engine: &InventoryEngine, json: bool, threshold: Option<f64>) -> Result<u8> {
    let report = engine.health()?;
    output::health_report(&report, json)?;
    if let Some(threshold) = threshold {
        if report.is_below(threshold) {
            warn!(
                "Health score {} is below the threshold of {}",
                report.score, threshold
            );
        }
    }
    Ok(0)
}

fn run_lifecycle(engine: &InventoryEngine, command: &LifecycleCommand) -> Result<u8> {
    match command {
        LifecycleCommand::MarkDecommission {
            hosts,
            date,
            reason,
            dry_run,
            json,
        } => {
            let request = DecommissionRequest {
                keys: hosts.clone(),
                date: *date,
                reason: reason.clone(),
                dry_run: *dry_run,
            };
            let report = engine.mark_decommission(&request)?;
            output::decommission_report(&report, *json)?;
            Ok(if report.failures().next().is_some() {
                EXIT_USER_ERROR
            } else {
                0
            })
        }
        LifecycleCommand::ListExpired { grace_days, json } => {
            let expired = engine.list_expired(*grace_days)?;
            output::expired_hosts(&expired, *grace_days, *json)?;
            Ok(0)
        }
        LifecycleCommand::Cleanup {
            grace_days,
            max_hosts,
            dry_run,
            json,
        } => {
            let options = CleanupOptions {
                dry_run: *dry_run,
                grace_override: *grace_days,
                max_hosts: *max_hosts,
            };
            let report = engine.cleanup(&options)?;
            output::cleanup_report(&report, *json)?;
            Ok(if report.errors.is_empty() {
                0
            } else {
                EXIT_INTERNAL_ERROR
            })
        }
    }
}
