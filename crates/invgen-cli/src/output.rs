//! Human-readable and JSON rendering of engine reports.

use anyhow::Result;
use invgen_core::writer::WriteAction;
use invgen_core::{
    CleanupReport, DecommissionReport, ExpiredHost, GenerateReport, HealthReport,
    ValidationReport,
};
use serde::Serialize;
use serde_json::json;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn dry_run_prefix(dry_run: bool) -> &'static str {
    if dry_run {
        "[DRY RUN] "
    } else {
        ""
    }
}

pub fn validation_report(report: &ValidationReport, json: bool) -> Result<()> {
    if json {
        return print_json(&json!({
            "valid": report.is_valid(),
            "summary": report.summary(),
            "report": report,
        }));
    }

    for issue in &report.errors {
        println!("ERROR   {}", issue);
    }
    for issue in &report.warnings {
        println!("WARNING {}", issue);
    }
    if report.is_valid() {
        println!(
            "Source is valid: {} record(s), {} warning(s)",
            report.valid_rows,
            report.warnings.len()
        );
    } else {
        println!("Source is invalid: {}", report.summary());
    }
    Ok(())
}

pub fn generate_report(report: &GenerateReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    let prefix = dry_run_prefix(report.dry_run);
    for entry in report.plan.changes() {
        let verb = match entry.action {
            WriteAction::Create => "create",
            WriteAction::Update => "update",
            WriteAction::Delete => "delete",
            WriteAction::Unchanged => continue,
        };
        println!("{}{:<7} {}", prefix, verb, entry.path.display());
    }
    for (env, stats) in &report.environments {
        println!(
            "{}: {} host(s), {} application, {} product, {} site, {} dashboard, {} batch group(s)",
            env,
            stats.hosts,
            stats.application_groups,
            stats.product_groups,
            stats.site_groups,
            stats.dashboard_groups,
            stats.batch_groups
        );
    }
    let counts = report.counts;
    println!(
        "{}{} created, {} updated, {} deleted, {} unchanged",
        prefix, counts.created, counts.updated, counts.deleted, counts.unchanged
    );
    Ok(())
}

pub fn health_report(report: &HealthReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    println!("Health score: {:.1} ({})", report.score, report.band);
    for factor in &report.factors {
        println!(
            "  {:<32} {:>5.1}% x {:.2} = {:>5.1}",
            factor.kind.label(),
            factor.value * 100.0,
            factor.weight,
            factor.contribution()
        );
    }
    if !report.deficiencies.is_empty() {
        println!("Deficiencies:");
        for deficiency in &report.deficiencies {
            println!("  - {}", deficiency.message);
            if !deficiency.examples.is_empty() {
                println!("    e.g. {}", deficiency.examples.join(", "));
            }
        }
    }
    if !report.recommendations.is_empty() {
        println!("Recommendations:");
        for recommendation in &report.recommendations {
            println!("  - {}", recommendation);
        }
    }
    Ok(())
}

pub fn decommission_report(report: &DecommissionReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    let prefix = dry_run_prefix(report.dry_run);
    for result in &report.results {
        match &result.error {
            None => println!(
                "{}{} decommissioned as of {} ({})",
                prefix,
                result.key,
                report.date,
                result.environments.join(", ")
            ),
            Some(error) => println!("FAILED  {}: {}", result.key, error),
        }
    }
    if !report.reason.is_empty() {
        println!("Reason: {}", report.reason);
    }
    Ok(())
}

pub fn expired_hosts(hosts: &[ExpiredHost], grace_override: Option<u32>, json: bool) -> Result<()> {
    if json {
        return print_json(&json!({
            "grace_days_override": grace_override,
            "count": hosts.len(),
            "hosts": hosts,
        }));
    }

    if let Some(days) = grace_override {
        println!("Grace period override: {} days", days);
    }
    if hosts.is_empty() {
        println!("No expired hosts");
        return Ok(());
    }
    for host in hosts {
        println!(
            "{} ({}) decommissioned {}, expired {} day(s) ago (grace {} days){}",
            host.key,
            host.environment,
            host.decommission_date,
            host.days_expired,
            host.grace_days,
            if host.host_vars_present {
                ""
            } else {
                ", no host_vars file"
            }
        );
    }
    println!("{} expired host(s)", hosts.len());
    Ok(())
}

pub fn cleanup_report(report: &CleanupReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    let prefix = dry_run_prefix(report.dry_run);
    for host in &report.removed_hosts {
        println!(
            "{}remove host {} ({}), expired {} day(s) ago",
            prefix, host.key, host.environment, host.days_expired
        );
    }
    for path in &report.deleted_host_vars {
        println!("{}delete {}", prefix, path.display());
    }
    for path in &report.orphaned_files {
        println!("{}delete orphan {}", prefix, path.display());
    }
    if !report.deferred_hosts.is_empty() {
        println!(
            "{} expired host(s) deferred by --max-hosts",
            report.deferred_hosts.len()
        );
    }
    for error in &report.errors {
        println!("ERROR   {}", error);
    }
    println!(
        "{}{} host(s) and {} orphaned file(s) removed",
        prefix,
        report.removed_hosts.len(),
        report.orphaned_files.len()
    );
    Ok(())
}
