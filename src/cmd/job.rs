//! Inspection and single-operation commands on an existing job.
//!
//! These are the hooks external scripts call to report progress: each one
//! opens the job's state file, applies one store operation and exits.

use anyhow::{Context, Result, bail};
use console::style;
use serde_json::Value;

use conductor::config::{Config, JobLocation};
use conductor::orchestrator::archive::archive_job;
use conductor::orchestrator::{PhaseStatus, StateStore, WorkflowSummary};
use conductor::ui::icons::{ARCHIVE, CHECK, CROSS, FOLDER};

fn open_job(config: &Config, id: &str) -> Result<(JobLocation, StateStore)> {
    let location = config.require_job(id)?;
    let store = StateStore::open(location.state_file())?;
    Ok((location, store))
}

fn open_active_job(config: &Config, id: &str) -> Result<StateStore> {
    let (location, store) = open_job(config, id)?;
    if location.is_archived() {
        bail!("Job '{}' is archived; its state is read-only", id);
    }
    Ok(store)
}

fn status_label(status: &PhaseStatus) -> String {
    let label = status.as_str();
    match status {
        PhaseStatus::Complete => style(label).green().to_string(),
        PhaseStatus::InProgress => style(label).yellow().to_string(),
        PhaseStatus::Error => style(label).red().to_string(),
        PhaseStatus::Pending => style(label).dim().to_string(),
        PhaseStatus::Missing => style("(none)").magenta().to_string(),
        PhaseStatus::Unrecognized(_) => style(label).magenta().to_string(),
    }
}

pub fn cmd_status(config: &Config, id: Option<&str>, json: bool) -> Result<()> {
    let Some(id) = id else {
        return list_jobs(config, json);
    };

    let (location, store) = open_job(config, id)?;
    let summary = store.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("{} {}", FOLDER, style(&summary.id).bold());
    if !summary.subject.is_empty() {
        println!("Subject:  {}", summary.subject);
    }
    println!("Status:   {}", summary.status);
    println!(
        "Location: {}{}",
        location.dir().display(),
        if location.is_archived() { " (archived)" } else { "" }
    );
    println!("Elapsed:  {:.2}s", summary.elapsed_secs);
    println!();

    for (name, record) in &store.document().phases {
        let output = record
            .output
            .as_deref()
            .map(|o| format!(" {}", style(format!("→ {}", o)).dim()))
            .unwrap_or_default();
        println!("  {:<16} {}{}", name, status_label(&record.status), output);
        for (agent, status) in record.agents.iter().flatten() {
            println!("    agent    {:<14} {}", agent, status_label(status));
        }
        for (subphase, status) in record.subphases.iter().flatten() {
            println!("    subphase {:<14} {}", subphase, status_label(status));
        }
    }

    if !store.metrics().is_empty() {
        println!();
        println!("Metrics:");
        for (name, value) in store.metrics() {
            println!("  {} = {}", name, value);
        }
    }

    if let Some(last) = store.last_error() {
        println!();
        println!(
            "Errors:   {} (last in '{}': {})",
            summary.error_count,
            last.phase,
            last.error.summary()
        );
    }
    println!();
    Ok(())
}

fn list_jobs(config: &Config, json: bool) -> Result<()> {
    let mut summaries: Vec<(bool, WorkflowSummary)> = Vec::new();
    for (archived, ids) in [
        (false, config.active_jobs()?),
        (true, config.archived_jobs()?),
    ] {
        for id in ids {
            let location = if archived {
                JobLocation::Archived(config.archive_dir.join(&id))
            } else {
                JobLocation::Active(config.job_dir(&id))
            };
            match StateStore::open(location.state_file()) {
                Ok(store) => summaries.push((archived, store.summary())),
                Err(e) => tracing::warn!(id = %id, error = %e, "Skipping unreadable job"),
            }
        }
    }

    if json {
        let jobs: Vec<&WorkflowSummary> = summaries.iter().map(|(_, s)| s).collect();
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No jobs under {}", config.root.display());
        return Ok(());
    }

    println!();
    println!("{:<32} {:<10} {:<16} Subject", "Job", "Where", "Status");
    println!("{:<32} {:<10} {:<16} -------", "---", "-----", "------");
    for (archived, summary) in &summaries {
        println!(
            "{:<32} {:<10} {:<16} {}",
            summary.id,
            if *archived { "archive" } else { "active" },
            summary.status,
            summary.subject
        );
    }
    println!();
    Ok(())
}

pub fn cmd_validate(config: &Config, id: &str) -> Result<()> {
    let (_, store) = open_job(config, id)?;
    let violations = store.validate();

    if violations.is_empty() {
        println!("{} {} is valid", CHECK, id);
        return Ok(());
    }

    println!("{} {} has {} problem(s):", CROSS, id, violations.len());
    for violation in &violations {
        println!("  - {}", violation);
    }
    bail!("Validation failed for '{}'", id)
}

pub fn cmd_phase(
    config: &Config,
    id: &str,
    phase: &str,
    status: PhaseStatus,
    output: Option<&str>,
    add: bool,
) -> Result<()> {
    let mut store = open_active_job(config, id)?;
    if add && store.add_phase(phase, output)? {
        println!("Added phase '{}'", phase);
    }
    store.transition_phase(phase, status.clone(), output)?;
    println!("{} {} → {}", id, phase, status_label(&status));
    Ok(())
}

pub fn cmd_agent(config: &Config, id: &str, phase: &str, agent: &str, status: PhaseStatus) -> Result<()> {
    let mut store = open_active_job(config, id)?;
    store.record_agent_status(phase, agent, status.clone())?;
    let all_done = store.all_agents_complete(phase)?;
    println!(
        "{} {} agent {} → {}{}",
        id,
        phase,
        agent,
        status_label(&status),
        if all_done { " (all agents complete)" } else { "" }
    );
    Ok(())
}

pub fn cmd_subphase(
    config: &Config,
    id: &str,
    phase: &str,
    subphase: &str,
    status: PhaseStatus,
) -> Result<()> {
    let mut store = open_active_job(config, id)?;
    store.record_subphase_status(phase, subphase, status.clone())?;
    println!("{} {} subphase {} → {}", id, phase, subphase, status_label(&status));
    Ok(())
}

/// Parse a metric value: JSON when it parses (numbers, booleans, objects), else a string.
pub fn parse_metric_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn cmd_metric(config: &Config, id: &str, name: &str, value: &str, increment: bool) -> Result<()> {
    let mut store = open_active_job(config, id)?;
    if increment {
        let by: i64 = value
            .parse()
            .map_err(|_| anyhow::anyhow!("Increment must be an integer, got '{}'", value))?;
        let total = store.increment_metric(name, by)?;
        println!("{} {} = {}", id, name, total);
    } else {
        let value = parse_metric_value(value);
        store.set_metric(name, value.clone())?;
        println!("{} {} = {}", id, name, value);
    }
    Ok(())
}

pub fn cmd_platform(config: &Config, id: &str, platform: &str, data: &str) -> Result<()> {
    let data: Value = serde_json::from_str(data)
        .with_context(|| format!("Platform data for '{}' is not valid JSON", platform))?;
    let mut store = open_active_job(config, id)?;
    store.set_platform_data(platform, data)?;
    println!("{} {} platform data updated for {}", CHECK, id, platform);
    Ok(())
}

pub fn cmd_error(config: &Config, id: &str, phase: &str, message: &str) -> Result<()> {
    let mut store = open_active_job(config, id)?;
    store.log_error(phase, message)?;
    println!("{} Logged error #{} for {} {}", CROSS, store.errors().len(), id, phase);
    Ok(())
}

pub fn cmd_complete(config: &Config, id: &str, archive: bool) -> Result<()> {
    let mut store = open_active_job(config, id)?;
    store.complete_workflow()?;
    println!("{} {} complete", CHECK, id);

    if archive {
        let destination = archive_job(store.job_dir(), &config.archive_dir, id)?;
        println!("{} Archived to {}", ARCHIVE, destination.display());
    }
    Ok(())
}
