//! Job execution commands: `start` and `resume`.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use console::style;

use conductor::config::Config;
use conductor::orchestrator::{
    PhaseRunner, PhaseStep, RunOutcome, StateStore, complete_and_archive, generate_workflow_id,
};
use conductor::phase::{TemplateRegistry, Variables, parse_variables};
use conductor::ui::RunUI;
use conductor::ui::icons::{ARCHIVE, CROSS, SPARKLE};

pub fn cmd_start(config: &Config, template_name: &str, subject: &str, vars: &[String]) -> Result<()> {
    config.ensure_directories()?;

    let registry = TemplateRegistry::load(&config.workflows_dir)?;
    let template = registry.require(template_name)?;
    let problems = template.validate();
    if !problems.is_empty() {
        bail!(
            "Template '{}' is invalid:\n  - {}",
            template.name,
            problems.join("\n  - ")
        );
    }

    let overrides = parse_variables(vars)?;
    let vars = template.resolve_variables(subject, &overrides);
    let problems = template.check_variables(&vars);
    if !problems.is_empty() {
        bail!(
            "Invalid input for template '{}':\n  - {}",
            template.name,
            problems.join("\n  - ")
        );
    }

    let id = generate_workflow_id(&template.id_prefix, Utc::now());
    if let Some(existing) = config.locate_job(&id) {
        bail!(
            "Job '{}' already exists at {}",
            id,
            existing.dir().display()
        );
    }

    let defaults = template.defaults(subject, &vars).with_id(id.clone());
    let store = StateStore::load_or_initialize(config.state_file(&id), &defaults)
        .with_context(|| format!("Failed to create job '{}'", id))?;
    tracing::info!(id = %id, template = %template.name, "Job created");

    run_job(config, store, &template.name, &template.steps(&vars))
}

pub fn cmd_resume(config: &Config, id: &str) -> Result<()> {
    let location = config.require_job(id)?;
    if location.is_archived() {
        bail!("Job '{}' is archived and cannot be resumed", id);
    }

    let store = StateStore::open(location.state_file())?;
    if store.document().is_complete() {
        println!("{} Job '{}' is already complete", SPARKLE, id);
        return Ok(());
    }

    let template_name = store
        .document()
        .extra
        .get("template")
        .and_then(|v| v.as_str())
        .with_context(|| format!("Job '{}' does not record the template it was started from", id))?
        .to_string();
    let vars: Variables = store
        .document()
        .extra
        .get("variables")
        .and_then(|v| v.as_object())
        .map(|vars| {
            vars.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let registry = TemplateRegistry::load(&config.workflows_dir)?;
    let template = registry.require(&template_name)?;
    let steps = template.steps(&vars);

    run_job(config, store, &template_name, &steps)
}

fn run_job(config: &Config, mut store: StateStore, template: &str, steps: &[PhaseStep]) -> Result<()> {
    let ui = RunUI::new(steps.len() as u64, config.verbose);
    ui.print_header(store.id(), template, &store.document().subject);

    let collaborators = config.collaborators();
    let runner = PhaseRunner::new(&collaborators)
        .with_policy(config.retry_policy())
        .with_observer(&ui);

    let report = runner.run(&mut store, steps);
    ui.finish();
    let report = report?;

    match report.outcome {
        RunOutcome::Completed => {
            let id = store.id().to_string();
            if config.archive_on_success() {
                let destination = complete_and_archive(store, &config.archive_dir)?;
                println!("{} Archived to {}", ARCHIVE, destination.display());
            } else {
                store.complete_workflow()?;
            }
            println!(
                "{} {} complete ({} run, {} skipped)",
                SPARKLE,
                style(&id).green().bold(),
                report.completed.len(),
                report.skipped.len()
            );
            Ok(())
        }
        RunOutcome::Failed {
            phase,
            attempts,
            last_error,
        } => {
            eprintln!(
                "{} {} stopped at phase '{}'",
                CROSS,
                style(store.id()).red().bold(),
                phase
            );
            if let Some(entry) = &last_error {
                eprintln!(
                    "  {} {}",
                    style(&entry.timestamp).dim(),
                    entry.error.summary()
                );
            }
            eprintln!("  State kept at {}", store.path().display());
            bail!("Phase '{}' failed after {} attempt(s)", phase, attempts)
        }
    }
}
