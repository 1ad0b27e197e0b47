use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use conductor::config::Config;
use conductor::logging::init_logging;
use conductor::orchestrator::PhaseStatus;

mod cmd;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Phase-tracking workflow runner with durable JSON state")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Job root (defaults to <project-dir>/.conductor)
    #[arg(long, global = true, env = "CONDUCTOR_ROOT")]
    pub root: Option<PathBuf>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the job root and a default conductor.toml
    Init,
    /// Create a job from a template and run it
    Start {
        /// Template name (see `conductor templates`)
        template: String,

        /// What the job is about; available to templates as {subject}
        #[arg(short, long)]
        subject: String,

        /// Template variable as key=value (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Attempts per phase. Overrides conductor.toml
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Seconds between attempts. Overrides conductor.toml
        #[arg(long)]
        retry_delay: Option<u64>,

        /// Keep the finished job in active/
        #[arg(long)]
        no_archive: bool,
    },
    /// Re-run an unfinished job from its first incomplete phase
    Resume {
        id: String,

        #[arg(long)]
        max_attempts: Option<u32>,

        #[arg(long)]
        retry_delay: Option<u64>,

        #[arg(long)]
        no_archive: bool,
    },
    /// Show a job, or list all jobs
    Status {
        id: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check a job's state file for consistency
    Validate { id: String },
    /// Set a phase's status
    Phase {
        id: String,
        phase: String,
        status: PhaseStatus,

        /// Artifact path, relative to the job directory
        #[arg(long)]
        output: Option<String>,

        /// Append the phase if the job does not declare it
        #[arg(long)]
        add: bool,
    },
    /// Record the status of an agent working under a phase
    Agent {
        id: String,
        phase: String,
        agent: String,
        status: PhaseStatus,
    },
    /// Record the status of a subphase
    Subphase {
        id: String,
        phase: String,
        name: String,
        status: PhaseStatus,
    },
    /// Set or increment a metric
    Metric {
        id: String,
        name: String,
        #[arg(allow_hyphen_values = true)]
        value: String,

        /// Add an integer to the current value
        #[arg(long)]
        increment: bool,
    },
    /// Store a platform's payload under metadata.platformsData
    Platform {
        id: String,
        platform: String,
        /// JSON payload, e.g. '{"issues": 3}'
        data: String,
    },
    /// Append an entry to a job's error log
    Error {
        id: String,
        phase: String,
        message: String,
    },
    /// Mark a job complete
    Complete {
        id: String,

        /// Move the job to archive/ afterwards
        #[arg(long)]
        archive: bool,
    },
    /// List available workflow templates
    Templates,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default conductor.toml file
    Init,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = Config::new(project_dir, cli.root.clone(), cli.verbose)?;
    let _logging = init_logging(&config)?;

    match cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Start {
            template,
            subject,
            vars,
            max_attempts,
            retry_delay,
            no_archive,
        } => {
            let config = config.with_overrides(max_attempts, retry_delay, no_archive);
            cmd::cmd_start(&config, &template, &subject, &vars)?;
        }
        Commands::Resume {
            id,
            max_attempts,
            retry_delay,
            no_archive,
        } => {
            let config = config.with_overrides(max_attempts, retry_delay, no_archive);
            cmd::cmd_resume(&config, &id)?;
        }
        Commands::Status { id, json } => cmd::cmd_status(&config, id.as_deref(), json)?,
        Commands::Validate { id } => cmd::cmd_validate(&config, &id)?,
        Commands::Phase {
            id,
            phase,
            status,
            output,
            add,
        } => cmd::cmd_phase(&config, &id, &phase, status, output.as_deref(), add)?,
        Commands::Agent {
            id,
            phase,
            agent,
            status,
        } => cmd::cmd_agent(&config, &id, &phase, &agent, status)?,
        Commands::Subphase {
            id,
            phase,
            name,
            status,
        } => cmd::cmd_subphase(&config, &id, &phase, &name, status)?,
        Commands::Metric {
            id,
            name,
            value,
            increment,
        } => cmd::cmd_metric(&config, &id, &name, &value, increment)?,
        Commands::Platform { id, platform, data } => {
            cmd::cmd_platform(&config, &id, &platform, &data)?
        }
        Commands::Error { id, phase, message } => cmd::cmd_error(&config, &id, &phase, &message)?,
        Commands::Complete { id, archive } => cmd::cmd_complete(&config, &id, archive)?,
        Commands::Templates => cmd::cmd_templates(&config)?,
        Commands::Config { command } => cmd::cmd_config(&config, command)?,
    }

    Ok(())
}
