use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::conductor_config::{CONFIG_FILE_NAME, ConductorToml};
use crate::orchestrator::collaborator::CommandCollaborator;
use crate::orchestrator::runner::RetryPolicy;

/// Default job root, relative to the project directory.
pub const DEFAULT_ROOT_DIR: &str = ".conductor";

/// File name of the workflow document inside a job directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Where a job currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobLocation {
    Active(PathBuf),
    Archived(PathBuf),
}

impl JobLocation {
    pub fn dir(&self) -> &Path {
        match self {
            JobLocation::Active(dir) | JobLocation::Archived(dir) => dir,
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.dir().join(STATE_FILE_NAME)
    }

    pub fn is_archived(&self) -> bool {
        matches!(self, JobLocation::Archived(_))
    }
}

/// Runtime configuration for conductor.
///
/// Resolves the job root layout and holds the effective settings after
/// layering `conductor.toml`, environment variables and CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub root: PathBuf,
    pub active_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub workflows_dir: PathBuf,
    pub log_dir: PathBuf,
    pub verbose: bool,
    /// Effective file settings (environment overrides already applied)
    pub settings: ConductorToml,
}

impl Config {
    /// Create a Config reading overrides from the process environment.
    pub fn new(project_dir: PathBuf, root: Option<PathBuf>, verbose: bool) -> Result<Self> {
        Self::with_env(project_dir, root, verbose, |key| std::env::var(key).ok())
    }

    /// Create a Config with an explicit environment lookup.
    pub fn with_env<F>(
        project_dir: PathBuf,
        root: Option<PathBuf>,
        verbose: bool,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        let root = match root {
            Some(root) if root.is_absolute() => root,
            Some(root) => project_dir.join(root),
            None => project_dir.join(DEFAULT_ROOT_DIR),
        };

        let mut settings = ConductorToml::load_or_default(&root)?;
        settings.apply_env(lookup)?;

        Ok(Self {
            active_dir: root.join("active"),
            archive_dir: root.join("archive"),
            workflows_dir: root.join("workflows"),
            log_dir: root.join("logs"),
            project_dir,
            root,
            verbose,
            settings,
        })
    }

    /// Apply CLI overrides on top of file and environment settings.
    pub fn with_overrides(
        mut self,
        max_attempts: Option<u32>,
        retry_delay_secs: Option<u64>,
        no_archive: bool,
    ) -> Self {
        if let Some(max_attempts) = max_attempts {
            self.settings.defaults.max_attempts = max_attempts;
        }
        if let Some(delay) = retry_delay_secs {
            self.settings.defaults.retry_delay_secs = delay;
        }
        if no_archive {
            self.settings.defaults.archive_on_success = false;
        }
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.settings.retry_policy()
    }

    pub fn archive_on_success(&self) -> bool {
        self.settings.defaults.archive_on_success
    }

    pub fn collaborators(&self) -> CommandCollaborator {
        self.settings.command_collaborator()
    }

    pub fn job_dir(&self, id: &str) -> PathBuf {
        self.active_dir.join(id)
    }

    pub fn state_file(&self, id: &str) -> PathBuf {
        self.job_dir(id).join(STATE_FILE_NAME)
    }

    /// Find a job in `active/` first, then `archive/`.
    pub fn locate_job(&self, id: &str) -> Option<JobLocation> {
        let active = self.job_dir(id);
        if active.join(STATE_FILE_NAME).is_file() {
            return Some(JobLocation::Active(active));
        }
        let archived = self.archive_dir.join(id);
        if archived.join(STATE_FILE_NAME).is_file() {
            return Some(JobLocation::Archived(archived));
        }
        None
    }

    /// Like [`locate_job`](Self::locate_job) but fails with a readable error.
    pub fn require_job(&self, id: &str) -> Result<JobLocation> {
        self.locate_job(id)
            .with_context(|| format!("No job '{}' under {}", id, self.root.display()))
    }

    /// Ids of jobs in `active/`, sorted.
    pub fn active_jobs(&self) -> Result<Vec<String>> {
        list_jobs(&self.active_dir)
    }

    /// Ids of jobs in `archive/`, sorted.
    pub fn archived_jobs(&self) -> Result<Vec<String>> {
        list_jobs(&self.archive_dir)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.active_dir).context("Failed to create active directory")?;
        fs::create_dir_all(&self.archive_dir).context("Failed to create archive directory")?;
        fs::create_dir_all(&self.workflows_dir)
            .context("Failed to create workflows directory")?;
        fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}

fn list_jobs(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let entry = entry?;
        if entry.path().join(STATE_FILE_NAME).is_file() {
            ids.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    ids.sort();
    Ok(ids)
}
