//! The boundary between the runner and whatever actually does a phase's work.
//!
//! A collaborator returns an explicit [`CollaboratorOutcome`]. `Err` from
//! [`Collaborator::invoke`] is reserved for faults the collaborator did not
//! anticipate; the runner records both the same way and retries.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};
use tracing::debug;

/// Number of stderr lines kept as the failure reason.
const STDERR_TAIL_LINES: usize = 20;

/// One call to a collaborator.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub collaborator: &'a str,
    pub phase: &'a str,
    /// 1-based attempt number.
    pub attempt: u32,
    pub job_id: &'a str,
    pub job_dir: &'a Path,
    pub output: Option<&'a str>,
    pub input: &'a Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorOutcome {
    Success {
        /// Artifact actually produced, recorded as the phase output.
        artifact: Option<String>,
    },
    Failure {
        reason: String,
        details: Option<Map<String, Value>>,
    },
}

impl CollaboratorOutcome {
    pub fn success() -> Self {
        Self::Success { artifact: None }
    }

    pub fn success_with(artifact: impl Into<String>) -> Self {
        Self::Success {
            artifact: Some(artifact.into()),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
            details: None,
        }
    }

    pub fn failure_with(reason: impl Into<String>, details: Map<String, Value>) -> Self {
        Self::Failure {
            reason: reason.into(),
            details: Some(details),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Something that can carry out a phase on the runner's behalf.
pub trait Collaborator {
    fn invoke(&self, request: &Invocation<'_>) -> Result<CollaboratorOutcome>;
}

impl<F> Collaborator for F
where
    F: Fn(&Invocation<'_>) -> Result<CollaboratorOutcome>,
{
    fn invoke(&self, request: &Invocation<'_>) -> Result<CollaboratorOutcome> {
        self(request)
    }
}

/// A shell command bound to a collaborator name.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub command: String,
    /// Relative to the job directory unless absolute.
    pub working_dir: Option<PathBuf>,
}

/// Runs collaborators as `sh -c <command>` in the job directory.
///
/// The invocation input is written to stdin as JSON. Exit status 0 is
/// success; stdout may carry `{"artifact": "..."}`. Anything else fails with
/// the tail of stderr as the reason.
#[derive(Debug, Clone, Default)]
pub struct CommandCollaborator {
    commands: BTreeMap<String, CommandSpec>,
    fallback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandReport {
    artifact: Option<String>,
}

impl CommandCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, name: &str, spec: CommandSpec) -> Self {
        self.commands.insert(name.to_string(), spec);
        self
    }

    /// Command used for names without an explicit entry; the name is appended.
    pub fn with_fallback(mut self, command: Option<String>) -> Self {
        self.fallback = command.filter(|c| !c.trim().is_empty());
        self
    }

    /// Resolve a collaborator name to the command that would run.
    pub fn resolve(&self, name: &str) -> Option<CommandSpec> {
        if let Some(spec) = self.commands.get(name) {
            return Some(spec.clone());
        }
        self.fallback.as_ref().map(|base| CommandSpec {
            command: format!("{} {}", base, name),
            working_dir: None,
        })
    }

    fn run(&self, spec: &CommandSpec, request: &Invocation<'_>) -> Result<CollaboratorOutcome> {
        let working_dir = match &spec.working_dir {
            Some(dir) => request.job_dir.join(dir),
            None => request.job_dir.to_path_buf(),
        };

        debug!(
            collaborator = request.collaborator,
            command = %spec.command,
            cwd = %working_dir.display(),
            "Spawning collaborator"
        );

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&spec.command)
            .current_dir(&working_dir)
            .env("CONDUCTOR_JOB_ID", request.job_id)
            .env("CONDUCTOR_PHASE", request.phase)
            .env("CONDUCTOR_COLLABORATOR", request.collaborator)
            .env("CONDUCTOR_ATTEMPT", request.attempt.to_string())
            .env("CONDUCTOR_JOB_DIR", request.job_dir)
            .env("CONDUCTOR_OUTPUT", request.output.unwrap_or_default())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn collaborator '{}'", request.collaborator))?;

        // Input is fed from its own thread while stdout and stderr drain, so a
        // command that writes before it reads cannot fill a pipe and stall.
        let payload = serde_json::to_vec(request.input)?;
        let stdin = child.stdin.take();
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || write_input(stdin, &payload));
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("input writer panicked")));
            (output, written)
        });
        let output = output
            .with_context(|| format!("Failed to wait for collaborator '{}'", request.collaborator))?;
        written.context("Failed to write collaborator input")?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let artifact = serde_json::from_str::<CommandReport>(stdout.trim())
                .ok()
                .and_then(|report| report.artifact)
                .filter(|a| !a.trim().is_empty());
            return Ok(CollaboratorOutcome::Success { artifact });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = stderr_tail(&stderr);
        let code = output.status.code();
        let reason = if tail.is_empty() {
            match code {
                Some(code) => format!("command exited with status {}", code),
                None => "command terminated by signal".to_string(),
            }
        } else {
            tail
        };

        let mut details = Map::new();
        details.insert("command".into(), Value::from(spec.command.clone()));
        details.insert("exitCode".into(), code.map(Value::from).unwrap_or(Value::Null));
        Ok(CollaboratorOutcome::failure_with(reason, details))
    }
}

impl Collaborator for CommandCollaborator {
    fn invoke(&self, request: &Invocation<'_>) -> Result<CollaboratorOutcome> {
        match self.resolve(request.collaborator) {
            Some(spec) => self.run(&spec, request),
            None => Ok(CollaboratorOutcome::failure(format!(
                "no command configured for collaborator '{}'",
                request.collaborator
            ))),
        }
    }
}

/// Write the whole payload, then close stdin. A command that never reads
/// stdin closes the pipe early; that is not an error.
fn write_input(stdin: Option<ChildStdin>, payload: &[u8]) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(payload) {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
