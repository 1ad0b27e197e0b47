//! Drives an ordered list of phases against a [`StateStore`].
//!
//! For every step the runner either skips (phase already complete, or its
//! declared output already on disk) or calls the collaborator, retrying a
//! bounded number of times with a fixed delay. The runner only touches state
//! through the store.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::collaborator::{Collaborator, CollaboratorOutcome, Invocation};
use super::document::{ErrorEntry, ErrorPayload, PhaseStatus};
use super::state::StateStore;
use crate::errors::StateError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Fixed-delay retry budget for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below one is raised to one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

/// Waits between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// One phase to run: which collaborator does the work and what it is given.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseStep {
    pub phase: String,
    pub collaborator: Option<String>,
    pub input: Value,
}

impl PhaseStep {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            collaborator: None,
            input: Value::Null,
        }
    }

    pub fn with_collaborator(mut self, collaborator: impl Into<String>) -> Self {
        self.collaborator = Some(collaborator.into());
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    AlreadyComplete,
    OutputExists(PathBuf),
}

/// Progress callbacks. Every method defaults to doing nothing.
pub trait RunObserver {
    fn phase_started(&self, _phase: &str, _index: usize, _total: usize) {}
    fn phase_skipped(&self, _phase: &str, _reason: &SkipReason) {}
    fn attempt_started(&self, _phase: &str, _attempt: u32, _max_attempts: u32) {}
    fn attempt_failed(&self, _phase: &str, _attempt: u32, _reason: &str, _retry_in: Duration) {}
    fn phase_completed(&self, _phase: &str, _artifact: Option<&str>) {}
    fn phase_failed(&self, _phase: &str, _attempts: u32, _reason: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;
static NOOP_OBSERVER: NoopObserver = NoopObserver;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Failed {
        phase: String,
        attempts: u32,
        last_error: Option<ErrorEntry>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Phases completed by a collaborator during this run.
    pub completed: Vec<String>,
    /// Phases completed without invoking anything.
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn failed_phase(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Failed { phase, .. } => Some(phase),
            RunOutcome::Completed => None,
        }
    }
}

pub struct PhaseRunner<'a> {
    collaborator: &'a dyn Collaborator,
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
    observer: &'a dyn RunObserver,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(collaborator: &'a dyn Collaborator) -> Self {
        Self {
            collaborator,
            policy: RetryPolicy::default(),
            sleeper: &THREAD_SLEEPER,
            observer: &NOOP_OBSERVER,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn RunObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `steps` in order, stopping at the first phase that exhausts its attempts.
    ///
    /// `Ok` with a failed report means a collaborator gave up; `Err` means the
    /// state could not be read or written and nothing further was attempted.
    pub fn run(
        &self,
        store: &mut StateStore,
        steps: &[PhaseStep],
    ) -> Result<RunReport, StateError> {
        let mut completed = Vec::new();
        let mut skipped = Vec::new();

        for (index, step) in steps.iter().enumerate() {
            let phase = step.phase.as_str();
            self.observer.phase_started(phase, index, steps.len());

            let record = store.phase(phase).ok_or_else(|| StateError::UnknownPhase {
                phase: phase.to_string(),
            })?;
            if record.status == PhaseStatus::Complete {
                info!(phase, "Phase already complete, skipping");
                self.observer
                    .phase_skipped(phase, &SkipReason::AlreadyComplete);
                skipped.push(phase.to_string());
                continue;
            }
            let declared_output = record.declared_output().map(str::to_string);

            let mut attempt = 0;
            loop {
                attempt += 1;

                if let Some(found) = declared_output
                    .as_deref()
                    .and_then(|output| existing_output(store.job_dir(), output))
                {
                    info!(phase, output = %found.display(), "Output already present, marking complete");
                    store.transition_phase(phase, PhaseStatus::Complete, None)?;
                    self.observer
                        .phase_skipped(phase, &SkipReason::OutputExists(found));
                    if attempt == 1 {
                        skipped.push(phase.to_string());
                    } else {
                        completed.push(phase.to_string());
                    }
                    break;
                }

                store.transition_phase(phase, PhaseStatus::InProgress, None)?;
                self.observer
                    .attempt_started(phase, attempt, self.policy.max_attempts);
                info!(phase, attempt, max_attempts = self.policy.max_attempts, "Running phase");

                let (reason, details) =
                    match self.invoke(store, step, declared_output.as_deref(), attempt) {
                        Ok(CollaboratorOutcome::Success { artifact }) => {
                            store.transition_phase(
                                phase,
                                PhaseStatus::Complete,
                                artifact.as_deref(),
                            )?;
                            self.observer.phase_completed(phase, artifact.as_deref());
                            completed.push(phase.to_string());
                            break;
                        }
                        Ok(CollaboratorOutcome::Failure { reason, details }) => (reason, details),
                        Err(e) => (format!("{:#}", e), None),
                    };

                let payload = failure_payload(step, attempt, &reason, details);
                if attempt < self.policy.max_attempts {
                    warn!(phase, attempt, reason = %reason, "Attempt failed, retrying");
                    store.log_error(phase, payload)?;
                    self.observer
                        .attempt_failed(phase, attempt, &reason, self.policy.delay);
                    self.sleeper.sleep(self.policy.delay);
                    continue;
                }

                store.mark_phase_error(phase, payload)?;
                self.observer.phase_failed(phase, attempt, &reason);
                return Ok(RunReport {
                    outcome: RunOutcome::Failed {
                        phase: phase.to_string(),
                        attempts: attempt,
                        last_error: store.last_error().cloned(),
                    },
                    completed,
                    skipped,
                });
            }
        }

        Ok(RunReport {
            outcome: RunOutcome::Completed,
            completed,
            skipped,
        })
    }

    fn invoke(
        &self,
        store: &StateStore,
        step: &PhaseStep,
        output: Option<&str>,
        attempt: u32,
    ) -> anyhow::Result<CollaboratorOutcome> {
        let Some(name) = step.collaborator.as_deref() else {
            return Ok(CollaboratorOutcome::failure("no collaborator declared"));
        };
        self.collaborator.invoke(&Invocation {
            collaborator: name,
            phase: &step.phase,
            attempt,
            job_id: store.id(),
            job_dir: store.job_dir(),
            output,
            input: &step.input,
        })
    }
}

fn failure_payload(
    step: &PhaseStep,
    attempt: u32,
    reason: &str,
    details: Option<Map<String, Value>>,
) -> ErrorPayload {
    let mut map = Map::new();
    map.insert(
        "collaborator".into(),
        step.collaborator
            .clone()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    map.insert("attempt".into(), Value::from(attempt));
    map.insert("reason".into(), Value::from(reason));
    for (key, value) in details.into_iter().flatten() {
        map.entry(key).or_insert(value);
    }
    ErrorPayload::Structured(map)
}

/// Resolve a declared output and return it if it exists with content.
///
/// A file counts when non-empty, a directory when it has at least one entry.
pub fn existing_output(job_dir: &Path, output: &str) -> Option<PathBuf> {
    let path = job_dir.join(output);
    let metadata = fs::metadata(&path).ok()?;
    let present = if metadata.is_dir() {
        fs::read_dir(&path).ok()?.next().is_some()
    } else {
        metadata.len() > 0
    };
    present.then_some(path)
}
