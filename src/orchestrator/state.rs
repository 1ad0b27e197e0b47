//! The workflow state store: sole owner and writer of one job's `state.json`.
//!
//! Every mutating call works on a copy of the document, writes the copy
//! atomically, and only then swaps it in. A failed write therefore leaves
//! the in-memory document exactly as it was before the call.
//!
//! Writes follow the layout of the file as it was loaded: key order, keys the
//! typed document leaves out (`null` options, empty defaults) and the trailing
//! newline all carry over, so only the fields a mutation touched change on disk.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::document::{
    COMPLETE, ErrorEntry, ErrorPayload, PhaseRecord, PhaseStatus, RESERVED_FIELDS,
    WorkflowDefaults, WorkflowDocument,
};
use crate::errors::StateError;
use crate::util::{format_timestamp, now_timestamp, write_file_atomic};

/// Point-in-time overview of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub subject: String,
    pub status: String,
    pub completed: Vec<String>,
    pub in_progress: Vec<String>,
    pub pending: Vec<String>,
    pub errored: Vec<String>,
    pub error_count: usize,
    pub elapsed_secs: f64,
}

/// Metadata key holding per-platform payloads.
pub const PLATFORMS_DATA: &str = "platformsData";

/// The file as last read or written.
#[derive(Debug, Clone)]
struct OnDisk {
    value: Value,
    trailing_newline: bool,
}

pub struct StateStore {
    path: PathBuf,
    document: WorkflowDocument,
    on_disk: OnDisk,
}

impl StateStore {
    /// Load the document at `path`, or build and persist a fresh one from `defaults`.
    ///
    /// An existing, parseable file is used verbatim and is not rewritten.
    /// A missing file, or one that is not a JSON object at all, is replaced by
    /// a new document. Valid JSON that does not fit the schema fails with
    /// [`StateError::IncompatibleState`] and the file is left alone.
    pub fn load_or_initialize(
        path: impl Into<PathBuf>,
        defaults: &WorkflowDefaults,
    ) -> Result<Self, StateError> {
        let path = path.into();
        match read_document(&path) {
            Ok((document, on_disk)) => {
                debug!(path = %path.display(), id = %document.workflow_id(), "Loaded existing workflow state");
                return Ok(Self {
                    path,
                    document,
                    on_disk,
                });
            }
            Err(StateError::NotFound { .. }) => {
                debug!(path = %path.display(), "No workflow state found, initializing");
            }
            Err(err @ StateError::MalformedState { .. }) => {
                warn!(error = %err, "Reinitializing malformed workflow state");
            }
            Err(err) => return Err(err),
        }

        let document = defaults.build(Utc::now());
        let on_disk = write_document(&path, &document, None)?;
        info!(id = %document.id, path = %path.display(), "Initialized workflow state");
        Ok(Self {
            path,
            document,
            on_disk,
        })
    }

    /// Strict load: fails instead of reinitializing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let (document, on_disk) = read_document(&path)?;
        Ok(Self {
            path,
            document,
            on_disk,
        })
    }

    /// Rewrite the backing file from the in-memory document.
    pub fn save(&mut self) -> Result<(), StateError> {
        self.on_disk = write_document(&self.path, &self.document, Some(&self.on_disk))?;
        Ok(())
    }

    /// Atomically write a copy of the document to another path.
    pub fn export(&self, destination: &Path) -> Result<(), StateError> {
        write_document(destination, &self.document, Some(&self.on_disk)).map(|_| ())
    }

    fn mutate<T>(
        &mut self,
        change: impl FnOnce(&mut WorkflowDocument) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let mut draft = self.document.clone();
        let value = change(&mut draft)?;
        let on_disk = write_document(&self.path, &draft, Some(&self.on_disk))?;
        self.document = draft;
        self.on_disk = on_disk;
        Ok(value)
    }

    /// Set a phase's status (and optionally its output) and make it current.
    ///
    /// The top-level status follows the phase unless the workflow is already complete.
    pub fn transition_phase(
        &mut self,
        phase: &str,
        status: PhaseStatus,
        output: Option<&str>,
    ) -> Result<(), StateError> {
        self.mutate(|doc| {
            let record = phase_mut(doc, phase)?;
            record.status = status.clone();
            if let Some(output) = output {
                record.output = Some(output.to_string());
            }
            record.timestamp = Some(now_timestamp());
            if !doc.is_complete() {
                doc.status = phase.to_string();
            }
            Ok(())
        })?;
        info!(phase, status = %status, "Phase transitioned");
        Ok(())
    }

    /// Append a pending phase. Returns `false` without writing if it already exists.
    pub fn add_phase(&mut self, phase: &str, output: Option<&str>) -> Result<bool, StateError> {
        if self.document.phases.contains_key(phase) {
            return Ok(false);
        }
        self.mutate(|doc| {
            doc.phases.insert(
                phase.to_string(),
                PhaseRecord::pending(output.map(str::to_string)),
            );
            Ok(())
        })?;
        info!(phase, "Phase added");
        Ok(true)
    }

    pub fn record_agent_status(
        &mut self,
        phase: &str,
        agent: &str,
        status: PhaseStatus,
    ) -> Result<(), StateError> {
        self.mutate(|doc| {
            let record = phase_mut(doc, phase)?;
            record
                .agents
                .get_or_insert_with(Default::default)
                .insert(agent.to_string(), status.clone());
            Ok(())
        })?;
        debug!(phase, agent, status = %status, "Agent status recorded");
        Ok(())
    }

    pub fn record_subphase_status(
        &mut self,
        phase: &str,
        subphase: &str,
        status: PhaseStatus,
    ) -> Result<(), StateError> {
        self.mutate(|doc| {
            let record = phase_mut(doc, phase)?;
            record
                .subphases
                .get_or_insert_with(Default::default)
                .insert(subphase.to_string(), status.clone());
            Ok(())
        })?;
        debug!(phase, subphase, status = %status, "Subphase status recorded");
        Ok(())
    }

    /// Append an entry to the error log.
    pub fn log_error(
        &mut self,
        phase: &str,
        error: impl Into<ErrorPayload>,
    ) -> Result<(), StateError> {
        let error = error.into();
        let summary = error.summary();
        self.mutate(|doc| {
            push_error(doc, phase, error);
            Ok(())
        })?;
        warn!(phase, error = %summary, "Error logged");
        Ok(())
    }

    /// Put a phase into `error` and log why, in one write.
    pub fn mark_phase_error(
        &mut self,
        phase: &str,
        error: impl Into<ErrorPayload>,
    ) -> Result<(), StateError> {
        let error = error.into();
        let summary = error.summary();
        self.mutate(|doc| {
            let record = phase_mut(doc, phase)?;
            record.status = PhaseStatus::Error;
            record.timestamp = Some(now_timestamp());
            if !doc.is_complete() {
                doc.status = phase.to_string();
            }
            push_error(doc, phase, error);
            Ok(())
        })?;
        warn!(phase, error = %summary, "Phase failed");
        Ok(())
    }

    /// Finish the workflow.
    ///
    /// Phases still pending or in progress are swept to `complete`; phases in
    /// `error` keep that status. `completedAt` is only stamped once, and
    /// `executionTime` always runs up to the stored `completedAt`: completing
    /// an already complete workflow rewrites the same duration rather than
    /// measuring up to the current time.
    pub fn complete_workflow(&mut self) -> Result<(), StateError> {
        let now = Utc::now();
        let stamp = format_timestamp(now);
        self.mutate(|doc| {
            for record in doc.phases.values_mut() {
                if !record.status.is_settled() {
                    record.status = PhaseStatus::Complete;
                    record.timestamp = Some(stamp.clone());
                }
            }
            doc.status = COMPLETE.to_string();
            if doc.completed_at.is_none() {
                doc.completed_at = Some(stamp.clone());
            }
            let secs = doc.elapsed_secs(now);
            let recorded = doc.metadata.execution_time.as_ref().and_then(Number::as_f64);
            if recorded != Some(secs)
                && let Some(secs) = Number::from_f64(secs)
            {
                doc.metadata.execution_time = Some(secs);
            }
            Ok(())
        })?;
        info!(
            id = %self.id(),
            execution_time = self
                .document
                .metadata
                .execution_time
                .as_ref()
                .and_then(Number::as_f64)
                .unwrap_or_default(),
            "Workflow complete"
        );
        Ok(())
    }

    /// Set a metric. A number already stored directly under `metadata`
    /// (blog jobs keep `wordCount` there) is updated in place.
    pub fn set_metric(&mut self, name: &str, value: impl Into<Value>) -> Result<(), StateError> {
        let value = value.into();
        self.mutate(|doc| {
            *metric_slot(doc, name) = value;
            Ok(())
        })
    }

    /// Add `by` to a numeric metric; a missing or non-numeric metric counts as zero.
    pub fn increment_metric(&mut self, name: &str, by: i64) -> Result<Value, StateError> {
        self.mutate(|doc| {
            let slot = metric_slot(doc, name);
            let next = match &*slot {
                Value::Number(n) if n.is_i64() => {
                    Value::from(n.as_i64().unwrap_or_default().saturating_add(by))
                }
                Value::Number(n) => Value::from(n.as_f64().unwrap_or_default() + by as f64),
                _ => Value::from(by),
            };
            *slot = next.clone();
            Ok(next)
        })
    }

    /// Store `data` under `metadata.platformsData.<platform>`, replacing any
    /// previous payload for that platform.
    pub fn set_platform_data(
        &mut self,
        platform: &str,
        data: impl Into<Value>,
    ) -> Result<(), StateError> {
        let data = data.into();
        self.mutate(|doc| {
            let slot = doc
                .metadata
                .extra
                .entry(PLATFORMS_DATA)
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(platforms) = slot else {
                return Err(StateError::NotAnObject {
                    field: PLATFORMS_DATA.to_string(),
                });
            };
            platforms.insert(platform.to_string(), data);
            Ok(())
        })?;
        debug!(platform, "Platform data recorded");
        Ok(())
    }

    pub fn platform_data(&self, platform: &str) -> Option<&Value> {
        self.document
            .metadata
            .extra
            .get(PLATFORMS_DATA)
            .and_then(|platforms| platforms.get(platform))
    }

    /// Set a free-form top-level field such as `platforms`.
    pub fn set_field(&mut self, key: &str, value: impl Into<Value>) -> Result<(), StateError> {
        if RESERVED_FIELDS.contains(&key) {
            return Err(StateError::ReservedField {
                field: key.to_string(),
            });
        }
        let value = value.into();
        self.mutate(|doc| {
            doc.extra.insert(key.to_string(), value);
            Ok(())
        })
    }

    pub fn validate(&self) -> Vec<String> {
        self.document.validate()
    }

    pub fn document(&self) -> &WorkflowDocument {
        &self.document
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the state file; phase outputs resolve against it.
    pub fn job_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn id(&self) -> &str {
        self.document.workflow_id()
    }

    pub fn phase(&self, phase: &str) -> Option<&PhaseRecord> {
        self.document.phase(phase)
    }

    pub fn phase_status(&self, phase: &str) -> Option<&PhaseStatus> {
        self.phase(phase).map(|record| &record.status)
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.document.metadata.errors
    }

    pub fn last_error(&self) -> Option<&ErrorEntry> {
        self.errors().last()
    }

    pub fn metrics(&self) -> &Map<String, Value> {
        &self.document.metadata.metrics
    }

    /// A metric from `metadata.metrics`, else a number stored directly under `metadata`.
    pub fn metric(&self, name: &str) -> Option<&Value> {
        let metadata = &self.document.metadata;
        metadata
            .metrics
            .get(name)
            .or_else(|| metadata.extra.get(name).filter(|v| v.is_number()))
    }

    pub fn all_phases_complete(&self) -> bool {
        self.document.all_phases_complete()
    }

    /// Whether every agent under `phase` is complete. True when it has none.
    pub fn all_agents_complete(&self, phase: &str) -> Result<bool, StateError> {
        let record = self.phase(phase).ok_or_else(|| StateError::UnknownPhase {
            phase: phase.to_string(),
        })?;
        Ok(record
            .agents
            .iter()
            .flatten()
            .all(|(_, status)| *status == PhaseStatus::Complete))
    }

    pub fn next_pending_phase(&self) -> Option<&str> {
        self.document.next_pending_phase()
    }

    pub fn completed_phases(&self) -> Vec<String> {
        self.document.phases_with_status(&PhaseStatus::Complete)
    }

    pub fn summary(&self) -> WorkflowSummary {
        let doc = &self.document;
        WorkflowSummary {
            id: doc.workflow_id().to_string(),
            subject: doc.subject.clone(),
            status: doc.status.clone(),
            completed: doc.phases_with_status(&PhaseStatus::Complete),
            in_progress: doc.phases_with_status(&PhaseStatus::InProgress),
            pending: doc.phases_with_status(&PhaseStatus::Pending),
            errored: doc.phases_with_status(&PhaseStatus::Error),
            error_count: doc.metadata.errors.len(),
            elapsed_secs: doc.elapsed_secs(Utc::now()),
        }
    }
}

fn phase_mut<'a>(
    doc: &'a mut WorkflowDocument,
    phase: &str,
) -> Result<&'a mut PhaseRecord, StateError> {
    doc.phases
        .get_mut(phase)
        .ok_or_else(|| StateError::UnknownPhase {
            phase: phase.to_string(),
        })
}

fn metric_slot<'a>(doc: &'a mut WorkflowDocument, name: &str) -> &'a mut Value {
    let metadata = &mut doc.metadata;
    let inline = !metadata.metrics.contains_key(name)
        && metadata.extra.get(name).is_some_and(Value::is_number);
    if inline && let Some(slot) = metadata.extra.get_mut(name) {
        return slot;
    }
    metadata
        .metrics
        .entry(name)
        .or_insert(Value::Null)
}

fn push_error(doc: &mut WorkflowDocument, phase: &str, error: ErrorPayload) {
    let entry = ErrorEntry {
        timestamp: now_timestamp(),
        phase: phase.to_string(),
        error,
        workflow_id: doc.workflow_id().to_string(),
        extra: Map::new(),
    };
    doc.metadata.errors.push(entry);
}

fn read_document(path: &Path) -> Result<(WorkflowDocument, OnDisk), StateError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StateError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(StateError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let malformed = |source: serde_json::Error| StateError::MalformedState {
        path: path.to_path_buf(),
        source,
    };
    let value: Value = serde_json::from_str(&content).map_err(malformed)?;
    if !value.is_object() {
        return Err(malformed(serde::de::Error::custom(
            "top-level value is not a JSON object",
        )));
    }
    let document = WorkflowDocument::deserialize(&value).map_err(|source| {
        StateError::IncompatibleState {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let on_disk = OnDisk {
        value,
        trailing_newline: content.ends_with('\n'),
    };
    Ok((document, on_disk))
}

fn write_document(
    path: &Path,
    document: &WorkflowDocument,
    previous: Option<&OnDisk>,
) -> Result<OnDisk, StateError> {
    let fresh = serde_json::to_value(document).map_err(StateError::Serialize)?;
    let (value, trailing_newline) = match previous {
        Some(previous) => (align_with(fresh, &previous.value), previous.trailing_newline),
        None => (fresh, true),
    };

    let mut content = serde_json::to_string_pretty(&value).map_err(StateError::Serialize)?;
    if trailing_newline {
        content.push('\n');
    }
    write_file_atomic(path, content.as_bytes()).map_err(|source| StateError::Persistence {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = content.len(), "Saved workflow state");
    Ok(OnDisk {
        value,
        trailing_newline,
    })
}

/// Lay `fresh` out like `previous`: shared keys keep their old position, new
/// keys go last, and keys only `previous` has are carried over. The store
/// never deletes keys, so a key missing from `fresh` is one the typed model
/// omits on output. Arrays line up by index.
fn align_with(fresh: Value, previous: &Value) -> Value {
    match (fresh, previous) {
        (Value::Object(mut fresh), Value::Object(previous)) => {
            let mut aligned = Map::with_capacity(fresh.len().max(previous.len()));
            for (key, old) in previous {
                let value = match fresh.shift_remove(key) {
                    Some(value) => align_with(value, old),
                    None => old.clone(),
                };
                aligned.insert(key.clone(), value);
            }
            aligned.extend(fresh);
            Value::Object(aligned)
        }
        (Value::Array(fresh), Value::Array(previous)) => Value::Array(
            fresh
                .into_iter()
                .enumerate()
                .map(|(index, value)| match previous.get(index) {
                    Some(old) => align_with(value, old),
                    None => value,
                })
                .collect(),
        ),
        (fresh, _) => fresh,
    }
}
