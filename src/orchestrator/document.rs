//! The persisted workflow document and its building blocks.
//!
//! A `WorkflowDocument` is the JSON object stored at `active/<id>/state.json`.
//! Field names are camelCase and form the on-disk compatibility surface.
//! Unknown keys at every level are kept in `extra` maps so a document written
//! by another tool survives a load/mutate/save cycle with its fields intact.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::sync::LazyLock;

use crate::util::{format_timestamp, parse_timestamp};

/// Top-level status marker for a finished workflow.
pub const COMPLETE: &str = "complete";

/// Top-level keys owned by the state store; `set_field` refuses them.
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "subject",
    "status",
    "createdAt",
    "completedAt",
    "phases",
    "metadata",
];

static WORKFLOW_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(?:-[a-z0-9]+)*-\d{4}-\d{2}-\d{2}-\d{6}$")
        .expect("workflow id pattern is a valid static regex")
});

/// Generate a workflow id of the form `<prefix>-YYYY-MM-DD-HHMMSS`.
pub fn generate_workflow_id(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", prefix, at.format("%Y-%m-%d-%H%M%S"))
}

/// Whether `id` matches the generation scheme of [`generate_workflow_id`].
pub fn is_valid_workflow_id(id: &str) -> bool {
    WORKFLOW_ID_RE.is_match(id)
}

/// Status of a phase, or of a nested agent/subphase.
///
/// Serialized as a plain string. A status string outside the four known values
/// is kept as `Unrecognized` so the document still round-trips; `validate`
/// reports it. `Missing` stands for a phase record with no `status` key at all
/// and is never written back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Error,
    Missing,
    Unrecognized(String),
}

impl PhaseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Complete => "complete",
            PhaseStatus::Error => "error",
            PhaseStatus::Missing => "",
            PhaseStatus::Unrecognized(raw) => raw,
        }
    }

    /// One of the four statuses the state machine knows about.
    pub fn is_valid(&self) -> bool {
        !matches!(self, PhaseStatus::Unrecognized(_) | PhaseStatus::Missing)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, PhaseStatus::Missing)
    }

    /// `complete` or `error`: the completion sweep leaves these alone.
    pub fn is_settled(&self) -> bool {
        matches!(self, PhaseStatus::Complete | PhaseStatus::Error)
    }
}

impl From<String> for PhaseStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => PhaseStatus::Pending,
            "in_progress" => PhaseStatus::InProgress,
            "complete" => PhaseStatus::Complete,
            "error" => PhaseStatus::Error,
            _ => PhaseStatus::Unrecognized(raw),
        }
    }
}

impl From<PhaseStatus> for String {
    fn from(status: PhaseStatus) -> Self {
        match status {
            PhaseStatus::Unrecognized(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match PhaseStatus::from(s.to_lowercase()) {
            PhaseStatus::Unrecognized(_) => anyhow::bail!(
                "Invalid phase status '{}'. Valid values: pending, in_progress, complete, error",
                s
            ),
            status => Ok(status),
        }
    }
}

/// Record of one phase inside a workflow document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseRecord {
    #[serde(default = "missing_status", skip_serializing_if = "PhaseStatus::is_missing")]
    pub status: PhaseStatus,
    /// Artifact this phase is expected to produce, relative to the job directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Time of the last status change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Statuses of collaborators that fan out under this phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<IndexMap<String, PhaseStatus>>,
    /// Statuses of sequential steps inside this phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subphases: Option<IndexMap<String, PhaseStatus>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn missing_status() -> PhaseStatus {
    PhaseStatus::Missing
}

impl PhaseRecord {
    pub fn pending(output: Option<String>) -> Self {
        Self {
            status: PhaseStatus::Pending,
            output,
            ..Default::default()
        }
    }

    /// Declared output, if it names something.
    pub fn declared_output(&self) -> Option<&str> {
        self.output.as_deref().filter(|o| !o.trim().is_empty())
    }
}

/// Error payload: a plain message, a structured object, or whatever other
/// JSON value another writer left there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    Message(String),
    Structured(Map<String, Value>),
    Other(Value),
}

impl ErrorPayload {
    /// One-line human summary of the payload.
    pub fn summary(&self) -> String {
        match self {
            ErrorPayload::Message(message) => message.clone(),
            ErrorPayload::Structured(map) => ["reason", "message", "error"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            ErrorPayload::Other(value) => value.to_string(),
        }
    }
}

impl From<&str> for ErrorPayload {
    fn from(message: &str) -> Self {
        ErrorPayload::Message(message.to_string())
    }
}

impl From<String> for ErrorPayload {
    fn from(message: String) -> Self {
        ErrorPayload::Message(message)
    }
}

impl From<Map<String, Value>> for ErrorPayload {
    fn from(map: Map<String, Value>) -> Self {
        ErrorPayload::Structured(map)
    }
}

/// One entry of the append-only error log.
///
/// Entries written by other tools may carry extra keys next to `error`
/// (a platform name, an HTTP code); they live in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub timestamp: String,
    pub phase: String,
    pub error: ErrorPayload,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Counters, timing and the error log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metrics: Map<String, Value>,
    /// Seconds between the start of the run and completion. Kept as a raw
    /// JSON number so an integer written elsewhere stays an integer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Root entity: one per job run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,
    /// Current phase name, or [`COMPLETE`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Ordered by execution order.
    #[serde(default)]
    pub phases: IndexMap<String, PhaseRecord>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keys older state files use for the job id instead of `id`.
const LEGACY_ID_FIELDS: &[&str] = &["workflowId", "projectId"];

impl WorkflowDocument {
    /// The job id: `id`, else a legacy `workflowId`/`projectId` string.
    pub fn workflow_id(&self) -> &str {
        if !self.id.is_empty() {
            return &self.id;
        }
        LEGACY_ID_FIELDS
            .iter()
            .find_map(|key| self.extra.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.status == COMPLETE
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseRecord> {
        self.phases.get(name)
    }

    /// True when every declared phase is `complete`; vacuously true with no phases.
    pub fn all_phases_complete(&self) -> bool {
        self.phases
            .values()
            .all(|record| record.status == PhaseStatus::Complete)
    }

    /// Names of phases with the given status, in execution order.
    pub fn phases_with_status(&self, status: &PhaseStatus) -> Vec<String> {
        self.phases
            .iter()
            .filter(|(_, record)| &record.status == status)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// First phase still waiting to run.
    pub fn next_pending_phase(&self) -> Option<&str> {
        self.phases
            .iter()
            .find(|(_, record)| record.status == PhaseStatus::Pending)
            .map(|(name, _)| name.as_str())
    }

    /// Elapsed seconds from `metadata.startTime` (else `createdAt`) to
    /// `completedAt` (or `now` while unfinished), never negative.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        let start = self
            .metadata
            .start_time
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| parse_timestamp(&self.created_at));
        let Some(created) = start else {
            return 0.0;
        };
        let end = self
            .completed_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);
        let millis = (end - created).num_milliseconds().max(0);
        (millis as f64 / 10.0).round() / 100.0
    }

    /// Structural check of the document. Returns one message per violation.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let id = self.workflow_id();
        for (field, value) in [
            ("id", id),
            ("status", self.status.as_str()),
            ("createdAt", self.created_at.as_str()),
        ] {
            if value.trim().is_empty() {
                violations.push(format!("Missing required field: {}", field));
            }
        }

        if !id.is_empty() && !is_valid_workflow_id(id) {
            violations.push(format!("Invalid workflow ID format: {}", id));
        }

        if !self.status.is_empty() && !self.is_complete() && !self.phases.contains_key(&self.status)
        {
            violations.push(format!(
                "Status '{}' is neither a declared phase nor '{}'",
                self.status, COMPLETE
            ));
        }

        if !self.created_at.is_empty() && parse_timestamp(&self.created_at).is_none() {
            violations.push(format!("Invalid timestamp for createdAt: {}", self.created_at));
        }
        if let Some(completed_at) = &self.completed_at
            && parse_timestamp(completed_at).is_none()
        {
            violations.push(format!("Invalid timestamp for completedAt: {}", completed_at));
        }

        for (name, record) in &self.phases {
            if record.status.is_missing() {
                violations.push(format!("Missing status for phase {}", name));
            } else if !record.status.is_valid() {
                violations.push(format!("Invalid status for phase {}: '{}'", name, record.status));
            }
            if let Some(ts) = &record.timestamp
                && parse_timestamp(ts).is_none()
            {
                violations.push(format!("Invalid timestamp for phase {}: {}", name, ts));
            }
            for (kind, nested) in [("agent", &record.agents), ("subphase", &record.subphases)] {
                for (nested_name, status) in nested.iter().flatten() {
                    if !status.is_valid() {
                        violations.push(format!(
                            "Invalid status for {} {} in phase {}: '{}'",
                            kind, nested_name, name, status
                        ));
                    }
                }
            }
        }

        for (index, entry) in self.metadata.errors.iter().enumerate() {
            if parse_timestamp(&entry.timestamp).is_none() {
                violations.push(format!(
                    "Invalid timestamp for error entry {}: {}",
                    index, entry.timestamp
                ));
            }
        }

        violations
    }
}

/// Phase declared by the defaults used to build a fresh document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhaseSeed {
    pub name: String,
    pub output: Option<String>,
    /// Marked complete at creation (e.g. the initialization step itself).
    pub complete: bool,
    /// Start with an empty `agents` map.
    pub agents: bool,
    /// Start with an empty `subphases` map.
    pub subphases: bool,
}

impl PhaseSeed {
    pub fn new(name: &str, output: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            output: output.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn completed(mut self) -> Self {
        self.complete = true;
        self
    }

    pub fn with_agents(mut self) -> Self {
        self.agents = true;
        self
    }

    pub fn with_subphases(mut self) -> Self {
        self.subphases = true;
        self
    }
}

/// Metadata keys the state store manages; `with_metadata` skips them.
const RESERVED_METADATA: &[&str] = &["metrics", "executionTime", "startTime", "errors"];

/// Everything needed to build a fresh document when none exists on disk.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDefaults {
    /// Fixed id; generated from `id_prefix` and the creation time when absent.
    pub id: Option<String>,
    pub id_prefix: String,
    pub subject: String,
    pub phases: Vec<PhaseSeed>,
    pub metrics: Map<String, Value>,
    pub fields: Map<String, Value>,
    /// Extra `metadata` keys such as `platformsData`.
    pub metadata: Map<String, Value>,
}

impl WorkflowDefaults {
    pub fn new(id_prefix: &str, subject: &str) -> Self {
        Self {
            id_prefix: id_prefix.to_string(),
            subject: subject.to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_seed(mut self, seed: PhaseSeed) -> Self {
        self.phases.push(seed);
        self
    }

    pub fn with_phase(self, name: &str, output: Option<&str>) -> Self {
        self.with_seed(PhaseSeed::new(name, output))
    }

    pub fn with_completed_phase(self, name: &str, output: Option<&str>) -> Self {
        self.with_seed(PhaseSeed::new(name, output).completed())
    }

    pub fn with_metric(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(name.to_string(), value.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Build the initial document as of `now`.
    ///
    /// Top-level status starts at the last phase seeded as complete, else the
    /// first declared phase.
    pub fn build(&self, now: DateTime<Utc>) -> WorkflowDocument {
        let created_at = format_timestamp(now);
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| generate_workflow_id(&self.id_prefix, now));

        let mut phases = IndexMap::new();
        for seed in &self.phases {
            let mut record = PhaseRecord::pending(seed.output.clone());
            if seed.complete {
                record.status = PhaseStatus::Complete;
                record.timestamp = Some(created_at.clone());
            }
            if seed.agents {
                record.agents = Some(IndexMap::new());
            }
            if seed.subphases {
                record.subphases = Some(IndexMap::new());
            }
            phases.insert(seed.name.clone(), record);
        }

        let status = self
            .phases
            .iter()
            .rev()
            .find(|seed| seed.complete)
            .or_else(|| self.phases.first())
            .map(|seed| seed.name.clone())
            .unwrap_or_else(|| COMPLETE.to_string());

        let extra = self
            .fields
            .iter()
            .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let metadata_extra = self
            .metadata
            .iter()
            .filter(|(key, _)| !RESERVED_METADATA.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let metadata = Metadata {
            metrics: self.metrics.clone(),
            execution_time: Some(Number::from(0)),
            start_time: Some(created_at.clone()),
            errors: Vec::new(),
            extra: metadata_extra,
        };

        WorkflowDocument {
            id,
            subject: self.subject.clone(),
            status,
            created_at,
            completed_at: None,
            phases,
            metadata,
            extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    fn two_phase_defaults() -> WorkflowDefaults {
        WorkflowDefaults::new("workflow", "sync roadmap")
            .with_phase("p1", Some("out1.txt"))
            .with_phase("p2", None)
    }

    #[test]
    fn test_generate_workflow_id_format() {
        let id = generate_workflow_id("workflow", fixed_now());
        assert_eq!(id, "workflow-2025-03-14-092653");
        assert!(is_valid_workflow_id(&id));
    }

    #[test]
    fn test_workflow_id_validation() {
        assert!(is_valid_workflow_id("proj-2025-01-02-030405"));
        assert!(is_valid_workflow_id("blog-post-2025-01-02-030405"));
        assert!(!is_valid_workflow_id("proj-2025-01-02"));
        assert!(!is_valid_workflow_id("Proj-2025-01-02-030405"));
        assert!(!is_valid_workflow_id("2025-01-02-030405"));
        assert!(!is_valid_workflow_id(""));
    }

    #[test]
    fn test_phase_status_string_round_trip() {
        for raw in ["pending", "in_progress", "complete", "error"] {
            let status = PhaseStatus::from(raw.to_string());
            assert!(status.is_valid());
            assert_eq!(String::from(status), raw);
        }
        let odd = PhaseStatus::from("started".to_string());
        assert_eq!(odd, PhaseStatus::Unrecognized("started".to_string()));
        assert_eq!(String::from(odd), "started");
    }

    #[test]
    fn test_phase_status_from_str_is_strict() {
        assert_eq!("IN_PROGRESS".parse::<PhaseStatus>().unwrap(), PhaseStatus::InProgress);
        assert!("done".parse::<PhaseStatus>().is_err());
    }

    #[test]
    fn test_build_sets_first_phase_as_status() {
        let doc = two_phase_defaults().build(fixed_now());
        assert_eq!(doc.id, "workflow-2025-03-14-092653");
        assert_eq!(doc.status, "p1");
        assert_eq!(doc.subject, "sync roadmap");
        assert_eq!(doc.phases.len(), 2);
        assert_eq!(doc.phases["p1"].status, PhaseStatus::Pending);
        assert_eq!(doc.phases["p1"].output.as_deref(), Some("out1.txt"));
        assert!(doc.phases["p1"].timestamp.is_none());
        assert!(doc.validate().is_empty(), "{:?}", doc.validate());
    }

    #[test]
    fn test_build_marks_seeded_complete_phase() {
        let doc = WorkflowDefaults::new("proj", "Rust lifetimes")
            .with_completed_phase("initialization", Some("state.json"))
            .with_phase("research", Some("research-findings.json"))
            .build(fixed_now());
        assert_eq!(doc.status, "initialization");
        assert_eq!(doc.phases["initialization"].status, PhaseStatus::Complete);
        assert!(doc.phases["initialization"].timestamp.is_some());
        assert_eq!(doc.next_pending_phase(), Some("research"));
    }

    #[test]
    fn test_build_with_explicit_id_and_fields() {
        let doc = two_phase_defaults()
            .with_id("workflow-2024-12-31-235959")
            .with_field("platforms", json!(["github", "clickup"]))
            .with_field("status", "hijacked")
            .with_metric("tasksCreated", 0)
            .build(fixed_now());
        assert_eq!(doc.id, "workflow-2024-12-31-235959");
        assert_eq!(doc.extra["platforms"], json!(["github", "clickup"]));
        assert_eq!(doc.status, "p1", "reserved keys are not taken from fields");
        assert_eq!(doc.metadata.metrics["tasksCreated"], json!(0));
    }

    #[test]
    fn test_phase_order_survives_serialization() {
        let doc = WorkflowDefaults::new("workflow", "")
            .with_phase("zeta", None)
            .with_phase("alpha", None)
            .with_phase("mid", None)
            .build(fixed_now());
        let json = serde_json::to_string(&doc).unwrap();
        let back: WorkflowDocument = serde_json::from_str(&json).unwrap();
        let names: Vec<_> = back.phases.keys().cloned().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let raw = json!({
            "id": "proj-2025-01-01-000000",
            "topic": "Rust",
            "status": "research",
            "createdAt": "2025-01-01T00:00:00",
            "phases": {
                "research": {"status": "pending", "output": "r.json", "owner": "bot"}
            },
            "metadata": {"wordCount": 0, "errors": []}
        });
        let doc: WorkflowDocument = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.extra["topic"], json!("Rust"));
        assert_eq!(doc.phases["research"].extra["owner"], json!("bot"));
        assert_eq!(doc.metadata.extra["wordCount"], json!(0));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["topic"], json!("Rust"));
        assert_eq!(back["phases"]["research"]["owner"], json!("bot"));
        assert_eq!(back["metadata"]["wordCount"], json!(0));
    }

    #[test]
    fn test_error_payload_serializes_untagged() {
        let message = ErrorPayload::from("timeout");
        assert_eq!(serde_json::to_value(&message).unwrap(), json!("timeout"));

        let mut map = Map::new();
        map.insert("reason".into(), json!("rate limited"));
        map.insert("code".into(), json!(429));
        let structured = ErrorPayload::from(map);
        assert_eq!(
            serde_json::to_value(&structured).unwrap(),
            json!({"reason": "rate limited", "code": 429})
        );
        assert_eq!(structured.summary(), "rate limited");
    }

    #[test]
    fn test_error_payload_summary_falls_back_to_json() {
        let mut map = Map::new();
        map.insert("code".into(), json!(500));
        assert_eq!(ErrorPayload::Structured(map).summary(), r#"{"code":500}"#);
    }

    #[test]
    fn test_all_phases_complete_is_vacuous_for_empty() {
        let doc = WorkflowDefaults::new("workflow", "").build(fixed_now());
        assert!(doc.phases.is_empty());
        assert!(doc.all_phases_complete());
        assert_eq!(doc.status, COMPLETE);
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let mut doc = two_phase_defaults().build(fixed_now());
        doc.id = "bad id".to_string();
        doc.status = "nowhere".to_string();
        doc.created_at = "not a time".to_string();
        doc.phases["p1"].status = PhaseStatus::Unrecognized("done".to_string());
        doc.phases["p2"].timestamp = Some("later".to_string());
        doc.phases["p2"].agents = Some(IndexMap::from([(
            "github".to_string(),
            PhaseStatus::Unrecognized("??".to_string()),
        )]));

        let violations = doc.validate();
        assert!(violations.iter().any(|v| v.contains("Invalid workflow ID")));
        assert!(violations.iter().any(|v| v.contains("nowhere")));
        assert!(violations.iter().any(|v| v.contains("createdAt")));
        assert!(violations.iter().any(|v| v.contains("Invalid status for phase p1")));
        assert!(violations.iter().any(|v| v.contains("Invalid timestamp for phase p2")));
        assert!(violations.iter().any(|v| v.contains("agent github")));
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let doc = WorkflowDocument::default();
        let violations = doc.validate();
        assert!(violations.contains(&"Missing required field: id".to_string()));
        assert!(violations.contains(&"Missing required field: status".to_string()));
        assert!(violations.contains(&"Missing required field: createdAt".to_string()));
    }

    #[test]
    fn test_missing_phase_status_is_flagged_and_not_written_back() {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "id": "workflow-2025-01-01-000000",
            "status": "a",
            "createdAt": "2025-01-01T00:00:00Z",
            "phases": {"a": {"output": "x"}}
        }))
        .unwrap();
        assert_eq!(doc.phases["a"].status, PhaseStatus::Missing);
        assert!(doc.validate().contains(&"Missing status for phase a".to_string()));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["phases"]["a"], json!({"output": "x"}));
    }

    #[test]
    fn test_execution_time_keeps_its_number_form() {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "id": "workflow-2025-01-01-000000",
            "metadata": {"executionTime": 0, "errors": []}
        }))
        .unwrap();
        let back = serde_json::to_string(&doc.metadata).unwrap();
        assert!(back.contains(r#""executionTime":0,"#), "{}", back);

        let doc: WorkflowDocument =
            serde_json::from_value(json!({"metadata": {"executionTime": 12.5}})).unwrap();
        assert_eq!(
            serde_json::to_value(&doc).unwrap()["metadata"]["executionTime"],
            json!(12.5)
        );
    }

    #[test]
    fn test_error_entry_keeps_extra_keys() {
        let raw = json!({
            "phase": "discovery",
            "error": {"code": 429},
            "timestamp": "2025-01-01T00:00:00",
            "workflowId": "workflow-2025-01-01-000000",
            "platform": "clickup",
            "code": 429
        });
        let entry: ErrorEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entry.extra["platform"], json!("clickup"));
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);

        let bare = json!({"timestamp": "t", "phase": "p", "error": "boom"});
        let entry: ErrorEntry = serde_json::from_value(bare.clone()).unwrap();
        assert!(entry.workflow_id.is_empty());
        assert_eq!(serde_json::to_value(&entry).unwrap(), bare);
    }

    #[test]
    fn test_error_payload_accepts_any_json() {
        let entry: ErrorEntry =
            serde_json::from_value(json!({"timestamp": "t", "phase": "p", "error": 503})).unwrap();
        assert_eq!(entry.error, ErrorPayload::Other(json!(503)));
        assert_eq!(entry.error.summary(), "503");
    }

    #[test]
    fn test_workflow_id_falls_back_to_legacy_keys() {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "workflowId": "workflow-2025-01-01-000000",
            "status": "a",
            "createdAt": "2025-01-01T00:00:00",
            "phases": {"a": {"status": "pending"}}
        }))
        .unwrap();
        assert!(doc.id.is_empty());
        assert_eq!(doc.workflow_id(), "workflow-2025-01-01-000000");
        assert!(doc.validate().is_empty(), "{:?}", doc.validate());
        assert!(serde_json::to_value(&doc).unwrap().get("id").is_none());

        let doc: WorkflowDocument =
            serde_json::from_value(json!({"projectId": "proj-2025-01-01-000000"})).unwrap();
        assert_eq!(doc.workflow_id(), "proj-2025-01-01-000000");
        assert_eq!(WorkflowDocument::default().workflow_id(), "");
    }

    #[test]
    fn test_build_seeds_nested_maps_and_metadata() {
        let doc = WorkflowDefaults::new("workflow", "")
            .with_completed_phase("initialization", Some("state.json"))
            .with_seed(PhaseSeed::new("discovery", Some("d.json")).with_agents())
            .with_seed(PhaseSeed::new("actions", None).with_subphases())
            .with_metadata("platformsData", json!({}))
            .with_metadata("errors", json!("ignored"))
            .build(fixed_now());

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["phases"]["discovery"]["agents"], json!({}));
        assert!(value["phases"]["discovery"].get("subphases").is_none());
        assert_eq!(value["phases"]["actions"]["subphases"], json!({}));
        assert_eq!(value["metadata"]["platformsData"], json!({}));
        assert_eq!(value["metadata"]["errors"], json!([]));
        assert_eq!(value["metadata"]["executionTime"], json!(0));
        assert_eq!(value["metadata"]["startTime"], json!(doc.created_at));
    }

    #[test]
    fn test_elapsed_secs_prefers_start_time() {
        let mut doc = two_phase_defaults().build(fixed_now());
        doc.created_at = "garbage".to_string();
        let later = fixed_now() + chrono::Duration::seconds(5);
        assert_eq!(doc.elapsed_secs(later), 5.0);
    }

    #[test]
    fn test_elapsed_secs_never_negative() {
        let mut doc = two_phase_defaults().build(fixed_now());
        let earlier = fixed_now() - chrono::Duration::seconds(30);
        assert_eq!(doc.elapsed_secs(earlier), 0.0);

        let later = fixed_now() + chrono::Duration::milliseconds(12_345);
        assert_eq!(doc.elapsed_secs(later), 12.35);

        doc.created_at = "garbage".to_string();
        doc.metadata.start_time = None;
        assert_eq!(doc.elapsed_secs(later), 0.0);
    }
}
