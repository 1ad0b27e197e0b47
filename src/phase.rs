//! Workflow templates: named phase lists used to start a job.
//!
//! This module provides:
//! - `PhaseDefinition` describing one phase of a template
//! - `WorkflowTemplate` with the built-in `blog` and `project` workflows
//! - `TemplateRegistry` loading user templates from `<root>/workflows/*.json`
//! - `{variable}` interpolation for outputs, collaborators, inputs and fields
//! - variable rules (allowed values, minimum length) and derived variables

use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::orchestrator::document::{COMPLETE, PhaseSeed, WorkflowDefaults};
use crate::orchestrator::runner::PhaseStep;

/// Variables available to every template: the job subject plus template
/// defaults and caller overrides.
pub type Variables = BTreeMap<String, String>;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is a valid static regex")
});

static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(?:-[a-z0-9]+)*$").expect("prefix pattern is a valid static regex")
});

/// A single phase of a workflow template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseDefinition {
    pub name: String,
    /// Collaborator that performs the phase. Without one the phase can only
    /// complete through its output already existing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborator: Option<String>,
    /// Artifact the phase produces, relative to the job directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Payload handed to the collaborator.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    /// Marked complete when the job is created.
    #[serde(default)]
    pub initially_complete: bool,
    /// Seed an empty `agents` map for collaborators fanning out under the phase.
    #[serde(default)]
    pub tracks_agents: bool,
    /// Seed an empty `subphases` map.
    #[serde(default)]
    pub tracks_subphases: bool,
}

impl PhaseDefinition {
    pub fn new(name: &str, collaborator: Option<&str>, output: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            collaborator: collaborator.map(str::to_string),
            output: output.map(str::to_string),
            input: Value::Null,
            initially_complete: false,
            tracks_agents: false,
            tracks_subphases: false,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn completed(mut self) -> Self {
        self.initially_complete = true;
        self
    }

    pub fn with_agents(mut self) -> Self {
        self.tracks_agents = true;
        self
    }

    pub fn with_subphases(mut self) -> Self {
        self.tracks_subphases = true;
        self
    }

    fn seed(&self, vars: &Variables) -> PhaseSeed {
        let output = self.output.as_deref().map(|o| interpolate(o, vars));
        let mut seed = PhaseSeed::new(&self.name, output.as_deref());
        if self.initially_complete {
            seed = seed.completed();
        }
        if self.tracks_agents {
            seed = seed.with_agents();
        }
        if self.tracks_subphases {
            seed = seed.with_subphases();
        }
        seed
    }
}

/// Constraints checked against a variable before a job starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VariableRule {
    /// Accepted values. Empty accepts anything.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    /// Minimum length in characters, ignoring surrounding whitespace.
    #[serde(default)]
    pub min_len: usize,
}

impl VariableRule {
    pub fn one_of(values: &[&str]) -> Self {
        Self {
            allowed: values.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn min_len(min_len: usize) -> Self {
        Self {
            min_len,
            ..Default::default()
        }
    }
}

/// A variable looked up from another variable's value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DerivedVariable {
    pub from: String,
    pub values: BTreeMap<String, String>,
}

impl DerivedVariable {
    pub fn new(from: &str, values: &[(&str, &str)]) -> Self {
        Self {
            from: from.to_string(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// A named, ordered phase list with seed metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Prefix of generated workflow ids, e.g. `proj`.
    pub id_prefix: String,
    pub phases: Vec<PhaseDefinition>,
    /// Metrics seeded into `metadata.metrics`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metrics: Map<String, Value>,
    /// Extra top-level document fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    /// Extra `metadata` fields, such as an empty `platformsData` map.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Default variable values, overridable per job.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: Variables,
    /// Checks applied to resolved variables, `subject` included.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rules: BTreeMap<String, VariableRule>,
    /// Variables computed from other variables unless the caller sets them.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub derived: BTreeMap<String, DerivedVariable>,
}

impl WorkflowTemplate {
    /// Load a template from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template file: {}", path.display()))?;

        let template: WorkflowTemplate = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse template JSON: {}", path.display()))?;

        Ok(template)
    }

    /// Save the template as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize template to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write template file: {}", path.display()))?;

        Ok(())
    }

    pub fn get_phase(&self, name: &str) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Merge template defaults, caller overrides and the subject, then fill in
    /// derived variables the caller did not set.
    pub fn resolve_variables(&self, subject: &str, overrides: &Variables) -> Variables {
        let mut vars = self.variables.clone();
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.insert("subject".to_string(), subject.to_string());
        for (name, derived) in &self.derived {
            if overrides.contains_key(name) {
                continue;
            }
            if let Some(value) = vars.get(&derived.from).and_then(|v| derived.values.get(v)) {
                vars.insert(name.clone(), value.clone());
            }
        }
        vars
    }

    /// Check resolved variables against the template's rules. Returns one
    /// message per problem.
    pub fn check_variables(&self, vars: &Variables) -> Vec<String> {
        let mut problems = Vec::new();

        for (name, rule) in &self.rules {
            let value = vars.get(name).map(String::as_str).unwrap_or_default();
            if value.trim().chars().count() < rule.min_len {
                problems.push(format!(
                    "'{}' must be at least {} characters",
                    name, rule.min_len
                ));
            }
            if !rule.allowed.is_empty() && !rule.allowed.iter().any(|a| a == value) {
                problems.push(format!(
                    "Invalid {} '{}'. Allowed: {}",
                    name,
                    value,
                    rule.allowed.join(", ")
                ));
            }
        }

        for (name, derived) in &self.derived {
            if vars.contains_key(name) {
                continue;
            }
            let source = vars.get(&derived.from).map(String::as_str).unwrap_or_default();
            problems.push(format!(
                "No value for '{}' when {} is '{}'",
                name, derived.from, source
            ));
        }

        problems
    }

    /// Build the initial document defaults for a job.
    ///
    /// The template name and resolved variables are stored as top-level
    /// fields so the job can be resumed with the same steps.
    pub fn defaults(&self, subject: &str, vars: &Variables) -> WorkflowDefaults {
        let mut defaults = WorkflowDefaults::new(&self.id_prefix, subject);
        for phase in &self.phases {
            defaults = defaults.with_seed(phase.seed(vars));
        }
        for (name, value) in &self.metrics {
            defaults = defaults.with_metric(name, value.clone());
        }
        for (key, value) in &self.metadata {
            defaults = defaults.with_metadata(key, interpolate_value(value, vars));
        }

        defaults = defaults.with_field("template", self.name.as_str());
        for (key, value) in &self.fields {
            defaults = defaults.with_field(key, interpolate_value(value, vars));
        }
        let stored: Map<String, Value> = vars
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();
        defaults.with_field("variables", Value::Object(stored))
    }

    /// Runner steps for every phase, with variables applied.
    pub fn steps(&self, vars: &Variables) -> Vec<PhaseStep> {
        self.phases
            .iter()
            .map(|phase| {
                let mut step = PhaseStep::new(phase.name.clone())
                    .with_input(interpolate_value(&phase.input, vars));
                if let Some(collaborator) = &phase.collaborator {
                    step = step.with_collaborator(interpolate(collaborator, vars));
                }
                step
            })
            .collect()
    }

    /// Check the template for problems. Returns one message per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("Template name is empty".to_string());
        }
        if !PREFIX_RE.is_match(&self.id_prefix) {
            problems.push(format!(
                "Invalid id prefix '{}': use lowercase letters, digits and dashes",
                self.id_prefix
            ));
        }
        if self.phases.is_empty() {
            problems.push(format!("Template '{}' declares no phases", self.name));
        }

        let mut seen = std::collections::HashSet::new();
        for phase in &self.phases {
            if phase.name.trim().is_empty() {
                problems.push("Phase with empty name".to_string());
            } else if phase.name == COMPLETE {
                problems.push(format!("Phase name '{}' is reserved", COMPLETE));
            }
            if !seen.insert(phase.name.as_str()) {
                problems.push(format!("Duplicate phase '{}'", phase.name));
            }
            if phase.collaborator.is_none() && phase.output.is_none() && !phase.initially_complete
            {
                problems.push(format!(
                    "Phase '{}' has neither a collaborator nor an output and can never complete",
                    phase.name
                ));
            }
        }

        for (name, derived) in &self.derived {
            let allowed = self
                .rules
                .get(&derived.from)
                .map(|rule| rule.allowed.as_slice())
                .unwrap_or_default();
            for value in allowed {
                if !derived.values.contains_key(value) {
                    problems.push(format!(
                        "Derived variable '{}' has no value for {} '{}'",
                        name, derived.from, value
                    ));
                }
            }
        }

        problems
    }

    /// Built-in blog post workflow.
    pub fn blog() -> Self {
        Self {
            name: "blog".to_string(),
            description: "Research, write, optimize and publish a blog post".to_string(),
            id_prefix: "proj".to_string(),
            phases: vec![
                PhaseDefinition::new("initialization", None, Some("state.json")).completed(),
                PhaseDefinition::new(
                    "research",
                    Some("blog-trend-researcher"),
                    Some("research-findings.json"),
                )
                .with_input(json!({"topic": "{subject}", "contentType": "{content_type}"})),
                PhaseDefinition::new(
                    "synthesis",
                    Some("blog-insight-synthesizer"),
                    Some("content-outline.md"),
                )
                .with_input(json!({"contentType": "{content_type}"})),
                PhaseDefinition::new("writing", Some("{writer}"), Some("draft-{content_type}.md")),
                PhaseDefinition::new(
                    "seo",
                    Some("seo-content-optimizer"),
                    Some("seo-optimized-draft.md"),
                ),
                PhaseDefinition::new("review", Some("style-guardian"), Some("polished-draft.md")),
                PhaseDefinition::new(
                    "publishing",
                    Some("sanity-publisher"),
                    Some("sanity-ready-post.md"),
                )
                .with_input(json!({"publishingMode": "{publishing_mode}"})),
            ],
            metrics: seed_metrics(&["wordCount", "seoScore", "styleScore"]),
            fields: json_object(json!({
                "contentType": "{content_type}",
                "publishingMode": "{publishing_mode}",
            })),
            metadata: Map::new(),
            variables: Variables::from([
                ("content_type".to_string(), "tech".to_string()),
                ("publishing_mode".to_string(), "markdown".to_string()),
            ]),
            rules: BTreeMap::from([
                ("subject".to_string(), VariableRule::min_len(3)),
                (
                    "content_type".to_string(),
                    VariableRule::one_of(&["tech", "personal-dev"]),
                ),
                (
                    "publishing_mode".to_string(),
                    VariableRule::one_of(&["markdown", "api", "ask-user"]),
                ),
            ]),
            derived: BTreeMap::from([(
                "writer".to_string(),
                DerivedVariable::new(
                    "content_type",
                    &[
                        ("tech", "tech-blogger-writer"),
                        ("personal-dev", "personal-dev-writer"),
                    ],
                ),
            )]),
        }
    }

    /// Built-in multi-platform project sync workflow.
    pub fn project() -> Self {
        let phase = |name: &str, output: &str| {
            PhaseDefinition::new(name, Some(format!("project-{}", name).as_str()), Some(output))
                .with_input(json!({"platforms": "{platforms}"}))
        };
        Self {
            name: "project".to_string(),
            description: "Discover, analyze and synchronize work across project platforms"
                .to_string(),
            id_prefix: "workflow".to_string(),
            phases: vec![
                phase("initialization", "state.json").completed(),
                phase("discovery", "discovery.json").with_agents(),
                phase("analysis", "analysis.json"),
                phase("actions", "actions.json").with_subphases(),
                phase("synchronization", "sync-results.json"),
                phase("reporting", "report.md"),
            ],
            metrics: seed_metrics(&[
                "tasksCreated",
                "tasksUpdated",
                "tasksCompleted",
                "reportsGenerated",
                "monitoringEventsProcessed",
                "apiCallsMade",
                "apiSuccessRate",
            ]),
            fields: json_object(json!({"platforms": "{platforms}"})),
            metadata: json_object(json!({"platformsData": {}})),
            variables: Variables::from([(
                "platforms".to_string(),
                "clickup,github,plane".to_string(),
            )]),
            rules: BTreeMap::new(),
            derived: BTreeMap::new(),
        }
    }
}

fn seed_metrics(names: &[&str]) -> Map<String, Value> {
    names
        .iter()
        .map(|name| (name.to_string(), Value::from(0)))
        .collect()
}

fn json_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Replace `{name}` placeholders with their values. Unknown placeholders are kept.
pub fn interpolate(text: &str, vars: &Variables) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Apply [`interpolate`] to every string inside a JSON value.
pub fn interpolate_value(value: &Value, vars: &Variables) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Parse `key=value` pairs as given on the command line.
pub fn parse_variables(pairs: &[String]) -> Result<Variables> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("Invalid variable '{}': expected key=value", pair))?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("Invalid variable '{}': empty key", pair);
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Built-in templates plus user templates, by name.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: IndexMap<String, WorkflowTemplate>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRegistry {
    pub fn builtin() -> Self {
        let templates = [WorkflowTemplate::blog(), WorkflowTemplate::project()]
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        Self { templates }
    }

    /// Built-ins overlaid with every `*.json` file in `dir`, in file name order.
    ///
    /// A missing directory yields just the built-ins.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut registry = Self::builtin();
        if !dir.is_dir() {
            return Ok(registry);
        }

        let pattern = dir.join("*.json");
        let pattern = pattern
            .to_str()
            .with_context(|| format!("Template directory is not valid UTF-8: {}", dir.display()))?;
        let mut paths: Vec<_> = glob::glob(pattern)
            .context("Invalid template glob pattern")?
            .filter_map(|entry| entry.ok())
            .collect();
        paths.sort();

        for path in paths {
            let template = WorkflowTemplate::load(&path)?;
            tracing::debug!(name = %template.name, path = %path.display(), "Loaded workflow template");
            registry.insert(template);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, template: WorkflowTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowTemplate> {
        self.templates.get(name)
    }

    /// Like [`get`](Self::get) but with an error naming the available templates.
    pub fn require(&self, name: &str) -> Result<&WorkflowTemplate> {
        self.get(name).with_context(|| {
            format!(
                "Unknown template '{}'. Available: {}",
                name,
                self.names().join(", ")
            )
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkflowTemplate> {
        self.templates.values()
    }
}
