//! Integration tests for conductor
//!
//! These tests drive the binary end to end against temporary job roots.
//! Collaborators are plain `sh` snippets configured in conductor.toml.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const JOB_ID: &str = "proj-2026-01-05-093000";

/// Helper to create a conductor Command isolated from the caller's environment
fn conductor() -> Command {
    let mut cmd = cargo_bin_cmd!("conductor");
    cmd.env_remove("CONDUCTOR_ROOT")
        .env_remove("CONDUCTOR_MAX_ATTEMPTS")
        .env_remove("CONDUCTOR_RETRY_DELAY_SECS")
        .env_remove("RUST_LOG");
    cmd
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn root(dir: &TempDir) -> PathBuf {
    dir.path().join(".conductor")
}

/// Helper to initialize a job root in a temp directory
fn init_root(dir: &TempDir) {
    conductor()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

fn write_config(dir: &TempDir, content: &str) {
    fs::write(root(dir).join("conductor.toml"), content).unwrap();
}

/// A two-phase template whose collaborators are `writer` and `reviewer`.
fn write_mini_template(dir: &TempDir) {
    let template = json!({
        "name": "mini",
        "description": "Draft then review",
        "id_prefix": "mini",
        "phases": [
            {"name": "draft", "collaborator": "writer", "output": "draft-{subject}.md"},
            {"name": "review", "collaborator": "reviewer", "output": "review.md"}
        ],
        "metrics": {"wordCount": 0}
    });
    fs::write(
        root(dir).join("workflows/mini.json"),
        serde_json::to_string_pretty(&template).unwrap(),
    )
    .unwrap();
}

const WORKING_COLLABORATORS: &str = r#"
[collaborators.writer]
command = "printf 'draft for %s' \"$CONDUCTOR_JOB_ID\" > \"$CONDUCTOR_OUTPUT\""

[collaborators.reviewer]
command = "printf ok > review.md; echo '{\"artifact\": \"review.md\"}'"
"#;

fn job_ids(dir: &Path) -> Vec<String> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut ids: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    ids.sort();
    ids
}

fn read_state(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// Write a hand-made job into active/ so single-operation commands have a target.
fn seed_job(dir: &TempDir) -> PathBuf {
    let job_dir = root(dir).join("active").join(JOB_ID);
    fs::create_dir_all(&job_dir).unwrap();
    let state = json!({
        "id": JOB_ID,
        "subject": "rust error handling",
        "status": "research",
        "createdAt": "2026-01-05T09:30:00.000000Z",
        "completedAt": null,
        "phases": {
            "research": {"status": "in_progress", "output": "research-findings.json"},
            "writing": {"status": "pending", "output": "draft-tech.md"}
        },
        "metadata": {"metrics": {"wordCount": 0}, "errors": []},
        "owner": "docs-team"
    });
    let path = job_dir.join("state.json");
    fs::write(&path, serde_json::to_string_pretty(&state).unwrap()).unwrap();
    path
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_conductor_help() {
        conductor().arg("--help").assert().success();
    }

    #[test]
    fn test_conductor_version() {
        conductor().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_project();

        conductor()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized conductor root"));

        for sub in ["active", "archive", "workflows", "logs"] {
            assert!(root(&dir).join(sub).is_dir(), "{} missing", sub);
        }
        assert!(root(&dir).join("conductor.toml").is_file());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_project();
        init_root(&dir);

        conductor()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_root_from_environment() {
        let dir = create_temp_project();
        let custom = dir.path().join("jobs");

        conductor()
            .current_dir(dir.path())
            .env("CONDUCTOR_ROOT", &custom)
            .arg("init")
            .assert()
            .success();

        assert!(custom.join("active").is_dir());
        assert!(!root(&dir).exists());
    }

    #[test]
    fn test_templates_lists_builtins_and_user_templates() {
        let dir = create_temp_project();
        init_root(&dir);
        write_mini_template(&dir);

        conductor()
            .current_dir(dir.path())
            .arg("templates")
            .assert()
            .success()
            .stdout(predicate::str::contains("blog"))
            .stdout(predicate::str::contains("project"))
            .stdout(predicate::str::contains("mini"))
            .stdout(predicate::str::contains("draft → review"));
    }

    #[test]
    fn test_status_without_jobs() {
        let dir = create_temp_project();
        init_root(&dir);

        conductor()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No jobs"));
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();

        conductor()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No conductor.toml found"))
            .stdout(predicate::str::contains("max_attempts = 3"));
    }

    #[test]
    fn test_config_show_reflects_env_override() {
        let dir = create_temp_project();
        init_root(&dir);

        conductor()
            .current_dir(dir.path())
            .env("CONDUCTOR_MAX_ATTEMPTS", "7")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_attempts = 7"));
    }

    #[test]
    fn test_config_init_creates_toml() {
        let dir = create_temp_project();

        conductor()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created conductor.toml"));

        assert!(root(&dir).join("conductor.toml").exists());

        conductor()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_no_config() {
        let dir = create_temp_project();

        conductor()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Using defaults (valid)"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        init_root(&dir);
        write_config(
            &dir,
            "[defaults]\nmax_attempts = 0\n\n[collaborators.writer]\ncommand = \"\"\n",
        );

        conductor()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings"))
            .stdout(predicate::str::contains("Collaborator 'writer' has an empty command"));
    }

    #[test]
    fn test_invalid_config_fails() {
        let dir = create_temp_project();
        init_root(&dir);
        write_config(&dir, "[defaults\n");

        conductor()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("conductor.toml"));
    }

    #[test]
    fn test_invalid_env_override_fails() {
        let dir = create_temp_project();

        conductor()
            .current_dir(dir.path())
            .env("CONDUCTOR_RETRY_DELAY_SECS", "soon")
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("CONDUCTOR_RETRY_DELAY_SECS"));
    }
}

// =============================================================================
// Running Jobs
// =============================================================================

mod running {
    use super::*;

    #[test]
    fn test_start_runs_and_archives() {
        let dir = create_temp_project();
        init_root(&dir);
        write_mini_template(&dir);
        write_config(&dir, WORKING_COLLABORATORS);

        conductor()
            .current_dir(dir.path())
            .args(["start", "mini", "--subject", "rust"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Archived to"))
            .stdout(predicate::str::contains("complete (2 run, 0 skipped)"));

        assert!(job_ids(&root(&dir).join("active")).is_empty());
        let archived = job_ids(&root(&dir).join("archive"));
        assert_eq!(archived.len(), 1);
        let id = &archived[0];
        assert!(id.starts_with("mini-"));

        let job_dir = root(&dir).join("archive").join(id);
        let state = read_state(&job_dir.join("state.json"));
        assert_eq!(state["status"], "complete");
        assert_eq!(state["phases"]["draft"]["status"], "complete");
        assert_eq!(state["phases"]["draft"]["output"], "draft-rust.md");
        assert_eq!(state["phases"]["review"]["status"], "complete");
        assert_eq!(state["template"], "mini");
        assert_eq!(state["variables"]["subject"], "rust");
        assert_eq!(state["metadata"]["metrics"]["wordCount"], 0);
        assert!(state["completedAt"].is_string());
        assert!(state["metadata"]["executionTime"].is_number());

        let draft = fs::read_to_string(job_dir.join("draft-rust.md")).unwrap();
        assert_eq!(draft, format!("draft for {}", id));
    }

    #[test]
    fn test_start_no_archive_keeps_job_active() {
        let dir = create_temp_project();
        init_root(&dir);
        write_mini_template(&dir);
        write_config(&dir, WORKING_COLLABORATORS);

        conductor()
            .current_dir(dir.path())
            .args(["start", "mini", "--subject", "rust", "--no-archive"])
            .assert()
            .success();

        let active = job_ids(&root(&dir).join("active"));
        assert_eq!(active.len(), 1);
        let state = read_state(&root(&dir).join("active").join(&active[0]).join("state.json"));
        assert_eq!(state["status"], "complete");
    }

    #[test]
    fn test_failing_collaborator_exhausts_attempts() {
        let dir = create_temp_project();
        init_root(&dir);
        write_mini_template(&dir);
        write_config(
            &dir,
            r#"
[collaborators.writer]
command = "echo 'model unavailable' >&2; exit 3"

[collaborators.reviewer]
command = "true"
"#,
        );

        conductor()
            .current_dir(dir.path())
            .args([
                "start",
                "mini",
                "--subject",
                "rust",
                "--max-attempts",
                "2",
                "--retry-delay",
                "0",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("stopped at phase 'draft'"))
            .stderr(predicate::str::contains("model unavailable"))
            .stderr(predicate::str::contains("failed after 2 attempt(s)"));

        let active = job_ids(&root(&dir).join("active"));
        assert_eq!(active.len(), 1);
        let state = read_state(&root(&dir).join("active").join(&active[0]).join("state.json"));
        assert_eq!(state["status"], "draft");
        assert_eq!(state["phases"]["draft"]["status"], "error");
        assert_eq!(state["phases"]["review"]["status"], "pending");

        let errors = state["metadata"]["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        for (attempt, entry) in errors.iter().enumerate() {
            assert_eq!(entry["phase"], "draft");
            assert_eq!(entry["workflowId"], active[0].as_str());
            assert_eq!(entry["error"]["attempt"], attempt as u64 + 1);
            assert_eq!(entry["error"]["collaborator"], "writer");
        }
    }

    #[test]
    fn test_missing_collaborator_command_fails() {
        let dir = create_temp_project();
        init_root(&dir);
        write_mini_template(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["start", "mini", "--subject", "x", "--max-attempts", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "no command configured for collaborator 'writer'",
            ));
    }

    #[test]
    fn test_resume_after_fix_skips_existing_output() {
        let dir = create_temp_project();
        init_root(&dir);
        write_mini_template(&dir);
        write_config(
            &dir,
            r#"
[collaborators.writer]
command = "printf text > \"$CONDUCTOR_OUTPUT\""

[collaborators.reviewer]
command = "exit 1"
"#,
        );

        conductor()
            .current_dir(dir.path())
            .args(["start", "mini", "--subject", "rust", "--max-attempts", "1"])
            .assert()
            .failure();

        let id = job_ids(&root(&dir).join("active")).remove(0);
        write_config(&dir, "[collaborators.reviewer]\ncommand = \"printf ok > review.md\"\n");

        conductor()
            .current_dir(dir.path())
            .args(["resume", &id, "--retry-delay", "0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("complete (1 run, 1 skipped)"));

        let state = read_state(&root(&dir).join("archive").join(&id).join("state.json"));
        assert_eq!(state["status"], "complete");
        assert_eq!(state["phases"]["review"]["status"], "complete");
        assert_eq!(state["metadata"]["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_resume_unknown_job_fails() {
        let dir = create_temp_project();
        init_root(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["resume", "proj-2026-01-01-000000"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No job 'proj-2026-01-01-000000'"));
    }

    #[test]
    fn test_start_unknown_template_fails() {
        let dir = create_temp_project();
        init_root(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["start", "podcast", "--subject", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown template 'podcast'"))
            .stderr(predicate::str::contains("blog"));
    }

    #[test]
    fn test_start_rejects_malformed_variable() {
        let dir = create_temp_project();
        init_root(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["start", "blog", "--subject", "x", "--var", "content_type"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected key=value"));
    }

    #[test]
    fn test_start_blog_rejects_invalid_input() {
        let dir = create_temp_project();
        init_root(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["start", "blog", "--subject", " ab "])
            .assert()
            .failure()
            .stderr(predicate::str::contains("'subject' must be at least 3 characters"));

        conductor()
            .current_dir(dir.path())
            .args(["start", "blog", "--subject", "Rust async", "--var", "content_type=bogus"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid content_type 'bogus'"));

        conductor()
            .current_dir(dir.path())
            .args(["start", "blog", "--subject", "Rust async", "--var", "publishing_mode=email"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("markdown, api, ask-user"));

        assert!(job_ids(&root(&dir).join("active")).is_empty());
    }
}

// =============================================================================
// Job Operations
// =============================================================================

mod job_operations {
    use super::*;

    #[test]
    fn test_status_shows_job() {
        let dir = create_temp_project();
        init_root(&dir);
        seed_job(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["status", JOB_ID])
            .assert()
            .success()
            .stdout(predicate::str::contains("rust error handling"))
            .stdout(predicate::str::contains("research"))
            .stdout(predicate::str::contains("wordCount = 0"));

        conductor()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains(JOB_ID))
            .stdout(predicate::str::contains("active"));
    }

    #[test]
    fn test_status_json() {
        let dir = create_temp_project();
        init_root(&dir);
        seed_job(&dir);

        let output = conductor()
            .current_dir(dir.path())
            .args(["status", JOB_ID, "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(summary["id"], JOB_ID);
        assert_eq!(summary["inProgress"], json!(["research"]));
        assert_eq!(summary["pending"], json!(["writing"]));
        assert_eq!(summary["errorCount"], 0);
    }

    #[test]
    fn test_phase_transition_preserves_unknown_fields() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["phase", JOB_ID, "research", "complete"])
            .assert()
            .success();
        conductor()
            .current_dir(dir.path())
            .args(["phase", JOB_ID, "writing", "in_progress", "--output", "draft.md"])
            .assert()
            .success();

        let state = read_state(&path);
        assert_eq!(state["phases"]["research"]["status"], "complete");
        assert_eq!(state["phases"]["writing"]["status"], "in_progress");
        assert_eq!(state["phases"]["writing"]["output"], "draft.md");
        assert_eq!(state["status"], "writing");
        assert_eq!(state["owner"], "docs-team");
    }

    #[test]
    fn test_phase_rejects_unknown_phase_and_status() {
        let dir = create_temp_project();
        init_root(&dir);
        seed_job(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["phase", JOB_ID, "publishing", "complete"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("publishing"));

        conductor()
            .current_dir(dir.path())
            .args(["phase", JOB_ID, "research", "done"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid phase status 'done'"));
    }

    #[test]
    fn test_phase_add() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["phase", JOB_ID, "publishing", "pending", "--add", "--output", "post.md"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Added phase 'publishing'"));

        let state = read_state(&path);
        let names: Vec<&String> = state["phases"].as_object().unwrap().keys().collect();
        assert_eq!(names, ["research", "writing", "publishing"]);
        assert_eq!(state["phases"]["publishing"]["output"], "post.md");
    }

    #[test]
    fn test_agent_and_subphase_statuses() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["agent", JOB_ID, "research", "trend-a", "in_progress"])
            .assert()
            .success();
        conductor()
            .current_dir(dir.path())
            .args(["agent", JOB_ID, "research", "trend-a", "complete"])
            .assert()
            .success()
            .stdout(predicate::str::contains("all agents complete"));
        conductor()
            .current_dir(dir.path())
            .args(["subphase", JOB_ID, "writing", "intro", "complete"])
            .assert()
            .success();

        let state = read_state(&path);
        assert_eq!(state["phases"]["research"]["agents"]["trend-a"], "complete");
        assert_eq!(state["phases"]["writing"]["subphases"]["intro"], "complete");
        assert_eq!(state["status"], "research");
    }

    #[test]
    fn test_metric_set_and_increment() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["metric", JOB_ID, "wordCount", "1200"])
            .assert()
            .success();
        conductor()
            .current_dir(dir.path())
            .args(["metric", JOB_ID, "wordCount", "-200", "--increment"])
            .assert()
            .success()
            .stdout(predicate::str::contains("wordCount = 1000"));
        conductor()
            .current_dir(dir.path())
            .args(["metric", JOB_ID, "apiCallsMade", "1", "--increment"])
            .assert()
            .success();

        let state = read_state(&path);
        assert_eq!(state["metadata"]["metrics"]["wordCount"], 1000);
        assert_eq!(state["metadata"]["metrics"]["apiCallsMade"], 1);
    }

    #[test]
    fn test_error_log_is_append_only() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);

        for message in ["first", "second"] {
            conductor()
                .current_dir(dir.path())
                .args(["error", JOB_ID, "research", message])
                .assert()
                .success();
        }

        let state = read_state(&path);
        let errors = state["metadata"]["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["error"], "first");
        assert_eq!(errors[1]["error"], "second");
        assert_eq!(errors[1]["workflowId"], JOB_ID);
        assert_eq!(errors[1]["phase"], "research");
    }

    #[test]
    fn test_validate() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["validate", JOB_ID])
            .assert()
            .success()
            .stdout(predicate::str::contains("is valid"));

        let mut state = read_state(&path);
        state["phases"]["writing"]["status"] = json!("finished");
        fs::write(&path, serde_json::to_string(&state).unwrap()).unwrap();

        conductor()
            .current_dir(dir.path())
            .args(["validate", JOB_ID])
            .assert()
            .failure()
            .stdout(predicate::str::contains("Invalid status for phase writing"));
    }

    #[test]
    fn test_complete_sweeps_and_archives() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["phase", JOB_ID, "writing", "error"])
            .assert()
            .success();
        conductor()
            .current_dir(dir.path())
            .args(["complete", JOB_ID, "--archive"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Archived to"));

        assert!(!path.exists());
        let state = read_state(&root(&dir).join("archive").join(JOB_ID).join("state.json"));
        assert_eq!(state["status"], "complete");
        assert_eq!(state["phases"]["research"]["status"], "complete");
        assert_eq!(state["phases"]["writing"]["status"], "error");

        // Archived jobs are read-only
        conductor()
            .current_dir(dir.path())
            .args(["metric", JOB_ID, "wordCount", "5"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("archived"));

        conductor()
            .current_dir(dir.path())
            .args(["status", JOB_ID])
            .assert()
            .success()
            .stdout(predicate::str::contains("(archived)"));
    }

    #[test]
    fn test_platform_data() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);

        conductor()
            .current_dir(dir.path())
            .args(["platform", JOB_ID, "github", r#"{"issues": 3}"#])
            .assert()
            .success()
            .stdout(predicate::str::contains("platform data updated for github"));
        conductor()
            .current_dir(dir.path())
            .args(["platform", JOB_ID, "clickup", "not json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not valid JSON"));

        let state = read_state(&path);
        assert_eq!(state["metadata"]["platformsData"], json!({"github": {"issues": 3}}));
        assert_eq!(state["owner"], "docs-team");
    }

    #[test]
    fn test_legacy_state_file_is_updated_in_place() {
        let dir = create_temp_project();
        init_root(&dir);
        let id = "workflow-2025-01-15-103000";
        let job_dir = root(&dir).join("active").join(id);
        fs::create_dir_all(&job_dir).unwrap();
        let raw = r#"{
  "workflowId": "workflow-2025-01-15-103000",
  "action": "sync",
  "status": "discovery",
  "createdAt": "2025-01-15T10:30:00.123456",
  "phases": {
    "discovery": {
      "status": "in_progress",
      "output": "",
      "agents": {}
    }
  },
  "metadata": {
    "executionTime": 0,
    "metrics": {
      "apiCallsMade": 0
    },
    "errors": []
  }
}"#;
        let path = job_dir.join("state.json");
        fs::write(&path, raw).unwrap();

        conductor()
            .current_dir(dir.path())
            .args(["metric", id, "apiCallsMade", "4", "--increment"])
            .assert()
            .success();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            raw.replace(r#""apiCallsMade": 0"#, r#""apiCallsMade": 4"#)
        );
    }

    #[test]
    fn test_schema_mismatch_is_reported_not_rewritten() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);
        let mut state = read_state(&path);
        state["phases"]["research"]["timestamp"] = json!(1735689600);
        let raw = serde_json::to_string_pretty(&state).unwrap();
        fs::write(&path, &raw).unwrap();

        conductor()
            .current_dir(dir.path())
            .args(["phase", JOB_ID, "research", "complete"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does not match the workflow document schema"));

        assert_eq!(fs::read_to_string(&path).unwrap(), raw);
    }

    #[test]
    fn test_complete_archive_conflict_keeps_job() {
        let dir = create_temp_project();
        init_root(&dir);
        let path = seed_job(&dir);
        fs::create_dir_all(root(&dir).join("archive").join(JOB_ID)).unwrap();

        conductor()
            .current_dir(dir.path())
            .args(["complete", JOB_ID, "--archive"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));

        assert!(path.exists());
        assert_eq!(read_state(&path)["status"], "complete");
    }
}
