use crate::orchestrator::runner::{RunObserver, SkipReason};
use crate::ui::icons::{CHECK, CROSS, RETRY, RUNNING, SKIP, SPARKLE};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a workflow run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Phase bar: how many phases have finished (completed or skipped)
/// - Attempt bar: spinner for the collaborator call in flight
///
/// Progress is driven entirely through the [`RunObserver`] callbacks.
pub struct RunUI {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    attempt_bar: ProgressBar,
    verbose: bool,
}

impl RunUI {
    /// Create the UI for a run of `total_phases` steps.
    pub fn new(total_phases: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let phase_bar = multi.add(ProgressBar::new(total_phases));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix(" Phases");

        let attempt_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let attempt_bar = multi.add(ProgressBar::new_spinner());
        attempt_bar.set_style(attempt_style);
        attempt_bar.set_prefix("Attempt");

        Self {
            multi,
            phase_bar,
            attempt_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Print the run header.
    pub fn print_header(&self, id: &str, template: &str, subject: &str) {
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} {} {}",
            SPARKLE,
            style(id).bold(),
            style(format!("({})", template)).dim()
        ));
        if !subject.is_empty() {
            self.print_line(format!("   {}", subject));
        }
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
    }

    /// Stop all bars. Call once the run has returned.
    pub fn finish(&self) {
        self.attempt_bar.finish_and_clear();
        self.phase_bar.finish();
    }
}

impl RunObserver for RunUI {
    fn phase_started(&self, phase: &str, _index: usize, _total: usize) {
        self.phase_bar
            .set_message(format!("{}", style(phase).yellow()));
    }

    fn phase_skipped(&self, phase: &str, reason: &SkipReason) {
        self.phase_bar.inc(1);
        let why = match reason {
            SkipReason::AlreadyComplete => "already complete".to_string(),
            SkipReason::OutputExists(path) => format!("output exists: {}", path.display()),
        };
        self.print_line(format!(
            "{} {} {}",
            SKIP,
            style(phase).dim(),
            style(format!("({})", why)).dim()
        ));
    }

    fn attempt_started(&self, phase: &str, attempt: u32, max_attempts: u32) {
        self.attempt_bar.reset();
        self.attempt_bar.set_message(format!(
            "{} {} {}/{}",
            style(phase).yellow(),
            style("attempt").dim(),
            style(attempt).cyan(),
            max_attempts
        ));
        self.attempt_bar
            .enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!(
                "{} {} attempt {}/{}",
                RUNNING, phase, attempt, max_attempts
            ));
        }
    }

    fn attempt_failed(&self, phase: &str, attempt: u32, reason: &str, retry_in: Duration) {
        self.attempt_bar.set_message(format!(
            "{} {} {}",
            style(phase).yellow(),
            style("waiting to retry").dim(),
            style(format!("({}s)", retry_in.as_secs())).dim()
        ));
        self.print_line(format!(
            "  {} {} attempt {} failed: {} {}",
            RETRY,
            style(phase).yellow(),
            attempt,
            reason,
            style(format!("(retrying in {}s)", retry_in.as_secs())).dim()
        ));
    }

    fn phase_completed(&self, phase: &str, artifact: Option<&str>) {
        self.attempt_bar.finish_and_clear();
        self.phase_bar.inc(1);
        let artifact = artifact
            .map(|a| format!(" {}", style(format!("→ {}", a)).dim()))
            .unwrap_or_default();
        self.print_line(format!(
            "{} {}{}",
            CHECK,
            style(phase).green().bold(),
            artifact
        ));
    }

    fn phase_failed(&self, phase: &str, attempts: u32, reason: &str) {
        self.attempt_bar.finish_and_clear();
        self.print_line(format!(
            "{} {} failed after {} attempt(s): {}",
            CROSS,
            style(phase).red().bold(),
            attempts,
            reason
        ));
    }
}
