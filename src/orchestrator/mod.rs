pub mod archive;
pub mod collaborator;
pub mod document;
pub mod runner;
pub mod state;

pub use archive::{archive_job, complete_and_archive};
pub use collaborator::{
    Collaborator, CollaboratorOutcome, CommandCollaborator, CommandSpec, Invocation,
};
pub use document::{
    COMPLETE, ErrorEntry, ErrorPayload, PhaseRecord, PhaseSeed, PhaseStatus, WorkflowDefaults,
    WorkflowDocument, generate_workflow_id, is_valid_workflow_id,
};
pub use runner::{
    NoopObserver, PhaseRunner, PhaseStep, RetryPolicy, RunObserver, RunOutcome, RunReport,
    Sleeper, SkipReason, ThreadSleeper,
};
pub use state::{StateStore, WorkflowSummary};
