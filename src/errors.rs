//! Typed error hierarchy for the conductor library.
//!
//! Two top-level enums cover the two failure domains:
//! - `StateError`: reading, mutating or persisting a workflow document
//! - `ArchiveError`: relocating a finished job into the archive root
//!
//! Collaborator failures are not errors. They are recorded in the document's
//! error log and reported through `RunOutcome`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the workflow state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file not found at {path}")]
    NotFound { path: PathBuf },

    #[error("State file at {path} is not a valid workflow document: {source}")]
    MalformedState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Valid JSON whose fields do not fit the workflow document schema.
    /// Never recovered by reinitializing: the file may be another tool's job.
    #[error("State file at {path} does not match the workflow document schema: {source}")]
    IncompatibleState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Metadata field '{field}' exists but is not a JSON object")]
    NotAnObject { field: String },

    #[error("Failed to read workflow state from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown phase '{phase}'")]
    UnknownPhase { phase: String },

    #[error("Field '{field}' is managed by the state store and cannot be set directly")]
    ReservedField { field: String },

    #[error("Failed to persist workflow state to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize workflow state: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StateError {
    /// Whether this error means the on-disk state could not be written.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::Serialize(_))
    }
}

/// Errors from moving a finished job into the archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive destination {destination} already exists")]
    Conflict { destination: PathBuf },

    #[error("Job directory {path} does not exist")]
    MissingSource { path: PathBuf },

    #[error("Failed to move {from} to {to}: {source}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
