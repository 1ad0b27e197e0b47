//! Moving finished jobs out of `active/`.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::state::StateStore;
use crate::errors::ArchiveError;

/// Move `job_dir` to `<archive_root>/<id>` with a single rename.
///
/// Refuses to overwrite an existing destination. The source is never copied
/// or deleted; on any failure it stays where it was.
pub fn archive_job(job_dir: &Path, archive_root: &Path, id: &str) -> Result<PathBuf, ArchiveError> {
    if !job_dir.is_dir() {
        return Err(ArchiveError::MissingSource {
            path: job_dir.to_path_buf(),
        });
    }

    let destination = archive_root.join(id);
    if destination.exists() {
        return Err(ArchiveError::Conflict { destination });
    }

    let io_error = |source: std::io::Error| ArchiveError::Io {
        from: job_dir.to_path_buf(),
        to: destination.clone(),
        source,
    };
    fs::create_dir_all(archive_root).map_err(io_error)?;
    fs::rename(job_dir, &destination).map_err(io_error)?;

    info!(id, destination = %destination.display(), "Job archived");
    Ok(destination)
}

/// Complete the workflow, then archive its job directory.
///
/// Consumes the store: once archived its path no longer exists.
pub fn complete_and_archive(
    mut store: StateStore,
    archive_root: &Path,
) -> anyhow::Result<PathBuf> {
    store.complete_workflow()?;
    let destination = archive_job(store.job_dir(), archive_root, store.id())?;
    Ok(destination)
}

/// Whether a finished job can be archived without conflict.
pub fn can_archive(archive_root: &Path, id: &str) -> bool {
    !archive_root.join(id).exists()
}
