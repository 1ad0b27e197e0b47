//! Initialization of a conductor job root.
//!
//! `conductor init` creates the following structure:
//!
//! ```text
//! <root>/
//! ├── conductor.toml   # Settings (written once, never overwritten)
//! ├── active/          # Jobs in progress, one directory per workflow id
//! ├── archive/         # Finished jobs
//! ├── workflows/       # User workflow templates (*.json)
//! └── logs/            # Log files when logging.to_file is set
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::conductor_config::{CONFIG_FILE_NAME, ConductorToml};

/// Subdirectories every job root has.
pub const ROOT_SUBDIRS: &[&str] = &["active", "archive", "workflows", "logs"];

/// Result of initializing a job root.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the job root
    pub root: PathBuf,
    /// Whether the root was newly created (false if it already existed)
    pub created: bool,
    /// Whether a default conductor.toml was written
    pub config_written: bool,
}

/// Initialize a job root. Safe to run repeatedly; existing files are kept.
pub fn init_root(root: &Path) -> Result<InitResult> {
    let created = !root.exists();

    std::fs::create_dir_all(root)
        .with_context(|| format!("Failed to create directory: {}", root.display()))?;
    ensure_directory_structure(root)?;

    let config_path = root.join(CONFIG_FILE_NAME);
    let config_written = if config_path.exists() {
        false
    } else {
        std::fs::write(&config_path, ConductorToml::default_file_contents()).with_context(
            || format!("Failed to create {}: {}", CONFIG_FILE_NAME, config_path.display()),
        )?;
        true
    };

    Ok(InitResult {
        root: root.to_path_buf(),
        created,
        config_written,
    })
}

/// Ensure all required subdirectories exist.
fn ensure_directory_structure(root: &Path) -> Result<()> {
    for name in ROOT_SUBDIRS {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {} directory: {}", name, dir.display()))?;
    }
    Ok(())
}

/// Check if a job root has been initialized.
pub fn is_initialized(root: &Path) -> bool {
    root.join(CONFIG_FILE_NAME).is_file() && ROOT_SUBDIRS.iter().all(|d| root.join(d).is_dir())
}
