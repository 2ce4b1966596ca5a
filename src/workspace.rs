//! Per-request workspace directories.
//!
//! Every request gets `<working root>/requests/<id>`. The directory is owned
//! by a [`Workspace`] guard. The handler releases it with
//! [`Workspace::close`], which removes the tree on the blocking pool; if the
//! handler exits any other way, dropping the guard removes it in place.

use crate::error::{AgentError, Result};
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub const REQUESTS_DIR: &str = "requests";

const DIR_MODE: u32 = 0o700;

/// Ensure the working root exists and start from an empty `requests/` tree.
///
/// Returns the requests root. Called once at startup; any error is fatal.
pub fn prepare_root(working_root: &Path) -> Result<PathBuf> {
    info!(path = %working_root.display(), "Preparing the working directory");

    create_dir(working_root)?;

    let requests_root = working_root.join(REQUESTS_DIR);
    remove_existing(&requests_root)?;
    create_dir(&requests_root)?;

    Ok(requests_root)
}

/// An isolated request directory, removed by `close` or on drop.
#[derive(Debug)]
pub struct Workspace {
    id: String,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh, empty directory for `id`, replacing any stale one.
    pub fn create(requests_root: &Path, id: &str) -> Result<Self> {
        let path = requests_root.join(id);
        info!(request_id = %id, path = %path.display(), "Creating request workspace");

        remove_existing(&path).inspect_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to remove stale request workspace");
        })?;
        create_dir(&path).inspect_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to create request workspace");
        })?;

        Ok(Self {
            id: id.to_string(),
            path,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the workspace without blocking the async runtime.
    pub async fn close(mut self) {
        let path = std::mem::take(&mut self.path);
        if let Err(e) = tokio::task::spawn_blocking(move || destroy(&path)).await {
            error!(request_id = %self.id, error = %e, "Workspace removal task failed");
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Emptied by `close`.
        if !self.path.as_os_str().is_empty() {
            destroy(&self.path);
        }
    }
}

/// Recursively remove a workspace. Failures are logged, never returned.
pub fn destroy(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "Removed request workspace"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Request workspace already gone");
        }
        Err(e) => error!(path = %path.display(), error = %e, "Failed to remove request workspace"),
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed existing directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(AgentError::Directory {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn create_dir(path: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
        .map_err(|source| AgentError::Directory {
            path: path.to_path_buf(),
            source,
        })
}
