//! Writing request files into a workspace.

use crate::error::{AgentError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::{debug, error, info};

/// Name -> base64 content, as sent by the caller.
pub type InputFiles = BTreeMap<String, String>;

const FILE_MODE: u32 = 0o700;

/// Reduce a name to its final path component.
///
/// Returns `None` for names with no usable final component (`..`, `/`, empty).
pub fn bare_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
}

/// Decode and write every file into `dir`, returning how many were written.
///
/// Stops at the first failure; files written before it stay on disk until the
/// workspace is removed. Names colliding after sanitization overwrite each
/// other in map order.
pub fn write_files(files: &InputFiles, dir: &Path) -> Result<usize> {
    info!(dir = %dir.display(), count = files.len(), "Saving request files");

    for (name, encoded) in files {
        let data = STANDARD.decode(encoded).map_err(|source| {
            error!(file = %name, error = %source, "Failed to decode request file");
            AgentError::Decode {
                name: name.clone(),
                source,
            }
        })?;

        let bare = bare_name(name).ok_or_else(|| {
            error!(file = %name, "Request file name has no final component");
            AgentError::InvalidFileName(name.clone())
        })?;
        let path = dir.join(&bare);

        write_owner_only(&path, &data).map_err(|source| {
            error!(file = %name, path = %path.display(), error = %source, "Failed to write request file");
            AgentError::Write {
                path: path.clone(),
                source,
            }
        })?;
        debug!(file = %name, path = %path.display(), bytes = data.len(), "Wrote request file");
    }

    Ok(files.len())
}

fn write_owner_only(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)?;
    file.write_all(data)
}
