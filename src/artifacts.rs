//! Clearing and collecting the configured output files of a run.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Artifact name -> base64 content, `None` when the file was not produced.
pub type Artifacts = BTreeMap<String, Option<String>>;

/// Remove stale copies of the artifacts so they cannot pass for fresh output.
pub async fn clear(names: &[String], workspace: &Path) {
    debug!(workspace = %workspace.display(), "Removing old artifacts");

    for name in names {
        let path = workspace.join(name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "Artifact not removed");
        }
    }
}

/// Read and encode every artifact. A missing or unreadable file becomes `None`.
pub async fn collect(names: &[String], workspace: &Path) -> Artifacts {
    info!(workspace = %workspace.display(), count = names.len(), "Loading artifacts");

    let mut artifacts = Artifacts::new();
    for name in names {
        let path = workspace.join(name);
        let encoded = match tokio::fs::read(&path).await {
            Ok(data) => Some(STANDARD.encode(data)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read artifact");
                None
            }
        };
        artifacts.insert(name.clone(), encoded);
    }
    artifacts
}
