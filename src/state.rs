//! Shared application state.

use crate::config::Config;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable through which the agent publishes its id.
pub const AGENT_ID_ENV: &str = "AUCA_JUDGE_AGENT_ID";

/// Read-only state handed to every request handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub agent_id: Arc<str>,
    pub config: Arc<Config>,
    pub requests_root: Arc<PathBuf>,
}

impl AppState {
    pub fn new(agent_id: &str, config: Config, requests_root: PathBuf) -> Self {
        Self {
            agent_id: Arc::from(agent_id),
            config: Arc::new(config),
            requests_root: Arc::new(requests_root),
        }
    }
}
