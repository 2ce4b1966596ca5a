//! Judge agent - runs one configured command against files submitted over HTTP.
//!
//! Each `POST /process` request gets its own workspace directory, has its
//! files written there, runs the command, and answers with the exit status,
//! captured output and any configured artifacts. The workspace is removed
//! before the response leaves.

#[cfg(not(unix))]
compile_error!("judge-agent only works on Unix.");

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod files;
pub mod http_server;
pub mod state;
pub mod workspace;
