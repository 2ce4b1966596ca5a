//! Command-line flags.
//!
//! Every configuration flag is optional so that only flags actually passed
//! override values coming from configuration files.

use crate::config::{split_list, ConfigFile};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "judge-agent")]
#[command(about = "Runs one configured command against submitted files over HTTP")]
pub struct Args {
    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Command to start for every request
    #[arg(long)]
    pub command: Option<String>,

    /// Comma-separated arguments to the command
    #[arg(long, allow_hyphen_values = true)]
    pub arguments: Option<String>,

    /// Command line to run with `/bin/sh -c` instead of --command/--arguments
    #[arg(long, allow_hyphen_values = true)]
    pub shell: Option<String>,

    /// Directory holding the per-request workspaces
    #[arg(long = "working-directory", alias = "workingDirectory")]
    pub working_directory: Option<String>,

    /// Comma-separated list of generated files to send back
    #[arg(long)]
    pub artifacts: Option<String>,

    /// Kill the command after this many seconds (0 disables the limit)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// The flags as a configuration layer holding only what was passed.
    pub fn overrides(&self) -> ConfigFile {
        ConfigFile {
            port: self.port,
            command: self.command.clone(),
            arguments: self.arguments.as_deref().map(split_list),
            shell: self.shell.clone(),
            working_directory: self.working_directory.clone(),
            artifacts: self.artifacts.as_deref().map(split_list),
            timeout: self.timeout,
        }
    }
}
