//! Effective agent configuration.
//!
//! Sources are layered in order: built-in defaults, the JSON configuration
//! files (system, user home, current directory, then the file named by
//! `AUCA_JUDGE_AGENT_CONFIGURATION`), and finally explicit command-line flags.
//! Each source only overrides the fields it actually sets. The result is
//! resolved once at startup and shared read-only afterwards.

use crate::files::bare_name;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "auca-judge-agent-configuration.json";
pub const CONFIG_PATH_ENV: &str = "AUCA_JUDGE_AGENT_CONFIGURATION";

pub const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WORKING_DIRECTORY: &str = ".";
const SHELL_PATH: &str = "/bin/sh";

/// One configuration source. Every field is optional; `None` means the
/// source did not mention it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub command: Option<String>,
    pub arguments: Option<Vec<String>>,
    pub shell: Option<String>,
    pub working_directory: Option<String>,
    pub artifacts: Option<Vec<String>>,
    /// Execution limit in seconds; `0` disables it.
    pub timeout: Option<u64>,
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))
    }

    /// Fold a later source over this one, field by field.
    pub fn merge(&mut self, later: ConfigFile) {
        if later.port.is_some() {
            self.port = later.port;
        }
        if later.command.is_some() {
            self.command = later.command;
        }
        if later.arguments.is_some() {
            self.arguments = later.arguments;
        }
        if later.shell.is_some() {
            self.shell = later.shell;
        }
        if later.working_directory.is_some() {
            self.working_directory = later.working_directory;
        }
        if later.artifacts.is_some() {
            self.artifacts = later.artifacts;
        }
        if later.timeout.is_some() {
            self.timeout = later.timeout;
        }
    }
}

/// The resolved configuration every request runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub command: String,
    pub arguments: Vec<String>,
    /// Absolute path of the working root; workspaces live under `requests/`.
    pub working_root: PathBuf,
    /// Bare file names, deduplicated in order of first appearance.
    pub artifacts: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_layers(ConfigFile::default())
    }
}

impl Config {
    /// Apply defaults to the merged layers and sanitize the result.
    pub fn from_layers(layers: ConfigFile) -> Self {
        Self::from_layers_with(layers, |key| std::env::var(key).ok())
    }

    /// Like [`Config::from_layers`], expanding artifact names through `lookup`.
    pub fn from_layers_with(layers: ConfigFile, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let working_directory = layers
            .working_directory
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .unwrap_or(DEFAULT_WORKING_DIRECTORY);

        let mut artifacts: Vec<String> = Vec::new();
        for name in layers.artifacts.unwrap_or_default() {
            match bare_name(&expand_vars(&name, &lookup)) {
                Some(bare) if !artifacts.contains(&bare) => artifacts.push(bare),
                Some(_) => {}
                None => warn!(artifact = %name, "Dropping artifact name with no final component"),
            }
        }

        let mut command = layers.command.unwrap_or_default();
        let mut arguments = layers.arguments.unwrap_or_default();
        if let Some(shell) = layers.shell.as_deref().map(str::trim) {
            if !shell.is_empty() {
                command = SHELL_PATH.to_string();
                arguments = vec!["-c".to_string(), shell.to_string()];
            }
        }

        Self {
            port: layers.port.unwrap_or(DEFAULT_PORT),
            command,
            arguments,
            working_root: absolutize(Path::new(working_directory)),
            artifacts,
            timeout: layers
                .timeout
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

/// Resolve the effective configuration from candidate files and flag overrides.
///
/// Missing or malformed candidates are logged and skipped; this never fails.
pub fn resolve(candidates: &[PathBuf], overrides: ConfigFile) -> Config {
    info!(candidates = ?candidates, "Scanning configuration files");

    let mut layers = ConfigFile::default();
    for path in candidates {
        match ConfigFile::from_path(path) {
            Ok(file) => {
                info!(path = %path.display(), "Loaded configuration file");
                layers.merge(file);
            }
            Err(e) => info!(path = %path.display(), error = %format!("{e:#}"), "Skipping configuration file"),
        }
    }
    layers.merge(overrides);

    Config::from_layers(layers)
}

/// Configuration file locations, in increasing priority.
pub fn candidate_files() -> Vec<PathBuf> {
    let cwd = std::env::current_dir()
        .inspect_err(|e| info!(error = %e, "Cannot determine the current directory"))
        .ok();
    let extra = std::env::var(CONFIG_PATH_ENV).ok();

    candidate_files_from(home_dir().as_deref(), cwd.as_deref(), extra.as_deref())
}

/// Candidate list for the given home, current directory and extra file.
pub fn candidate_files_from(
    home: Option<&Path>,
    cwd: Option<&Path>,
    extra: Option<&str>,
) -> Vec<PathBuf> {
    let mut files = vec![Path::new("/etc").join(CONFIG_FILE_NAME)];

    match home {
        Some(home) => files.push(home.join(format!(".{CONFIG_FILE_NAME}"))),
        None => info!("No home directory for the current user"),
    }
    if let Some(cwd) = cwd {
        files.push(cwd.join(CONFIG_FILE_NAME));
    }
    if let Some(extra) = extra.map(str::trim).filter(|extra| !extra.is_empty()) {
        files.push(PathBuf::from(extra));
    }

    files
}

fn home_dir() -> Option<PathBuf> {
    use nix::unistd::{getuid, User};

    match User::from_uid(getuid()) {
        Ok(user) => user.map(|u| u.dir),
        Err(e) => {
            info!(error = %e, "Failed to look up the current user");
            None
        }
    }
}

/// Split a comma-separated flag value, trimming entries and dropping empty ones.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Substitute `$VAR` and `${VAR}` references through `lookup`; unknown
/// variables expand to nothing.
pub fn expand_vars(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                out.push_str(&lookup(&braced[..end]).unwrap_or_default());
                rest = &braced[end + 1..];
                continue;
            }
            out.push('$');
            rest = after;
            continue;
        }

        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if len == 0 {
            out.push('$');
        } else {
            out.push_str(&lookup(&after[..len]).unwrap_or_default());
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

/// Make `path` absolute against the current directory and drop `.` and `..`
/// components lexically. Falls back to the path as given.
fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to make the working directory absolute");
                return path.to_path_buf();
            }
        }
    };

    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(dir: &Path, name: &str, json: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn defaults_without_sources() {
        let config = resolve(&[], ConfigFile::default());
        assert_eq!(config.port, 8080);
        assert_eq!(config.command, "");
        assert!(config.arguments.is_empty());
        assert!(config.artifacts.is_empty());
        assert!(config.working_root.is_absolute());
        assert_eq!(config.working_root, std::env::current_dir().unwrap());
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn file_value_survives_when_flag_absent() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "a.json", r#"{"port": 9000}"#);

        let config = resolve(&[file], ConfigFile::default());
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn later_files_override_only_fields_they_set() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_config(
            dir.path(),
            "first.json",
            r#"{"port": 9000, "command": "/bin/cat", "arguments": ["a.txt"]}"#,
        );
        let second = write_config(dir.path(), "second.json", r#"{"command": "/bin/echo"}"#);

        let config = resolve(&[first, second], ConfigFile::default());
        assert_eq!(config.port, 9000);
        assert_eq!(config.command, "/bin/echo");
        assert_eq!(config.arguments, vec!["a.txt"]);
    }

    #[test]
    fn explicit_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "a.json", r#"{"port": 9000, "command": "/bin/cat"}"#);

        let overrides = ConfigFile {
            port: Some(7000),
            ..ConfigFile::default()
        };
        let config = resolve(&[file], overrides);
        assert_eq!(config.port, 7000);
        assert_eq!(config.command, "/bin/cat");
    }

    #[test]
    fn missing_and_malformed_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_config(dir.path(), "good.json", r#"{"port": 9100}"#);
        let broken = write_config(dir.path(), "broken.json", "{ port: ");
        let wrong_shape = write_config(dir.path(), "shape.json", r#"{"port": "high"}"#);
        let missing = dir.path().join("missing.json");

        let config = resolve(&[good, broken, wrong_shape, missing], ConfigFile::default());
        assert_eq!(config.port, 9100);
    }

    #[test]
    fn null_fields_count_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_config(dir.path(), "first.json", r#"{"command": "/bin/cat"}"#);
        let second = write_config(dir.path(), "second.json", r#"{"command": null}"#);

        let config = resolve(&[first, second], ConfigFile::default());
        assert_eq!(config.command, "/bin/cat");
    }

    #[test]
    fn shell_replaces_command_and_arguments() {
        let layers = ConfigFile {
            command: Some("/usr/bin/python3".into()),
            arguments: Some(vec!["main.py".into()]),
            shell: Some("  echo hi ".into()),
            ..ConfigFile::default()
        };

        let config = Config::from_layers(layers);
        assert_eq!(config.command, "/bin/sh");
        assert_eq!(config.arguments, vec!["-c", "echo hi"]);
    }

    #[test]
    fn blank_shell_is_ignored() {
        let layers = ConfigFile {
            command: Some("/bin/cat".into()),
            shell: Some("   ".into()),
            ..ConfigFile::default()
        };

        assert_eq!(Config::from_layers(layers).command, "/bin/cat");
    }

    fn test_vars(key: &str) -> Option<String> {
        match key {
            "OUT_DIR" => Some("/var/build".into()),
            "NAME" => Some("main".into()),
            _ => None,
        }
    }

    #[test]
    fn artifact_names_are_reduced_to_bare_names() {
        let layers = ConfigFile {
            artifacts: Some(vec![
                "build/a.out".into(),
                "../../secret".into(),
                "${OUT_DIR}/report.xml".into(),
                "$OUT_DIR".into(),
                "a.out".into(),
                "..".into(),
            ]),
            ..ConfigFile::default()
        };

        let config = Config::from_layers_with(layers, test_vars);
        assert_eq!(config.artifacts, vec!["a.out", "secret", "report.xml", "build"]);
    }

    #[test]
    fn working_directory_is_made_absolute() {
        let layers = ConfigFile {
            working_directory: Some("  ./work/../agent ".into()),
            ..ConfigFile::default()
        };

        let config = Config::from_layers(layers);
        assert_eq!(config.working_root, std::env::current_dir().unwrap().join("agent"));

        let layers = ConfigFile {
            working_directory: Some("/srv/agent".into()),
            ..ConfigFile::default()
        };
        assert_eq!(Config::from_layers(layers).working_root, PathBuf::from("/srv/agent"));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let layers = ConfigFile {
            timeout: Some(0),
            ..ConfigFile::default()
        };
        assert_eq!(Config::from_layers(layers).timeout, None);

        let layers = ConfigFile {
            timeout: Some(5),
            ..ConfigFile::default()
        };
        assert_eq!(Config::from_layers(layers).timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn split_list_trims_and_drops_empty_entries() {
        assert_eq!(split_list("a, b,,c ,"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn expand_vars_handles_both_forms() {
        assert_eq!(expand_vars("$NAME.c", test_vars), "main.c");
        assert_eq!(expand_vars("${NAME}_out", test_vars), "main_out");
        assert_eq!(expand_vars("${UNSET}x", test_vars), "x");
        assert_eq!(expand_vars("${NAME", test_vars), "${NAME");
        assert_eq!(expand_vars("cost$", test_vars), "cost$");
        assert_eq!(expand_vars("plain.txt", test_vars), "plain.txt");
    }

    #[test]
    fn candidate_list_ends_with_env_file() {
        let files = candidate_files_from(
            Some(Path::new("/home/judge")),
            Some(Path::new("/srv/agent")),
            Some(" /tmp/extra-agent.json "),
        );

        assert_eq!(
            files,
            vec![
                Path::new("/etc").join(CONFIG_FILE_NAME),
                Path::new("/home/judge").join(format!(".{CONFIG_FILE_NAME}")),
                Path::new("/srv/agent").join(CONFIG_FILE_NAME),
                PathBuf::from("/tmp/extra-agent.json"),
            ]
        );
    }

    #[test]
    fn blank_env_file_and_missing_home_are_skipped() {
        let files = candidate_files_from(None, Some(Path::new("/srv/agent")), Some("   "));
        assert_eq!(
            files,
            vec![
                Path::new("/etc").join(CONFIG_FILE_NAME),
                Path::new("/srv/agent").join(CONFIG_FILE_NAME),
            ]
        );
    }
}
