use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from foreman.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ForemanConfig {
    pub supervisor: SupervisorConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct SupervisorConfig {
    /// Worker executable. When unset, the `foreman-worker` binary next to
    /// the running executable is used.
    pub worker_command: Option<PathBuf>,
    /// Prefix for generated worker labels (`C_00`, `C_01`, ...).
    pub label_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Sampling tick, seconds. Fixed at one tick in normal operation;
    /// kept configurable for testing.
    pub tick_secs: u64,
    /// Main-loop iterations between reports (while permitted).
    pub report_after: u32,
    /// How long to wait for a grant before re-sending the request.
    pub resend_secs: u64,
}

impl SupervisorConfig {
    pub const DEFAULT_LABEL_PREFIX: &'static str = "C_";

    pub fn label_prefix(&self) -> &str {
        self.label_prefix
            .as_deref()
            .unwrap_or(Self::DEFAULT_LABEL_PREFIX)
    }

    /// Resolve the worker executable: CLI override, then config, then the
    /// sibling binary of the current executable.
    pub fn worker_command(&self, cli_override: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_override {
            return path.to_path_buf();
        }
        if let Some(path) = &self.worker_command {
            return path.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("foreman-worker")))
            .unwrap_or_else(|| PathBuf::from("foreman-worker"))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 1,
            report_after: 5,
            resend_secs: 1,
        }
    }
}

/// Errors loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl ForemanConfig {
    /// Load from `path`. A missing file yields pure defaults; a present
    /// but malformed file is a startup error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
