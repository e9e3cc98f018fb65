//! Typed configuration.
//!
//! Process-level values (database, telemetry) come from environment
//! variables and fail fast if required vars are missing. Pipeline tuning
//! lives in an optional TOML settings file where every field has a default.
//! Sensitive values are wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file looked up in the working directory when `RUNNER_SETTINGS`
/// is not set.
pub const DEFAULT_SETTINGS_FILE: &str = "bootstrap-runner.toml";

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: log_level_from_env(),
        })
    }
}

/// `LOG_LEVEL`, defaulting to "info". Also used by commands that need no
/// database.
pub fn log_level_from_env() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Pipeline settings, normally read from `bootstrap-runner.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub scheduler: SchedulerSettings,
    pub build: BuildSettings,
    pub artifacts: ArtifactSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    /// Seconds between scan cycles.
    pub interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    /// Program and leading arguments. The slug is appended as the last argument.
    ///
    /// Slugs can begin with `-` (`" App "` gives `-app-`). A program that
    /// parses options should end its leading arguments with `--`, e.g.
    /// `["npm", "run", "bootstrap", "--"]`.
    pub command: Vec<String>,
    /// Hard wall-clock limit for one build.
    pub timeout_secs: u64,
    /// Working directory for the build. Defaults to the process CWD.
    pub working_dir: Option<PathBuf>,
    /// Stderr line prefixes that do not count as failure (case-insensitive).
    pub benign_markers: Vec<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            command: vec!["./scripts/bootstrap-pipeline".to_string()],
            timeout_secs: 300,
            working_dir: None,
            benign_markers: vec![
                "warning".to_string(),
                "warn".to_string(),
                "npm warn".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactSettings {
    /// Root of the per-slug output layout.
    pub output_root: PathBuf,
    /// Directories searched, in order, for a summary document.
    pub summary_dirs: Vec<PathBuf>,
    /// Directories searched for result files and result directories.
    pub results_dirs: Vec<PathBuf>,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            summary_dirs: vec![PathBuf::from(".")],
            results_dirs: vec![PathBuf::from("results")],
        }
    }
}

impl Settings {
    /// Parse settings from TOML text and validate them.
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Settings named by `RUNNER_SETTINGS`, which must exist. Without it,
    /// the default file when present, otherwise built-in defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os("RUNNER_SETTINGS") {
            Some(path) => Self::load(Path::new(&path)),
            None => Self::load_or_default(Path::new(DEFAULT_SETTINGS_FILE)),
        }
    }

    /// Like [`Settings::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.build.command.is_empty() || self.build.command[0].trim().is_empty() {
            return Err(Error::Config("build.command must name a program".to_string()));
        }
        if self.build.timeout_secs == 0 {
            return Err(Error::Config("build.timeout_secs must be positive".to_string()));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(Error::Config(
                "scheduler.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build.timeout_secs)
    }
}
