//! Configuration types for HintLoop.
//!
//! All behavior is controlled by `hintloop.json` in the working directory:
//! backend location, student and instructor identities, polling cadence,
//! and where downloads and code drafts land.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HintError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "hintloop.json";

/// Default orchestration backend URL.
fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

/// Default interval between hint-status polls, in milliseconds.
const fn default_hint_poll_interval_ms() -> u64 {
    5000
}

/// Default interval between execution-result polls, in milliseconds.
const fn default_execution_poll_interval_ms() -> u64 {
    1000
}

/// Default upper bound on any single polling wait, in seconds.
const fn default_poll_timeout_secs() -> u64 {
    600
}

/// Default output directory for downloads.
fn default_output_dir() -> String {
    ".".to_string()
}

/// Default directory for per-problem code drafts.
fn default_drafts_dir() -> String {
    ".hintloop/drafts".to_string()
}

/// Main configuration for HintLoop.
///
/// Controls the backend connection, identities, and polling cadence used
/// by the CLI and the notebook proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the orchestration backend. Trailing slashes are trimmed
    /// during validation.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Student identifier used for hint requests and history queries.
    #[serde(default)]
    pub student_id: Option<String>,

    /// Student email, attached to instructor escalations for notification.
    #[serde(default)]
    pub student_email: Option<String>,

    /// Instructor identifier, used by the instructor subcommands.
    #[serde(default)]
    pub instructor_id: Option<String>,

    /// Milliseconds between hint-status polls.
    #[serde(default = "default_hint_poll_interval_ms")]
    pub hint_poll_interval_ms: u64,

    /// Milliseconds between execution-result polls.
    #[serde(default = "default_execution_poll_interval_ms")]
    pub execution_poll_interval_ms: u64,

    /// Seconds before any single polling wait gives up.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Directory where downloaded notebooks and history exports land.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory where per-(student, problem) code drafts are kept.
    #[serde(default = "default_drafts_dir")]
    pub drafts_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            student_id: None,
            student_email: None,
            instructor_id: None,
            hint_poll_interval_ms: default_hint_poll_interval_ms(),
            execution_poll_interval_ms: default_execution_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            output_dir: default_output_dir(),
            drafts_dir: default_drafts_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `hintloop.json` in the current directory. If found, loads
    /// and validates the configuration. If not found, returns default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            HintError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `hintloop.json` exists there but contains
    /// invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `HintError::ConfigParseError` if the file exists but contains
    /// invalid JSON.
    ///
    /// Returns `HintError::ConfigValidationError` if the configuration
    /// values are invalid (empty URL, zero intervals).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(HintError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let mut config: Self = serde_json::from_str(&contents)
            .map_err(|e| HintError::config_parse(path, e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Trims trailing slashes off `base_url` so endpoint paths can be
    /// appended uniformly.
    fn normalize(&mut self) {
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
    }

    /// Validates the configuration values.
    ///
    /// Checks that all required fields have valid values:
    /// - `base_url` must not be empty
    /// - both poll intervals and the poll timeout must be greater than 0
    /// - `output_dir` and `drafts_dir` must not be empty
    ///
    /// # Errors
    ///
    /// Returns `HintError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(HintError::config_validation(
                "baseUrl must not be empty",
                "Provide the orchestration backend URL in your hintloop.json",
            ));
        }

        if self.hint_poll_interval_ms == 0 {
            return Err(HintError::config_validation(
                "hintPollIntervalMs must be greater than 0",
                "Set hintPollIntervalMs to at least 1 millisecond in your hintloop.json",
            ));
        }

        if self.execution_poll_interval_ms == 0 {
            return Err(HintError::config_validation(
                "executionPollIntervalMs must be greater than 0",
                "Set executionPollIntervalMs to at least 1 millisecond in your hintloop.json",
            ));
        }

        if self.poll_timeout_secs == 0 {
            return Err(HintError::config_validation(
                "pollTimeoutSecs must be greater than 0",
                "Set pollTimeoutSecs to at least 1 second in your hintloop.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(HintError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your hintloop.json (use '.' for current directory)",
            ));
        }

        if self.drafts_dir.trim().is_empty() {
            return Err(HintError::config_validation(
                "draftsDir must not be empty",
                "Provide a valid drafts directory path in your hintloop.json",
            ));
        }

        Ok(())
    }
}
