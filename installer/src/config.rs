//! Run configuration.
//!
//! [`ProvisionConfig`] gathers everything a run needs from the command line,
//! the host, and an optional TOML settings file into one value that the
//! driver receives explicitly. Command-line flags win over the settings
//! file, which wins over built-in defaults.

use crate::artefact::download::DEFAULT_HTTP_TIMEOUT;
use crate::artefact::reference::{ArtefactReference, PINNED_VERSION, VersionSelector};
use crate::artefact::staging::{DEFAULT_STAGING_DIR, StagingLayout};
use crate::cli::Cli;
use crate::fetch::policy::{BackoffSchedule, DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY};
use crate::lock::DEFAULT_RPM_DB_DIR;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Errors from loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("unable to read settings file {path}: {source}")]
    Read {
        /// The settings file path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for the expected schema.
    #[error("invalid settings file {path}: {reason}")]
    Parse {
        /// The settings file path.
        path: Utf8PathBuf,
        /// Description of the parse error.
        reason: String,
    },

    /// A setting has an unusable value.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// The offending key.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// Optional overrides read from a TOML file.
///
/// # Examples
///
/// ```
/// use chronicle_installer::config::SettingsFile;
///
/// let settings = SettingsFile::parse(
///     "staging_dir = \"/tmp/chronicle\"\nretry_attempts = 3\n",
///     "settings.toml".into(),
/// )?;
/// assert_eq!(settings.retry_attempts, Some(3));
/// # Ok::<(), chronicle_installer::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    /// Directory holding the downloaded package and key file.
    pub staging_dir: Option<Utf8PathBuf>,
    /// Package database directory inspected for stale locks.
    pub rpm_db_dir: Option<Utf8PathBuf>,
    /// Attempts per HTTP fetch.
    pub retry_attempts: Option<u32>,
    /// Initial backoff delay in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Per-request timeout in seconds.
    pub http_timeout_secs: Option<u64>,
    /// Version requested when `--latest` is not given.
    pub pinned_version: Option<String>,
}

impl SettingsFile {
    /// Reads and parses the settings file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is malformed or has unknown keys.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text, path.to_owned())
    }

    /// Parses settings from TOML text; `path` is used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is malformed or has
    /// unknown keys.
    pub fn parse(text: &str, path: Utf8PathBuf) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path,
            reason: e.message().to_owned(),
        })
    }
}

/// Maps a run's result to the process exit code.
///
/// Built straight from the command line, before any settings are loaded, so
/// a settings failure also exits with the configured code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitPolicy {
    error_exit_code: i32,
}

impl ExitPolicy {
    /// Creates a policy that exits with `error_exit_code` on failure.
    #[must_use]
    pub fn new(error_exit_code: i32) -> Self {
        Self { error_exit_code }
    }

    /// Returns the code used for failed runs.
    #[must_use]
    pub fn error_exit_code(&self) -> i32 {
        self.error_exit_code
    }

    /// Returns `0` for success and the configured code for failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronicle_installer::config::ExitPolicy;
    ///
    /// let swallow = ExitPolicy::default();
    /// assert_eq!(swallow.exit_code_for(&Err::<(), _>("boom")), 0);
    ///
    /// let strict = ExitPolicy::new(3);
    /// assert_eq!(strict.exit_code_for(&Ok::<_, ()>(())), 0);
    /// assert_eq!(strict.exit_code_for(&Err::<(), _>("boom")), 3);
    /// ```
    #[must_use]
    pub fn exit_code_for<T, E>(&self, result: &Result<T, E>) -> i32 {
        match result {
            Ok(_) => 0,
            Err(_) => self.error_exit_code,
        }
    }
}

impl From<&Cli> for ExitPolicy {
    fn from(cli: &Cli) -> Self {
        Self::new(cli.error_exit_code)
    }
}

/// Everything a provisioning run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// The package build to request.
    pub reference: ArtefactReference,
    /// Staging paths.
    pub staging: StagingLayout,
    /// Package database directory.
    pub rpm_db_dir: Utf8PathBuf,
    /// Retry budget and backoff for HTTP fetches.
    pub backoff: BackoffSchedule,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
}

impl ProvisionConfig {
    /// Builds the configuration from parsed flags and the host architecture,
    /// reading the settings file named by `--config` if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the settings file cannot be loaded or
    /// holds invalid values.
    pub fn from_cli(cli: &Cli, architecture: impl Into<String>) -> Result<Self, ConfigError> {
        let settings = match &cli.config {
            Some(path) => SettingsFile::load(path)?,
            None => SettingsFile::default(),
        };
        Self::from_parts(cli, architecture, settings)
    }

    /// Builds the configuration from flags, architecture, and settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero attempts, a zero timeout,
    /// or an empty pinned version.
    pub fn from_parts(
        cli: &Cli,
        architecture: impl Into<String>,
        settings: SettingsFile,
    ) -> Result<Self, ConfigError> {
        let selector = if cli.latest {
            VersionSelector::Latest
        } else {
            let version = settings
                .pinned_version
                .unwrap_or_else(|| PINNED_VERSION.to_owned());
            if version.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "pinned_version",
                    reason: "must not be empty",
                });
            }
            VersionSelector::Pinned(version)
        };

        let attempts = settings.retry_attempts.unwrap_or(DEFAULT_ATTEMPTS);
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry_attempts",
                reason: "must be at least 1",
            });
        }
        let base_delay = settings
            .base_delay_ms
            .map_or(DEFAULT_BASE_DELAY, Duration::from_millis);

        let http_timeout = settings
            .http_timeout_secs
            .map_or(DEFAULT_HTTP_TIMEOUT, Duration::from_secs);
        if http_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "http_timeout_secs",
                reason: "must be greater than zero",
            });
        }

        Ok(Self {
            reference: ArtefactReference::new(selector, architecture),
            staging: StagingLayout::new(
                settings
                    .staging_dir
                    .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_STAGING_DIR)),
            ),
            rpm_db_dir: settings
                .rpm_db_dir
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_RPM_DB_DIR)),
            backoff: BackoffSchedule::new(base_delay, attempts),
            http_timeout,
        })
    }
}
