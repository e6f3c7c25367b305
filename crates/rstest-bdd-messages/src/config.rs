//! Reporting configuration.
//!
//! The configuration is a plain value handed to the tracker when it is built.
//! It can be assembled explicitly or read from the environment:
//!
//! - `RSTEST_BDD_MESSAGES_NDJSON`: output file for the message stream. Unset
//!   or empty disables reporting.
//! - `RSTEST_BDD_WORKER_ID`: identifier of the current worker process.

use camino::Utf8PathBuf;

use crate::ci::Environment;

/// Environment variable naming the NDJSON output file.
pub const NDJSON_PATH_VAR: &str = "RSTEST_BDD_MESSAGES_NDJSON";

/// Environment variable naming the current worker.
pub const WORKER_ID_VAR: &str = "RSTEST_BDD_WORKER_ID";

/// Worker id reported when no distributed worker id is available.
pub const DEFAULT_WORKER_ID: &str = "master";

/// Settings controlling whether and where messages are written.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::MessagesConfig;
///
/// let config = MessagesConfig::default();
/// assert!(!config.is_enabled());
///
/// let config = config.with_ndjson_path("target/run.ndjson");
/// assert!(config.is_enabled());
/// assert_eq!(config.worker_id(), "master");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagesConfig {
    ndjson_path: Option<Utf8PathBuf>,
    worker_id: Option<String>,
}

impl MessagesConfig {
    /// Read the configuration from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_environment(&Environment::capture())
    }

    /// Read the configuration from an environment snapshot.
    #[must_use]
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            ndjson_path: env.get(NDJSON_PATH_VAR).map(Utf8PathBuf::from),
            worker_id: env.get(WORKER_ID_VAR).map(str::to_owned),
        }
    }

    /// Write messages to `path`.
    #[must_use]
    pub fn with_ndjson_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.ndjson_path = Some(path.into());
        self
    }

    /// Report `worker_id` on every test case attempt.
    #[must_use]
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    /// Configured output file, if any.
    #[must_use]
    pub fn ndjson_path(&self) -> Option<&Utf8PathBuf> {
        self.ndjson_path.as_ref()
    }

    /// Whether an output file is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.ndjson_path.is_some()
    }

    /// Worker id to report, falling back to [`DEFAULT_WORKER_ID`].
    #[must_use]
    pub fn worker_id(&self) -> &str {
        self.worker_id.as_deref().unwrap_or(DEFAULT_WORKER_ID)
    }
}
