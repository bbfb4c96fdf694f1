//! Cycle configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables of computation cycles.
///
/// Every field has a default, so a JSON document only needs to mention what it changes:
///
/// ```
/// # use sorrel::CycleConfig;
/// # use std::time::Duration;
/// let config = CycleConfig::from_json(r#"{ "poll_interval": { "secs": 1, "nanos": 0 } }"#).unwrap();
///
/// assert_eq!(config.poll_interval(), Duration::from_secs(1));
/// assert_eq!(config.dump_directory(), std::env::temp_dir());
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    poll_interval: Duration,
    dump_directory: Option<PathBuf>,
}

impl CycleConfig {
    /// Default time a cycle waits on a single execution handle before moving on to the next one.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Parse configuration out of a JSON document.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Set poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set directory receiving cache dumps.
    pub fn with_dump_directory(mut self, dump_directory: impl AsRef<Path>) -> Self {
        self.dump_directory = Some(dump_directory.as_ref().to_owned());
        self
    }

    /// Time a cycle waits on a single execution handle before moving on to the next one.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Directory receiving cache dumps, system temp directory unless configured.
    pub fn dump_directory(&self) -> PathBuf {
        self.dump_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        CycleConfig {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            dump_directory: None,
        }
    }
}
