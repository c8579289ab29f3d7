//! Runtime settings
//!
//! Settings are layered: built-in defaults, then an optional JSON file,
//! then `ROLLWATCH_*` environment variables.

use crate::error::{Error, Result};
use crate::rollout::MAX_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for probes, rollouts and aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Namespace probed by the aggregator
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Substring a context name must contain to be aggregated
    #[serde(default = "default_context_pattern")]
    pub context_pattern: String,

    /// Well-known web front end deployment
    #[serde(default = "default_web_workload")]
    pub web_workload: String,

    /// Well-known API statefulset
    ///
    /// Older installations name it `omiq-api` and must set it explicitly.
    #[serde(default = "default_api_workload")]
    pub api_workload: String,

    /// Container whose logs carry user activity
    #[serde(default = "default_log_container")]
    pub log_container: String,

    /// Substring marking a user-activity log line
    #[serde(default = "default_activity_marker")]
    pub activity_marker: String,

    /// Optional bound on the number of log lines fetched
    ///
    /// Unset by default, which reads the whole container log.
    #[serde(default)]
    pub log_tail_lines: Option<i64>,

    /// Rollout timeout in seconds, between 1 and one day
    #[serde(default = "default_rollout_timeout")]
    pub rollout_timeout_secs: u64,

    /// Rollout poll interval in seconds, at least 1
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_context_pattern() -> String {
    "dev".to_string()
}

fn default_web_workload() -> String {
    "webapp".to_string()
}

fn default_api_workload() -> String {
    "api".to_string()
}

fn default_log_container() -> String {
    "backend".to_string()
}

fn default_activity_marker() -> String {
    "\"UserID\"".to_string()
}

fn default_rollout_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            context_pattern: default_context_pattern(),
            web_workload: default_web_workload(),
            api_workload: default_api_workload(),
            log_container: default_log_container(),
            activity_marker: default_activity_marker(),
            log_tail_lines: None,
            rollout_timeout_secs: default_rollout_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file and the environment
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Json)
                    .required(false),
            );
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("ROLLWATCH"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let settings: Self = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject rollout timings the controller cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be at least 1".to_string()));
        }
        if self.rollout_timeout_secs == 0 || self.rollout_timeout_secs > MAX_TIMEOUT.as_secs() {
            return Err(Error::Config(format!(
                "rollout_timeout_secs must be between 1 and {}",
                MAX_TIMEOUT.as_secs()
            )));
        }
        if matches!(self.log_tail_lines, Some(n) if n <= 0) {
            return Err(Error::Config("log_tail_lines must be positive".to_string()));
        }
        Ok(())
    }

    /// Default settings file location (`~/.config/rollwatch/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("rollwatch").join("config.json"))
    }

    pub fn rollout_timeout(&self) -> Duration {
        Duration::from_secs(self.rollout_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.namespace, "default");
        assert_eq!(settings.context_pattern, "dev");
        assert_eq!(settings.log_container, "backend");
        assert_eq!(settings.activity_marker, "\"UserID\"");
        assert_eq!(settings.rollout_timeout(), Duration::from_secs(60));
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert!(settings.log_tail_lines.is_none());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(settings.web_workload, "webapp");
        assert_eq!(settings.api_workload, "api");
    }

    #[test]
    fn test_load_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"web_workload": "frontend", "rollout_timeout_secs": 120, "log_tail_lines": 500}}"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.web_workload, "frontend");
        assert_eq!(settings.rollout_timeout(), Duration::from_secs(120));
        assert_eq!(settings.log_tail_lines, Some(500));
        // Untouched fields keep their defaults
        assert_eq!(settings.api_workload, "api");
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"poll_interval_secs": 0}}"#).unwrap();

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("poll_interval_secs")));
    }

    #[test]
    fn test_oversized_rollout_timeout_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"rollout_timeout_secs": 31536000000}}"#).unwrap();

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("rollout_timeout_secs")));
    }

    #[test]
    fn test_validate_bounds() {
        assert!(Settings::default().validate().is_ok());

        let at_max = Settings {
            rollout_timeout_secs: MAX_TIMEOUT.as_secs(),
            ..Settings::default()
        };
        assert!(at_max.validate().is_ok());

        for bad in [
            Settings { rollout_timeout_secs: 0, ..Settings::default() },
            Settings { rollout_timeout_secs: u64::MAX, ..Settings::default() },
            Settings { poll_interval_secs: 0, ..Settings::default() },
            Settings { log_tail_lines: Some(0), ..Settings::default() },
        ] {
            assert!(matches!(bad.validate(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_load_malformed_file_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
