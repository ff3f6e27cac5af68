use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConvertError, ConvertResult};

use super::observability::{IngestionObserver, IngestionSeverity};

/// Default inbox glob, relative to the inbox directory.
pub const DEFAULT_PATTERN: &str = "*.edf";

/// Options controlling the ingestion loop.
///
/// Use [`Default`] plus the `with_*` builders for common cases, or [`IngestConfig::from_json_path`]
/// to read them from a file.
#[derive(Clone)]
pub struct IngestConfig {
    /// Directory scanned for new source files (non-recursive).
    pub inbox: PathBuf,
    /// Root of the `<sample>_<experiment>/{raw,nexus}` tree.
    pub outbox: PathBuf,
    /// Pause between two scans.
    pub poll_interval: Duration,
    /// Glob matched against file names in the inbox.
    pub pattern: String,
    /// Consecutive failures after which a file is quarantined; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("inbox", &self.inbox)
            .field("outbox", &self.outbox)
            .field("poll_interval", &self.poll_interval)
            .field("pattern", &self.pattern)
            .field("max_attempts", &self.max_attempts)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            inbox: PathBuf::from("inbox"),
            outbox: PathBuf::from("outbox"),
            poll_interval: Duration::from_secs(5),
            pattern: DEFAULT_PATTERN.to_string(),
            max_attempts: None,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// On-disk form; every field is optional and overrides the default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    inbox: Option<PathBuf>,
    outbox: Option<PathBuf>,
    poll_interval_secs: Option<f64>,
    pattern: Option<String>,
    max_attempts: Option<u32>,
    alert_at_or_above: Option<IngestionSeverity>,
}

impl IngestConfig {
    pub fn new(inbox: impl Into<PathBuf>, outbox: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
            outbox: outbox.into(),
            ..Self::default()
        }
    }

    /// Read a JSON config file, e.g.
    ///
    /// ```json
    /// { "inbox": "/data/inbox", "outbox": "/data/outbox", "poll_interval_secs": 2.5 }
    /// ```
    pub fn from_json_path(path: impl AsRef<Path>) -> ConvertResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&text).map_err(|e| {
            ConvertError::settings(format!("invalid config {}: {e}", path.display()))
        })?;

        let mut config = Self::default();
        if let Some(inbox) = file.inbox {
            config.inbox = inbox;
        }
        if let Some(outbox) = file.outbox {
            config.outbox = outbox;
        }
        if let Some(secs) = file.poll_interval_secs {
            config.poll_interval = Duration::try_from_secs_f64(secs).map_err(|e| {
                ConvertError::settings(format!("invalid poll_interval_secs {secs}: {e}"))
            })?;
        }
        if let Some(pattern) = file.pattern {
            config.pattern = pattern;
        }
        config.max_attempts = file.max_attempts;
        if let Some(severity) = file.alert_at_or_above {
            config.alert_at_or_above = severity;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_alert_at_or_above(mut self, severity: IngestionSeverity) -> Self {
        self.alert_at_or_above = severity;
        self
    }

    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> ConvertResult<()> {
        if self.poll_interval.is_zero() {
            return Err(ConvertError::settings("poll interval must be greater than zero"));
        }
        if self.max_attempts == Some(0) {
            return Err(ConvertError::settings("max_attempts must be at least 1"));
        }
        if self.pattern.contains('/') || self.pattern.contains('\\') {
            return Err(ConvertError::settings(format!(
                "pattern '{}' must match file names, not paths",
                self.pattern
            )));
        }
        glob::Pattern::new(&self.pattern).map_err(|e| {
            ConvertError::settings(format!("invalid pattern '{}': {e}", self.pattern))
        })?;
        if self.inbox == self.outbox {
            return Err(ConvertError::settings("inbox and outbox must be different directories"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        IngestConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = IngestConfig::default()
            .with_max_attempts(Some(0))
            .validate()
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"inbox": "in", "outbox": "out", "poll_interval_secs": 0.5,
                "max_attempts": 3, "alert_at_or_above": "error"}}"#
        )
        .unwrap();
        let config = IngestConfig::from_json_path(f.path()).unwrap();
        assert_eq!(config.inbox, PathBuf::from("in"));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.pattern, DEFAULT_PATTERN);
        assert_eq!(config.max_attempts, Some(3));
        assert_eq!(config.alert_at_or_above, IngestionSeverity::Error);
    }

    #[test]
    fn unknown_keys_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"inbx": "in"}}"#).unwrap();
        assert!(IngestConfig::from_json_path(f.path()).is_err());
    }
}
