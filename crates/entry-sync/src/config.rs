//! Coordinator configuration
//!
//! Loaded from TOML; every field has a default so partial files work.
//!
//! ```toml
//! page_size = 10
//! matching = "positional"
//! reminder_interval_secs = 300
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How save responses are tied back to their requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    /// `result[i]`/`errors[i]` align with the i-th save item
    #[default]
    Positional,
    /// Server echoes the correlation key on every entry
    Keyed,
}

/// Entry sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Requests per bulk call
    pub page_size: usize,
    /// Response matching strategy
    pub matching: MatchingMode,
    /// Seconds between unsaved-changes reminders
    pub reminder_interval_secs: u64,
}

impl SyncConfig {
    /// Default page size
    pub const DEFAULT_PAGE_SIZE: usize = 10;

    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With page size
    #[inline]
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// With matching mode
    #[inline]
    #[must_use]
    pub fn with_matching(mut self, matching: MatchingMode) -> Self {
        self.matching = matching;
        self
    }

    /// With reminder interval, rounded up to whole seconds
    #[inline]
    #[must_use]
    pub fn with_reminder_interval(mut self, interval: Duration) -> Self {
        let secs = interval.as_secs() + u64::from(interval.subsec_nanos() > 0);
        self.reminder_interval_secs = secs.max(1);
        self
    }

    /// Reminder interval as a duration
    #[inline]
    #[must_use]
    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_secs)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` for a zero page size or reminder interval
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.reminder_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reminder_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Parse or range errors
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// I/O, parse or range errors
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "loading sync config");
        Self::from_toml_str(&source)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// `ConfigError::Render` if serialization fails
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: Self::DEFAULT_PAGE_SIZE,
            matching: MatchingMode::Positional,
            reminder_interval_secs: 300,
        }
    }
}
