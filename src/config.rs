//! Dispatcher configuration.
//!
//! Values can be built in code or loaded from a TOML document whose
//! durations are whole seconds:
//!
//! ```toml
//! pending_timeout_secs = 600
//! sweep_interval_secs = 30
//! sweep_batch_size = 100
//! active_idle_grace_secs = 3600   # omit to disable idle expiry
//! max_message_length = 4000
//! announce_pickup = true
//! ```

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 600;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
const DEFAULT_SWEEP_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4000;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid TOML or has the wrong shape.
    #[error("failed to parse dispatch configuration: {0}")]
    Parse(Box<toml::de::Error>),

    /// A value is out of range.
    #[error("invalid dispatch configuration: {0}")]
    Invalid(String),
}

/// Tunables for the handoff dispatcher and its sweeper.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use switchboard::config::DispatchConfig;
///
/// let config = DispatchConfig::default();
/// assert_eq!(config.pending_timeout, Duration::from_secs(600));
/// assert!(config.active_idle_grace.is_none());
///
/// let loaded = DispatchConfig::from_toml_str("pending_timeout_secs = 120")
///     .expect("valid config");
/// assert_eq!(loaded.pending_timeout, Duration::from_secs(120));
/// assert_eq!(loaded.max_message_length, 4000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// How long a handoff may stay `pending` before the sweep expires it.
    pub pending_timeout: Duration,
    /// Period between sweeps.
    pub sweep_interval: Duration,
    /// Maximum handoffs expired per sweep and per kind.
    pub sweep_batch_size: usize,
    /// Inactivity after which an `active` handoff is expired. `None`
    /// disables idle expiry.
    pub active_idle_grace: Option<Duration>,
    /// Maximum message length in characters after trimming.
    pub max_message_length: usize,
    /// Whether pickup appends a system message announcing the agent.
    pub announce_pickup: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_secs(DEFAULT_PENDING_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            active_idle_grace: None,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            announce_pickup: true,
        }
    }
}

impl DispatchConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for zero durations or limits.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: DispatchConfigFile =
            toml::from_str(source).map_err(|err| ConfigError::Parse(Box::new(err)))?;
        let config = Self::from(file);
        config.validate()?;
        Ok(config)
    }

    /// Checks that every duration and limit is positive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pending_timeout.is_zero() {
            return Err(ConfigError::Invalid("pending_timeout must be positive".to_owned()));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid("sweep_interval must be positive".to_owned()));
        }
        if self.sweep_batch_size == 0 {
            return Err(ConfigError::Invalid("sweep_batch_size must be positive".to_owned()));
        }
        if self.active_idle_grace.is_some_and(|grace| grace.is_zero()) {
            return Err(ConfigError::Invalid(
                "active_idle_grace must be positive when set".to_owned(),
            ));
        }
        if self.max_message_length == 0 {
            return Err(ConfigError::Invalid(
                "max_message_length must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    /// Returns the configuration with a different pending timeout.
    #[must_use]
    pub const fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    /// Returns the configuration with idle expiry of active handoffs
    /// enabled.
    #[must_use]
    pub const fn with_active_idle_grace(mut self, grace: Duration) -> Self {
        self.active_idle_grace = Some(grace);
        self
    }

    /// Returns the configuration without the pickup announcement.
    #[must_use]
    pub const fn without_pickup_announcement(mut self) -> Self {
        self.announce_pickup = false;
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DispatchConfigFile {
    #[serde(default = "default_pending_timeout_secs")]
    pending_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,
    #[serde(default = "default_sweep_batch_size")]
    sweep_batch_size: usize,
    #[serde(default)]
    active_idle_grace_secs: Option<u64>,
    #[serde(default = "default_max_message_length")]
    max_message_length: usize,
    #[serde(default = "default_announce_pickup")]
    announce_pickup: bool,
}

const fn default_pending_timeout_secs() -> u64 {
    DEFAULT_PENDING_TIMEOUT_SECS
}

const fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

const fn default_sweep_batch_size() -> usize {
    DEFAULT_SWEEP_BATCH_SIZE
}

const fn default_max_message_length() -> usize {
    DEFAULT_MAX_MESSAGE_LENGTH
}

const fn default_announce_pickup() -> bool {
    true
}

impl From<DispatchConfigFile> for DispatchConfig {
    fn from(file: DispatchConfigFile) -> Self {
        Self {
            pending_timeout: Duration::from_secs(file.pending_timeout_secs),
            sweep_interval: Duration::from_secs(file.sweep_interval_secs),
            sweep_batch_size: file.sweep_batch_size,
            active_idle_grace: file.active_idle_grace_secs.map(Duration::from_secs),
            max_message_length: file.max_message_length,
            announce_pickup: file.announce_pickup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DispatchConfig};
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    fn empty_document_yields_defaults() {
        let config = DispatchConfig::from_toml_str("").expect("defaults");
        assert_eq!(config, DispatchConfig::default());
    }

    #[rstest]
    fn full_document_overrides_every_field() {
        let source = r"
            pending_timeout_secs = 120
            sweep_interval_secs = 5
            sweep_batch_size = 10
            active_idle_grace_secs = 1800
            max_message_length = 500
            announce_pickup = false
        ";
        let config = DispatchConfig::from_toml_str(source).expect("config");

        assert_eq!(config.pending_timeout, Duration::from_secs(120));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.sweep_batch_size, 10);
        assert_eq!(config.active_idle_grace, Some(Duration::from_secs(1800)));
        assert_eq!(config.max_message_length, 500);
        assert!(!config.announce_pickup);
    }

    #[rstest]
    #[case::zero_timeout("pending_timeout_secs = 0")]
    #[case::zero_interval("sweep_interval_secs = 0")]
    #[case::zero_batch("sweep_batch_size = 0")]
    #[case::zero_grace("active_idle_grace_secs = 0")]
    #[case::zero_length("max_message_length = 0")]
    fn zero_values_are_rejected(#[case] source: &str) {
        let result = DispatchConfig::from_toml_str(source);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    fn unknown_keys_are_rejected() {
        let result = DispatchConfig::from_toml_str("pending_timeout = 600");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
