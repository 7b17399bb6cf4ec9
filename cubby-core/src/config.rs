use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable holding the tick interval in milliseconds
pub const TICK_INTERVAL_ENV: &str = "CUBBY_TICK_INTERVAL_MS";

/// Configuration for a ticking store's background timer
///
/// # Example
///
/// ```rust
/// use cubby_core::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_tick_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Interval between ticks (default: 60 seconds)
    pub tick_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tick interval
    ///
    /// This determines how often the background task invokes the store's job.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cubby_core::StoreConfig;
    /// use std::time::Duration;
    ///
    /// // Tick every 30 seconds
    /// let config = StoreConfig::default()
    ///     .with_tick_interval(Duration::from_secs(30));
    /// ```
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Loads configuration from the process environment
    ///
    /// Reads [`TICK_INTERVAL_ENV`]; unset keeps the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the variable is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(TICK_INTERVAL_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidInterval {
                var: TICK_INTERVAL_ENV,
                value: raw.clone(),
            })?;
            if millis == 0 {
                return Err(ConfigError::ZeroInterval {
                    var: TICK_INTERVAL_ENV,
                });
            }
            config.tick_interval = Duration::from_millis(millis);
        }

        Ok(config)
    }
}
