use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Timer cadence of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Countdown and expiry-guard tick.
    pub tick: Duration,
    pub autosave_interval: Duration,
    pub clock_resync_interval: Duration,
    /// How long the UI should wait after a successful submission before leaving.
    pub redirect_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            autosave_interval: Duration::from_secs(60),
            clock_resync_interval: Duration::from_secs(30),
            redirect_delay: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `EXAM_TICK_SECS`, `EXAM_AUTOSAVE_SECS`,
    /// `EXAM_CLOCK_RESYNC_SECS` and `EXAM_REDIRECT_DELAY_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for values that are not positive integers.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = |key: &'static str, fallback: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                None => Ok(fallback),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or(ConfigError::Invalid { key, raw }),
            }
        };
        Ok(Self {
            tick: secs("EXAM_TICK_SECS", defaults.tick)?,
            autosave_interval: secs("EXAM_AUTOSAVE_SECS", defaults.autosave_interval)?,
            clock_resync_interval: secs("EXAM_CLOCK_RESYNC_SECS", defaults.clock_resync_interval)?,
            redirect_delay: secs("EXAM_REDIRECT_DELAY_SECS", defaults.redirect_delay)?,
        })
    }
}
