// SPDX-License-Identifier: Apache-2.0

//! Configuration for keyed rate limiting.
//!
//! [`RateLimitConfig`] is the serializable form read from the site's settings.
//! [`RateLimitPolicy`] is the validated form a registry is built from; the
//! only way to obtain one is through validation, so a registry never sees a
//! zero capacity or rate.

use crate::error::Error;
use crate::tokenbucket::Limit;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default burst capacity.
const DEFAULT_CAPACITY: f64 = 10.0;

/// Default refill rate in tokens per second.
const DEFAULT_REFILL_RATE: f64 = 1.0;

/// Default time a key may stay idle before its bucket is dropped.
const DEFAULT_IDLE_EVICTION_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Default minimum spacing between eviction sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Search allows a burst of 10 queries, then one query every 5 seconds.
const SEARCH_CAPACITY: f64 = 10.0;
const SEARCH_REFILL_RATE: f64 = 0.2;
const SEARCH_IDLE_EVICTION_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Configuration for a rate limiter registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum burst size in tokens.
    #[serde(default = "default_capacity")]
    pub capacity: f64,

    /// Tokens added per second.
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,

    /// How long a key may go unchecked before its bucket is evicted.
    #[serde(default = "default_idle_eviction_window", with = "humantime_serde")]
    pub idle_eviction_window: Duration,

    /// Minimum spacing between eviction sweeps, both the opportunistic ones
    /// run during checks and the periodic background one.
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            refill_rate: DEFAULT_REFILL_RATE,
            idle_eviction_window: DEFAULT_IDLE_EVICTION_WINDOW,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl RateLimitConfig {
    /// Checks the configuration and converts it into a policy.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<RateLimitPolicy, Error> {
        RateLimitPolicy::new(self.capacity, self.refill_rate, self.idle_eviction_window)?
            .with_sweep_interval(self.sweep_interval)
    }
}

/// Validated policy shared by every bucket a registry creates.
///
/// Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    capacity: f64,
    limit: Limit,
    idle_eviction_window: Duration,
    sweep_interval: Duration,
}

impl RateLimitPolicy {
    /// Creates a policy with the default sweep interval.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCapacity`, `Error::InvalidLimit` or
    /// `Error::InvalidEvictionWindow` when the matching argument is not positive.
    pub fn new(
        capacity: f64,
        refill_rate: f64,
        idle_eviction_window: Duration,
    ) -> Result<Self, Error> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(Error::InvalidCapacity { capacity });
        }
        let limit = Limit::new(refill_rate)?;
        if idle_eviction_window.is_zero() {
            return Err(Error::InvalidEvictionWindow {
                window: idle_eviction_window,
            });
        }

        Ok(Self {
            capacity,
            limit,
            idle_eviction_window,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        })
    }

    /// Policy protecting the site search action.
    pub fn search() -> Self {
        Self {
            capacity: SEARCH_CAPACITY,
            limit: Limit(SEARCH_REFILL_RATE),
            idle_eviction_window: SEARCH_IDLE_EVICTION_WINDOW,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Sets the sweep interval.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSweepInterval` if `interval` is zero.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Result<Self, Error> {
        if interval.is_zero() {
            return Err(Error::InvalidSweepInterval { interval });
        }
        self.sweep_interval = interval;
        Ok(self)
    }

    /// Burst capacity of each bucket.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refill rate of each bucket.
    pub fn limit(&self) -> Limit {
        self.limit
    }

    /// Idle time after which a key's bucket may be evicted.
    pub fn idle_eviction_window(&self) -> Duration {
        self.idle_eviction_window
    }

    /// Minimum spacing between eviction sweeps.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

impl TryFrom<RateLimitConfig> for RateLimitPolicy {
    type Error = Error;

    fn try_from(config: RateLimitConfig) -> Result<Self, Self::Error> {
        config.validate()
    }
}

impl TryFrom<&RateLimitConfig> for RateLimitPolicy {
    type Error = Error;

    fn try_from(config: &RateLimitConfig) -> Result<Self, Self::Error> {
        config.validate()
    }
}

fn default_capacity() -> f64 {
    DEFAULT_CAPACITY
}

fn default_refill_rate() -> f64 {
    DEFAULT_REFILL_RATE
}

fn default_idle_eviction_window() -> Duration {
    DEFAULT_IDLE_EVICTION_WINDOW
}

fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.capacity, 10.0);
        assert_eq!(config.refill_rate, 1.0);
        assert_eq!(config.idle_eviction_window, Duration::from_secs(600));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "capacity": 5,
            "refill_rate": 0.5,
            "idle_eviction_window": "30m",
            "sweep_interval": "15s"
        }"#;

        let config: RateLimitConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.capacity, 5.0);
        assert_eq!(config.refill_rate, 0.5);
        assert_eq!(config.idle_eviction_window, Duration::from_secs(30 * 60));
        assert_eq!(config.sweep_interval, Duration::from_secs(15));

        let policy = RateLimitPolicy::try_from(config).unwrap();
        assert_eq!(policy.capacity(), 5.0);
        assert_eq!(policy.limit().rate(), 0.5);
        assert_eq!(policy.sweep_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_config_defaults_in_json() {
        let config: RateLimitConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RateLimitConfig::default());
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let json = r#"{ "burst": 5 }"#;
        assert!(serde_json::from_str::<RateLimitConfig>(json).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = RateLimitConfig {
            capacity: 0.0,
            ..RateLimitConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            Error::InvalidCapacity { capacity: 0.0 }
        );
    }

    #[test]
    fn test_invalid_rate_rejected() {
        for rate in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let result = RateLimitPolicy::new(5.0, rate, Duration::from_secs(1));
            assert!(matches!(result, Err(Error::InvalidLimit { .. })), "{rate}");
        }
    }

    #[test]
    fn test_zero_windows_rejected() {
        assert_eq!(
            RateLimitPolicy::new(5.0, 1.0, Duration::ZERO).unwrap_err(),
            Error::InvalidEvictionWindow {
                window: Duration::ZERO
            }
        );

        let policy = RateLimitPolicy::new(5.0, 1.0, Duration::from_secs(1)).unwrap();
        assert_eq!(
            policy.with_sweep_interval(Duration::ZERO).unwrap_err(),
            Error::InvalidSweepInterval {
                interval: Duration::ZERO
            }
        );
    }

    #[test]
    fn test_search_policy_is_valid() {
        let search = RateLimitPolicy::search();
        let revalidated = RateLimitPolicy::new(
            search.capacity(),
            search.limit().rate(),
            search.idle_eviction_window(),
        )
        .unwrap();
        assert_eq!(search, revalidated);
    }
}
