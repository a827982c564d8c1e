// SPDX-License-Identifier: Apache-2.0

//! Errors for the rate limit crate.

use std::time::Duration;

/// Errors that can occur when configuring a rate limiter.
///
/// A denied admission check is not an error; it is reported as `false`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The rate limit is invalid (not finite, negative, or zero).
    #[error("Invalid rate limit: {rate}. Rate must be finite and positive.")]
    InvalidLimit {
        /// The invalid rate value.
        rate: f64,
    },

    /// The bucket capacity is invalid (not finite, negative, or zero).
    #[error("Invalid capacity: {capacity}. Capacity must be finite and positive.")]
    InvalidCapacity {
        /// The invalid capacity.
        capacity: f64,
    },

    /// The idle eviction window is zero.
    #[error("Invalid idle eviction window: {window:?}. Window must be greater than zero.")]
    InvalidEvictionWindow {
        /// The invalid window.
        window: Duration,
    },

    /// The eviction sweep interval is zero.
    #[error("Invalid sweep interval: {interval:?}. Interval must be greater than zero.")]
    InvalidSweepInterval {
        /// The invalid interval.
        interval: Duration,
    },
}
