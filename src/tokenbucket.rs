// SPDX-License-Identifier: Apache-2.0

//! A continuous-refill token bucket.
//!
//! The bucket holds a fractional number of tokens that grows at a fixed rate up to
//! a fixed capacity. Admission checks either debit the requested amount or leave
//! the (refilled) balance untouched and report a denial. Nothing here blocks or
//! waits for a permit; callers that are denied decide for themselves what to do.
//!
//! The bucket itself is a plain `&mut self` value. Sharing it between threads is
//! the job of [`RateLimiterRegistry`](crate::RateLimiterRegistry), which keeps one
//! lock per bucket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Error;

/// A trait for abstracting time operations to enable testing.
pub trait Clock {
    /// Returns the current instant in time.
    fn now(&self) -> Instant;
}

/// Standard monotonic clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonoClock;

impl Clock for MonoClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// A clock that only moves when told to.
///
/// Intended for tests and simulations that need to reason about elapsed time
/// without sleeping. Safe to advance from one thread while others read it.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    nanos: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            nanos: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_add(nanos))
            });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let nanos = self.nanos.load(Ordering::Relaxed);
        self.base + Duration::from_nanos(nanos)
    }
}

/// Rate limit expressed as tokens per second.
/// Must be finite and positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit(pub(crate) f64);

impl Limit {
    /// Creates a new rate limit from tokens per second.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLimit` if the rate is not finite, negative, or zero.
    pub fn new(tokens_per_second: f64) -> Result<Self, Error> {
        if !tokens_per_second.is_finite() || tokens_per_second <= 0.0 {
            return Err(Error::InvalidLimit {
                rate: tokens_per_second,
            });
        }
        Ok(Limit(tokens_per_second))
    }

    /// Returns the rate as tokens per second.
    pub fn rate(self) -> f64 {
        self.0
    }

    /// Converts a duration to the number of tokens that could be accumulated at this rate.
    fn tokens_from_duration(self, duration: Duration) -> f64 {
        duration.as_secs_f64() * self.0
    }
}

/// A single token bucket.
///
/// Starts full. Every check first refills the bucket for the time elapsed since
/// the previous check, capped at `capacity`, and then tries to debit.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Maximum number of tokens the bucket can hold.
    capacity: f64,
    /// Refill rate.
    limit: Limit,
    /// Current number of available tokens, always in `[0, capacity]`.
    tokens: f64,
    /// Last time the token count was updated.
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCapacity` if `capacity` is not finite, negative, or zero.
    pub fn new(capacity: f64, limit: Limit, now: Instant) -> Result<Self, Error> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(Error::InvalidCapacity { capacity });
        }
        Ok(Self::full(capacity, limit, now))
    }

    /// Builds a full bucket from values that were already validated.
    pub(crate) fn full(capacity: f64, limit: Limit, now: Instant) -> Self {
        TokenBucket {
            capacity,
            limit,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Returns the burst capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Returns the refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        self.limit.rate()
    }

    /// Returns the token balance as of the last check, without refilling.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Returns the number of tokens that would be available at `at`.
    /// Does not modify the bucket.
    pub fn tokens_at(&self, at: Instant) -> f64 {
        self.advance_at(at)
    }

    /// Tries to take one token at the current monotonic time.
    pub fn try_acquire(&mut self) -> bool {
        self.try_consume(1.0)
    }

    /// Tries to take `amount` tokens at the current monotonic time.
    pub fn try_consume(&mut self, amount: f64) -> bool {
        self.try_consume_at(MonoClock.now(), amount)
    }

    /// Refills the bucket up to `at` and then tries to take `amount` tokens.
    ///
    /// Returns `true` when the tokens were debited. On `false` the balance keeps
    /// the refill but nothing is taken. An `amount` larger than the capacity can
    /// never be satisfied, and an `amount` that is not a finite positive number is
    /// always denied.
    pub fn try_consume_at(&mut self, at: Instant, amount: f64) -> bool {
        let tokens = self.advance(at);

        if !(amount.is_finite() && amount > 0.0) {
            return false;
        }

        if tokens >= amount {
            // Clamp guards against rounding pushing the balance below zero.
            self.tokens = (tokens - amount).max(0.0);
            true
        } else {
            false
        }
    }

    /// Computes the refilled token count at `at` without modifying the bucket.
    fn advance_at(&self, at: Instant) -> f64 {
        // An instant earlier than the last refill contributes nothing.
        let elapsed = at.saturating_duration_since(self.last_refill);
        let tokens = self.tokens + self.limit.tokens_from_duration(elapsed);
        tokens.min(self.capacity)
    }

    /// Refills the bucket and records `at` as the last refill time.
    fn advance(&mut self, at: Instant) -> f64 {
        let tokens = self.advance_at(at);
        self.tokens = tokens;
        if at > self.last_refill {
            self.last_refill = at;
        }
        tokens
    }
}
