// SPDX-License-Identifier: Apache-2.0

//! Keyed registry of token buckets.
//!
//! Each key gets its own [`TokenBucket`], created full on the first check and
//! dropped once the key has been idle for the policy's eviction window. The
//! registry is meant to be built once at startup and shared by `Arc` with every
//! handler that needs it.
//!
//! Locking is per key. The key map is a sharded [`DashMap`] whose shard locks are
//! only held long enough to look up or insert an entry handle; the refill and
//! debit happen under a mutex owned by that single entry.

use crate::config::RateLimitPolicy;
use crate::tokenbucket::{Clock, MonoClock, TokenBucket};
use dashmap::DashMap;
use log::{debug, info, trace};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// State guarded by a key's lock.
#[derive(Debug)]
struct Slot {
    bucket: TokenBucket,
    last_access: Instant,
}

type Entry = Arc<Mutex<Slot>>;

/// Concurrent map from caller identity to an independent token bucket.
pub struct RateLimiterRegistry<C: Clock = MonoClock> {
    /// Live buckets by key.
    buckets: DashMap<String, Entry>,
    /// Applied to every bucket this registry creates.
    policy: RateLimitPolicy,
    /// Time source for refills and idle tracking.
    clock: C,
    /// When the last eviction sweep ran.
    last_sweep: Mutex<Instant>,
}

impl RateLimiterRegistry {
    /// Creates a registry on the monotonic system clock.
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_clock(policy, MonoClock)
    }
}

impl<C: Clock> RateLimiterRegistry<C> {
    /// Creates a registry reading time from `clock`.
    pub fn with_clock(policy: RateLimitPolicy, clock: C) -> Self {
        info!(
            "rate limiter registry created: capacity={} refill_rate={}/s idle_eviction_window={:?}",
            policy.capacity(),
            policy.limit().rate(),
            policy.idle_eviction_window()
        );
        let now = clock.now();
        Self {
            buckets: DashMap::new(),
            policy,
            clock,
            last_sweep: Mutex::new(now),
        }
    }

    /// Returns the policy buckets are created with.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Checks whether `key` may proceed with a single token.
    #[inline]
    pub fn check(&self, key: &str) -> bool {
        self.check_rate_limit(key, 1.0)
    }

    /// Checks whether `key` may proceed, consuming `amount` tokens if so.
    ///
    /// Unseen keys start with a full bucket. The key counts as active whether or
    /// not the check is admitted. A `false` result means "reject this request
    /// now"; the registry never retries or waits on the caller's behalf.
    pub fn check_rate_limit(&self, key: &str, amount: f64) -> bool {
        let now = self.clock.now();
        self.maybe_sweep(now);

        let entry = self.entry(key, now);
        let admitted = {
            let mut slot = entry.lock();
            if now > slot.last_access {
                slot.last_access = now;
            }
            slot.bucket.try_consume_at(now, amount)
        };

        if !admitted {
            debug!("rate limit exceeded for key {key} (amount {amount})");
        }
        admitted
    }

    /// Returns the tokens currently available to `key` without consuming any,
    /// or `None` if the key has no bucket.
    ///
    /// Does not count as activity for eviction.
    pub fn tokens(&self, key: &str) -> Option<f64> {
        let entry = self.buckets.get(key).map(|e| Arc::clone(e.value()))?;
        let tokens = entry.lock().bucket.tokens_at(self.clock.now());
        Some(tokens)
    }

    /// Returns true if `key` currently has a bucket.
    pub fn contains(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// Returns the number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns true if no key has a bucket.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Removes every bucket idle for longer than the eviction window as of `now`,
    /// returning how many were removed.
    ///
    /// Entries held by a check in progress are skipped; they are active by
    /// definition and will be looked at again on the next sweep.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let window = self.policy.idle_eviction_window();
        let mut evicted = 0;

        self.buckets.retain(|key, entry| {
            // Holding the shard lock means no new handle can be taken out, so a
            // count of one proves no check is using this entry.
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            let idle = match entry.try_lock() {
                Some(slot) => now.saturating_duration_since(slot.last_access) > window,
                None => false,
            };
            if idle {
                trace!("evicting idle rate limit bucket {key}");
                evicted += 1;
            }
            !idle
        });

        if evicted > 0 {
            debug!(
                "evicted {evicted} idle rate limit bucket(s), {} remaining",
                self.buckets.len()
            );
        }
        evicted
    }

    /// Runs [`evict_idle`](Self::evict_idle) if a sweep interval has passed since
    /// the previous sweep. Skips silently if another caller is already sweeping.
    fn maybe_sweep(&self, now: Instant) {
        let Some(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last_sweep) < self.policy.sweep_interval() {
            return;
        }
        *last_sweep = now;
        drop(last_sweep);

        let _ = self.evict_idle(now);
    }

    /// Returns the entry for `key`, inserting a full bucket if there is none.
    fn entry(&self, key: &str, now: Instant) -> Entry {
        if let Some(entry) = self.buckets.get(key) {
            return Arc::clone(entry.value());
        }

        let entry = self.buckets.entry(key.to_owned()).or_insert_with(|| {
            debug!("creating rate limit bucket for key {key}");
            Arc::new(Mutex::new(Slot {
                bucket: TokenBucket::full(self.policy.capacity(), self.policy.limit(), now),
                last_access: now,
            }))
        });
        Arc::clone(entry.value())
    }
}

impl<C> RateLimiterRegistry<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Spawns a task on the current tokio runtime that sweeps idle buckets every
    /// sweep interval.
    ///
    /// The task holds only a weak handle and exits once the registry is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn_evictor(self: &Arc<Self>) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.policy.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let _ = ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    trace!("rate limiter registry dropped, stopping evictor");
                    break;
                };
                let now = registry.clock.now();
                *registry.last_sweep.lock() = now;
                let _ = registry.evict_idle(now);
            }
        })
    }
}
