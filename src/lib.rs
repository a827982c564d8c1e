// SPDX-License-Identifier: Apache-2.0

//! Rate limiting for the site's request handlers.
//!
//! This crate provides a keyed, token bucket-based admission check that
//! handlers call before doing expensive or abusable work such as search.
//! A handler derives a [`RateLimitKey`] for the caller, asks a shared
//! [`RateLimiterRegistry`] whether the key may proceed, and turns a `false`
//! into a "too many requests" response of its own.
//!
//! ```
//! use site_ratelimit::{RateLimitKey, RateLimitPolicy, RateLimiterRegistry};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let registry = RateLimiterRegistry::new(RateLimitPolicy::search());
//! let key = RateLimitKey::for_addr("search", IpAddr::V4(Ipv4Addr::LOCALHOST));
//! assert!(registry.check(key.as_str()));
//! ```

mod config;
mod error;
mod key;
mod registry;
mod tokenbucket;

pub use config::{RateLimitConfig, RateLimitPolicy};
pub use error::Error;
pub use key::RateLimitKey;
pub use registry::RateLimiterRegistry;
pub use tokenbucket::{Clock, Limit, ManualClock, MonoClock, TokenBucket};
