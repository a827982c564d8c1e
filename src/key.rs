// SPDX-License-Identifier: Apache-2.0

//! Rate limit keys.
//!
//! A key names one independent bucket. Handlers build it from the client's
//! address and the operation being protected, so that one client hammering
//! search does not use up its allowance for anything else.

use std::fmt;
use std::net::IpAddr;

/// Identity a bucket is tracked under, formatted as `operation:client`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Builds a key from an operation name and an opaque client identity.
    pub fn new(operation: &str, client: impl fmt::Display) -> Self {
        Self(format!("{operation}:{client}"))
    }

    /// Builds a key for a client address.
    ///
    /// IPv4-mapped IPv6 addresses are folded into their IPv4 form so a dual-stack
    /// listener does not give the same client two buckets.
    pub fn for_addr(operation: &str, addr: IpAddr) -> Self {
        Self::new(operation, addr.to_canonical())
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RateLimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RateLimitKey> for String {
    fn from(key: RateLimitKey) -> Self {
        key.0
    }
}
