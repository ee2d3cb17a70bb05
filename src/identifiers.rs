//! Type-safe identifiers.
//!
//! Newtype wrappers keep endpoint names, connection IDs and subscription IDs
//! from being mixed up at compile time.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// One or more `/`-separated segments of URL-safe characters.
static ENDPOINT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+(/[A-Za-z0-9_.\-]+)*$").ok());

/// Counter backing [`ConnectionId::next`].
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Counter backing [`SubscriptionId::next`].
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Endpoint
// ============================================================================

/// Logical real-time channel name, e.g. `notifications` or `proctoring/42`.
///
/// The name becomes the path suffix of the transport URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(String);

impl Endpoint {
    /// Parses and validates an endpoint name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is empty, has leading or
    /// trailing slashes, or contains characters outside `[A-Za-z0-9_.-/]`.
    pub fn parse(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        let valid = ENDPOINT_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(name));
        if !valid {
            return Err(Error::invalid_argument(format!(
                "invalid endpoint name {name:?}: expected segments of [A-Za-z0-9_.-] separated by '/'"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Returns the endpoint name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first path segment (`proctoring` for `proctoring/42`).
    #[inline]
    #[must_use]
    pub fn root(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Endpoint {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Process-unique identifier of one Connection object.
///
/// A reconnection replaces the Connection and therefore the ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next connection ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifier of one listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next subscription ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_accepts_nested_names() {
        let endpoint = Endpoint::parse("proctoring/42").expect("valid endpoint");
        assert_eq!(endpoint.as_str(), "proctoring/42");
        assert_eq!(endpoint.root(), "proctoring");
        assert_eq!(endpoint.to_string(), "proctoring/42");
    }

    #[test]
    fn test_endpoint_rejects_invalid_names() {
        for name in ["", "/notifications", "notifications/", "a//b", "has space", "q?x=1"] {
            let err = Endpoint::parse(name).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument { .. }), "{name:?}");
        }
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_subscription_id_display() {
        let id = SubscriptionId::next();
        assert!(id.to_string().starts_with("sub-"));
    }
}
