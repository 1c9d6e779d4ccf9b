//! SubscriptionId - Monotonic subscription identifier
//!
//! Numeric internally, rendered as a decimal string on the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Subscription identifier.
///
/// Assigned by the registry from a strictly increasing counter starting at 1,
/// so an id is never handed out twice within a process lifetime. Ordering
/// follows assignment order.
///
/// # Examples
/// ```
/// use contracts::SubscriptionId;
///
/// let id: SubscriptionId = "42".parse().unwrap();
/// assert_eq!(id.value(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Create an id from its numeric value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Numeric value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SubscriptionId {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for SubscriptionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

// Serde - serialize as string on the wire
impl Serialize for SubscriptionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SubscriptionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_decimal() {
        assert_eq!(SubscriptionId::new(1).to_string(), "1");
        assert_eq!(SubscriptionId::new(1234).to_string(), "1234");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("abc".parse::<SubscriptionId>().is_err());
        assert_eq!(" 7 ".parse::<SubscriptionId>().unwrap(), SubscriptionId::new(7));
    }

    #[test]
    fn test_ordering_follows_value() {
        assert!(SubscriptionId::new(2) > SubscriptionId::new(1));
    }

    #[test]
    fn test_serde_as_string() {
        let id = SubscriptionId::new(9);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"9\"");

        let back: SubscriptionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
