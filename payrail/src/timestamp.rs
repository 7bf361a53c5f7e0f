//! Unix timestamp utilities for authorization validity windows.
//!
//! [`UnixTimestamp`] bounds every [`PaymentAuthorization`](crate::authorization::PaymentAuthorization):
//! `valid_after` is the first second at which it may settle, `valid_before`
//! the last.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};
use std::time::SystemTime;

/// A Unix timestamp in seconds since 1970-01-01T00:00:00Z.
///
/// # Serialization
///
/// Serialized as a stringified integer so that JavaScript callers never lose
/// precision. Deserialization also accepts a bare JSON integer.
///
/// ```json
/// "1699999999"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(s) => s
                .trim()
                .parse::<u64>()
                .map(Self)
                .map_err(|_| de::Error::custom("timestamp must be a non-negative integer")),
        }
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub<u64> for UnixTimestamp {
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_sub(rhs))
    }
}

impl UnixTimestamp {
    /// Creates a new [`UnixTimestamp`] from a raw seconds value.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current system time.
    ///
    /// A clock set before the Unix epoch reads as `0`, which makes every
    /// authorization look not-yet-valid rather than panicking.
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self(now)
    }

    /// Returns the timestamp as raw seconds since the Unix epoch.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }
}

/// Source of wall-clock time for verification.
///
/// Verification is a pure function of the authorization and "now"; injecting
/// the clock keeps it testable at exact window boundaries.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> UnixTimestamp;
}

/// The process wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixTimestamp {
        UnixTimestamp::now()
    }
}

/// A clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub UnixTimestamp);

impl Clock for FixedClock {
    fn now(&self) -> UnixTimestamp {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_string() {
        let ts = UnixTimestamp::from_secs(1_699_999_999);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1699999999\"");
    }

    #[test]
    fn deserializes_from_string_or_number() {
        let a: UnixTimestamp = serde_json::from_str("\"42\"").unwrap();
        let b: UnixTimestamp = serde_json::from_str("42").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_secs(), 42);
    }

    #[test]
    fn rejects_negative_and_garbage() {
        assert!(serde_json::from_str::<UnixTimestamp>("\"-1\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"soon\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("-1").is_err());
    }

    #[test]
    fn arithmetic_saturates() {
        assert_eq!(UnixTimestamp::from_secs(u64::MAX) + 1, UnixTimestamp::from_secs(u64::MAX));
        assert_eq!(UnixTimestamp::from_secs(0) - 1, UnixTimestamp::from_secs(0));
    }
}
