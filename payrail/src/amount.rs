//! Token amounts in a token's smallest unit.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// An integer token amount in the smallest unit (e.g. `10000` = 0.01 USDC).
///
/// The wire form is a decimal string; bare JSON integers are accepted too.
/// Negative input parses successfully so that verification can reject it with
/// a precise reason instead of a generic body error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    magnitude: U256,
    negative: bool,
}

impl TokenAmount {
    /// Zero.
    pub const ZERO: Self = Self {
        magnitude: U256::ZERO,
        negative: false,
    };

    /// Creates a non-negative amount.
    #[must_use]
    pub const fn new(value: U256) -> Self {
        Self {
            magnitude: value,
            negative: false,
        }
    }

    /// Whether the amount is strictly greater than zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        !self.negative && !self.magnitude.is_zero()
    }

    /// The amount as an unsigned integer, or `None` when negative.
    #[must_use]
    pub const fn to_u256(&self) -> Option<U256> {
        if self.negative {
            None
        } else {
            Some(self.magnitude)
        }
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self::new(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self::new(value)
    }
}

/// Error returned when a string is not a base-10 integer.
#[derive(Debug, thiserror::Error)]
#[error("invalid token amount {0:?}: expected a base-10 integer")]
pub struct TokenAmountParseError(String);

impl FromStr for TokenAmount {
    type Err = TokenAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenAmountParseError(s.to_owned()));
        }
        let magnitude = U256::from_str_radix(digits, 10)
            .map_err(|_| TokenAmountParseError(s.to_owned()))?;
        Ok(Self {
            magnitude,
            negative: negative && !magnitude.is_zero(),
        })
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(de::Error::custom),
            Raw::Unsigned(n) => Ok(Self::from(n)),
            Raw::Signed(n) => Ok(Self {
                magnitude: U256::from(n.unsigned_abs()),
                negative: n < 0,
            }),
        }
    }
}

/// Serializes `amount` as a JSON number when it fits in a `u64`, and as
/// the decimal string otherwise.
///
/// # Errors
///
/// Propagates the serializer's error.
pub fn serialize_as_number<S: Serializer>(
    amount: &TokenAmount,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match amount.to_u256().and_then(|value| u64::try_from(value).ok()) {
        Some(value) => serializer.serialize_u64(value),
        None => amount.serialize(serializer),
    }
}
