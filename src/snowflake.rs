//! Snowflake ID utilities: ordered 64-bit identifiers whose high 42 bits
//! encode a millisecond timestamp relative to a fixed epoch.
//!
//! IDs travel as decimal strings everywhere (checkpoints, wire payloads) so
//! they never pass through floating point. Cursor arithmetic is the only
//! math performed on them: a floor-at-zero decrement for `max_id:` cursors
//! and ordering comparisons for watermarks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Epoch of the ID scheme, in Unix milliseconds (2010-11-04T01:42:54.657Z).
pub const SNOWFLAKE_EPOCH_MS: u64 = 1_288_834_974_657;

/// Bits below the timestamp (worker id + sequence).
const TIMESTAMP_SHIFT: u32 = 22;

/// An ordered 64-bit content identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnowflakeId(u64);

impl SnowflakeId {
    pub const MIN: SnowflakeId = SnowflakeId(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Decrement flooring at zero. Used to turn an inclusive floor into the
    /// exclusive `max_id:` upper bound.
    pub fn saturating_dec(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Creation time encoded in the high bits, as Unix milliseconds.
    pub fn timestamp_ms(self) -> u64 {
        (self.0 >> TIMESTAMP_SHIFT) + SNOWFLAKE_EPOCH_MS
    }

    /// Creation time as a UTC timestamp. Falls back to the epoch itself for
    /// the degenerate all-zero ID.
    pub fn created_at(self) -> DateTime<Utc> {
        let ms = self.timestamp_ms() as i64;
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or_else(|| Utc.timestamp_millis_opt(SNOWFLAKE_EPOCH_MS as i64).unwrap())
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnowflakeId({})", self.0)
    }
}

impl FromStr for SnowflakeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(SnowflakeId)
    }
}

impl From<u64> for SnowflakeId {
    fn from(raw: u64) -> Self {
        SnowflakeId(raw)
    }
}

// Decimal string on the wire; accept a bare integer too since some provider
// payloads carry numeric ids.
impl Serialize for SnowflakeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for SnowflakeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = SnowflakeId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal-string or integer 64-bit id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(|_| E::custom(format!("bad id `{v}`")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(SnowflakeId(v))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Qualify a query with an exclusive upper-bound cursor: only items with
/// `id <= max_id` are returned by the provider, so callers pass the
/// decremented floor.
pub fn with_max_id(query: &str, max_id: SnowflakeId) -> String {
    format!("{query} max_id:{max_id}")
}

/// Qualify a query with an exclusive lower-bound cursor: only items with
/// `id > since_id` are returned.
pub fn with_since_id(query: &str, since_id: SnowflakeId) -> String {
    format!("{query} since_id:{since_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let id: SnowflakeId = "1763069223364739073".parse().unwrap();
        assert_eq!(id.to_string(), "1763069223364739073");
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<SnowflakeId>().is_err());
        assert!("abc".parse::<SnowflakeId>().is_err());
        assert!("-5".parse::<SnowflakeId>().is_err());
        // one past u64::MAX
        assert!("18446744073709551616".parse::<SnowflakeId>().is_err());
    }

    #[test]
    fn decrement_floors_at_zero() {
        assert_eq!(SnowflakeId::new(5).saturating_dec(), SnowflakeId::new(4));
        assert_eq!(SnowflakeId::MIN.saturating_dec(), SnowflakeId::MIN);
    }

    #[test]
    fn ordering_matches_created_at() {
        // Real ids from early 2024; the larger id must decode to the later time.
        let a = SnowflakeId::new(1_750_000_000_000_000_000);
        let b = SnowflakeId::new(1_760_000_000_000_000_000);
        assert!(a < b);
        assert!(a.created_at() < b.created_at());
    }

    #[test]
    fn timestamp_derivation() {
        // id 0 decodes to the epoch itself.
        assert_eq!(SnowflakeId::MIN.timestamp_ms(), SNOWFLAKE_EPOCH_MS);
        let id = SnowflakeId::new(1u64 << 22);
        assert_eq!(id.timestamp_ms(), SNOWFLAKE_EPOCH_MS + 1);
    }

    #[test]
    fn cursor_injection() {
        let id = SnowflakeId::new(901);
        assert_eq!(
            with_max_id("from:fed", id.saturating_dec()),
            "from:fed max_id:900"
        );
        assert_eq!(with_since_id("from:fed", id), "from:fed since_id:901");
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let id = SnowflakeId::new(u64::MAX);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"18446744073709551615\"");
        let back: SnowflakeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        // numeric form is accepted on input
        let num: SnowflakeId = serde_json::from_str("901").unwrap();
        assert_eq!(num, SnowflakeId::new(901));
    }
}
