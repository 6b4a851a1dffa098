//! Bucket statistics reported by the server.
//!
//! `STATS` replies, and the detail text after `OK`/`WAIT` on `CONSUME`,
//! carry a comma-separated `key=value` list:
//!
//! ```text
//! tokens=0.42,rate=1.0,capacity=5
//! ```

use std::str::FromStr;

use serde::Serialize;

use crate::error::TokenBucketError;

/// Snapshot of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketStats {
    /// Tokens currently available (fractional while refilling).
    pub tokens: f64,
    /// Refill rate in tokens per second.
    pub rate: f64,
    /// Maximum number of tokens.
    pub capacity: u64,
}

impl FromStr for BucketStats {
    type Err = TokenBucketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || TokenBucketError::UnrecognizedStatus(s.to_string());

        let mut tokens = None;
        let mut rate = None;
        let mut capacity = None;

        // Only the first whitespace-separated word; trailing notes are ignored.
        let fields = s.split_whitespace().next().ok_or_else(bad)?;

        for pair in fields.split(',') {
            let (key, value) = pair.split_once('=').ok_or_else(bad)?;
            match key {
                "tokens" => tokens = Some(value.parse::<f64>().map_err(|_| bad())?),
                "rate" => rate = Some(value.parse::<f64>().map_err(|_| bad())?),
                "capacity" => capacity = Some(value.parse::<u64>().map_err(|_| bad())?),
                _ => {}
            }
        }

        match (tokens, rate, capacity) {
            (Some(tokens), Some(rate), Some(capacity)) => Ok(BucketStats {
                tokens,
                rate,
                capacity,
            }),
            _ => Err(bad()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let stats: BucketStats = "tokens=0.42,rate=1.0,capacity=5".parse().unwrap();
        assert_eq!(
            stats,
            BucketStats {
                tokens: 0.42,
                rate: 1.0,
                capacity: 5
            }
        );
    }

    #[test]
    fn test_parse_any_order_and_extra_keys() {
        let stats: BucketStats = "capacity=2,locked=no,rate=0.5,tokens=1".parse().unwrap();
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.rate, 0.5);
        assert_eq!(stats.tokens, 1.0);
    }

    #[test]
    fn test_parse_rejects_incomplete() {
        assert!("tokens=1,rate=1".parse::<BucketStats>().is_err());
        assert!("".parse::<BucketStats>().is_err());
        assert!("tokens=x,rate=1,capacity=1".parse::<BucketStats>().is_err());
        assert!("garbage".parse::<BucketStats>().is_err());
    }

    #[test]
    fn test_serialize_json() {
        let stats = BucketStats {
            tokens: 0.5,
            rate: 2.0,
            capacity: 3,
        };
        assert_eq!(
            serde_json::to_string(&stats).unwrap(),
            r#"{"tokens":0.5,"rate":2.0,"capacity":3}"#
        );
    }
}
