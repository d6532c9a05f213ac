//! Round references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one scheduled event for a track: `(year, round)`.
///
/// Ordering is lexicographic (year, then round), which the derived `Ord`
/// provides through field order. The canonical string form `"{year}-{round}"`
/// keys entries inside snapshot documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoundRef {
    pub year: i32,
    pub round: u32,
}

/// Errors from parsing the canonical `"{year}-{round}"` form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoundParseError {
    #[error("round reference must be \"year-round\", got {0:?}")]
    MissingSeparator(String),

    #[error("invalid year in round reference {0:?}")]
    InvalidYear(String),

    #[error("invalid round number in round reference {0:?}")]
    InvalidRound(String),
}

impl RoundRef {
    pub fn new(year: i32, round: u32) -> Self {
        Self { year, round }
    }

    /// The entry key used inside snapshot documents and session cache names.
    pub fn entry_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RoundRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.round)
    }
}

impl FromStr for RoundRef {
    type Err = RoundParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, round) = s
            .split_once('-')
            .ok_or_else(|| RoundParseError::MissingSeparator(s.to_string()))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| RoundParseError::InvalidYear(s.to_string()))?;
        let round = round
            .parse::<u32>()
            .map_err(|_| RoundParseError::InvalidRound(s.to_string()))?;
        Ok(RoundRef { year, round })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = RoundRef::new(2019, 6);
        let b = RoundRef::new(2020, 1);
        let c = RoundRef::new(2020, 8);
        assert!(a < b);
        assert!(b < c);
        assert_eq!([c, a, b].iter().max(), Some(&c));
    }

    #[test]
    fn test_display_round_trip() {
        let r = RoundRef::new(2021, 8);
        assert_eq!(r.to_string(), "2021-8");
        assert_eq!("2021-8".parse::<RoundRef>().unwrap(), r);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            "2021".parse::<RoundRef>(),
            Err(RoundParseError::MissingSeparator("2021".to_string()))
        );
        assert!(matches!("x-8".parse::<RoundRef>(), Err(RoundParseError::InvalidYear(_))));
        assert!(matches!("2021-x".parse::<RoundRef>(), Err(RoundParseError::InvalidRound(_))));
        assert!(matches!("2021-".parse::<RoundRef>(), Err(RoundParseError::InvalidRound(_))));
    }

    #[test]
    fn test_serde_shape() {
        let r = RoundRef::new(2021, 8);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"year":2021,"round":8}"#);
    }
}
