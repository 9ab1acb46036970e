//! The refresh rate value type.

use crate::error::ParseRateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// A display refresh rate in Hz. Always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshRate(NonZeroU32);

impl RefreshRate {
    /// Rate applied while the tile is off, unless the user saved another.
    pub const DEFAULT_OFF: RefreshRate = RefreshRate(NonZeroU32::new(60).unwrap());
    /// Rate applied while the tile is on, unless the user saved another.
    pub const DEFAULT_ON: RefreshRate = RefreshRate(NonZeroU32::new(120).unwrap());

    /// Returns `None` for zero.
    pub const fn new(hz: u32) -> Option<Self> {
        match NonZeroU32::new(hz) {
            Some(hz) => Some(Self(hz)),
            None => None,
        }
    }

    /// The rate in Hz.
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for RefreshRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<NonZeroU32> for RefreshRate {
    fn from(hz: NonZeroU32) -> Self {
        Self(hz)
    }
}

/// Parses user input such as `" 144 "`.
///
/// ```
/// use hyperfps_core::{ParseRateError, RefreshRate};
///
/// assert_eq!("144".parse::<RefreshRate>().unwrap().get(), 144);
/// assert_eq!("0".parse::<RefreshRate>(), Err(ParseRateError::NotPositive));
/// assert_eq!("-60".parse::<RefreshRate>(), Err(ParseRateError::NotPositive));
/// ```
impl FromStr for RefreshRate {
    type Err = ParseRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseRateError::Empty);
        }

        let value: i64 = s
            .parse()
            .map_err(|_| ParseRateError::NotANumber(s.to_string()))?;
        if value <= 0 {
            return Err(ParseRateError::NotPositive);
        }

        u32::try_from(value)
            .ok()
            .and_then(RefreshRate::new)
            .ok_or_else(|| ParseRateError::NotANumber(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("".parse::<RefreshRate>(), Err(ParseRateError::Empty));
        assert_eq!("   ".parse::<RefreshRate>(), Err(ParseRateError::Empty));
        assert_eq!(
            "90hz".parse::<RefreshRate>(),
            Err(ParseRateError::NotANumber("90hz".to_string()))
        );
        assert_eq!(
            "60.5".parse::<RefreshRate>(),
            Err(ParseRateError::NotANumber("60.5".to_string()))
        );
        assert_eq!("0".parse::<RefreshRate>(), Err(ParseRateError::NotPositive));
        assert!("99999999999".parse::<RefreshRate>().is_err());
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(" 165\n".parse::<RefreshRate>(), Ok(RefreshRate::new(165).unwrap()));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(RefreshRate::DEFAULT_OFF.get(), 60);
        assert_eq!(RefreshRate::DEFAULT_ON.get(), 120);
        assert!(RefreshRate::new(0).is_none());
    }
}
