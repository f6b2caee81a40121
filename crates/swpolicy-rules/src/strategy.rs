//! Cache strategy enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RuleError;

/// How a matched request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    NetworkOnly,
    CacheOnly,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::CacheFirst,
        Strategy::NetworkFirst,
        Strategy::StaleWhileRevalidate,
        Strategy::NetworkOnly,
        Strategy::CacheOnly,
    ];

    /// Name of the strategy class in the runtime library.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "CacheFirst",
            Strategy::NetworkFirst => "NetworkFirst",
            Strategy::StaleWhileRevalidate => "StaleWhileRevalidate",
            Strategy::NetworkOnly => "NetworkOnly",
            Strategy::CacheOnly => "CacheOnly",
        }
    }

    /// Whether the strategy reads or writes a cache partition.
    pub fn uses_cache(&self) -> bool {
        !matches!(self, Strategy::NetworkOnly)
    }

    /// Whether the strategy stores network responses.
    pub fn writes_cache(&self) -> bool {
        matches!(
            self,
            Strategy::CacheFirst | Strategy::NetworkFirst | Strategy::StaleWhileRevalidate
        )
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| RuleError::UnknownStrategy(s.to_string()))
    }
}
