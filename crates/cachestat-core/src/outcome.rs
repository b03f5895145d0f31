//! Cache lookup outcomes and how they count.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheStatError;

/// Outcome reported by the cache layer for one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    Hit,
    /// Stale entry confirmed fresh by the origin.
    Revalidate,
    Miss,
    /// Entry explicitly dropped.
    Invalidate,
}

/// Whether a lookup bumps `hit` as well as `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    HitLike,
    MissLike,
}

impl CacheOutcome {
    pub const ALL: [CacheOutcome; 4] = [
        CacheOutcome::Hit,
        CacheOutcome::Revalidate,
        CacheOutcome::Miss,
        CacheOutcome::Invalidate,
    ];

    /// A revalidated entry avoided regenerating the response, so it counts as a
    /// hit. An invalidation never does.
    pub fn classify(self) -> Classification {
        match self {
            CacheOutcome::Hit | CacheOutcome::Revalidate => Classification::HitLike,
            CacheOutcome::Miss | CacheOutcome::Invalidate => Classification::MissLike,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Revalidate => "revalidate",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Invalidate => "invalidate",
        }
    }
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::HitLike => "hit",
            Classification::MissLike => "miss",
        }
    }

    /// Increment for `hit`; `total` always moves by one.
    pub fn hit_delta(self) -> u64 {
        match self {
            Classification::HitLike => 1,
            Classification::MissLike => 0,
        }
    }
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheOutcome {
    type Err = CacheStatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hit" => Ok(CacheOutcome::Hit),
            "revalidate" => Ok(CacheOutcome::Revalidate),
            "miss" => Ok(CacheOutcome::Miss),
            "invalidate" => Ok(CacheOutcome::Invalidate),
            other => Err(CacheStatError::BadConfig(format!(
                "unknown cache outcome: {other}"
            ))),
        }
    }
}
