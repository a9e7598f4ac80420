use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy identity: family name plus the instrument legs it trades.
///
/// Formatted as `family:LEG_A[/LEG_B]`, e.g. `pairs:ES/NQ`. Ordering is
/// lexicographic on that string, which fixes the dispatch order of a
/// portfolio manager.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StrategyId(pub String);

impl StrategyId {
    pub fn new(family: &str, legs: &[String]) -> Self {
        Self(format!("{family}:{}", legs.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic dataset hash (content hash of the loaded bars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
