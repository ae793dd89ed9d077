//! `CrossPlatformSignal` (spec.md §3, §4.6).

use crate::model::amount::{Amount, Bps};
use crate::model::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossConsensus {
    StrongYes,
    LeanYes,
    Mixed,
    LeanNo,
    StrongNo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSignal {
    pub platform: Platform,
    pub market_id: String,
    /// YES/bull probability for the platform's highest-volume market on
    /// this topic, stored as basis points for exact equality tests.
    pub probability: Bps,
    pub volume: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossPlatformSignal {
    pub topic: String,
    pub consensus: CrossConsensus,
    /// 0..100.
    pub confidence: f64,
    pub volume_weighted_probability: Bps,
    pub platforms: Vec<PlatformSignal>,
    pub total_volume: Amount,
    pub market_count: u32,
    pub expires_at: DateTime<Utc>,
}

impl CrossPlatformSignal {
    /// spec.md §8 invariant: `platforms.length >= 2 && 0 <= confidence <= 100`.
    pub fn check_invariants(&self) -> bool {
        self.platforms.len() >= 2 && (0.0..=100.0).contains(&self.confidence)
    }
}
