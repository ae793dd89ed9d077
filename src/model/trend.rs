//! `TrendingTopic` (spec.md §3, §4.5).

use crate::model::amount::Amount;
use crate::model::platform::{Category, Platform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopMarket {
    pub platform: Platform,
    pub market_id: String,
    pub title: String,
    pub volume: Amount,
}

/// A topic's presence on a single platform. A `TrendingTopic`'s presence
/// list contains each platform at most once (invariant 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformPresence {
    pub platform: Platform,
    pub market_count: u32,
    pub volume: Amount,
    pub top_markets: Vec<TopMarket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingTopic {
    /// Normalized topic string — the natural upsert key.
    pub topic: String,
    pub score: f64,
    pub velocity: f64,
    pub total_volume: Amount,
    pub total_markets: u32,
    pub category: Category,
    pub platforms: Vec<PlatformPresence>,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl TrendingTopic {
    /// Invariant (spec.md §8): each platform appears at most once, and the
    /// sum of per-platform market counts equals `total_markets`.
    pub fn check_invariants(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        let mut sum = 0u32;
        for p in &self.platforms {
            if !seen.insert(p.platform) {
                return false;
            }
            sum += p.market_count;
        }
        sum == self.total_markets
    }
}
