//! Trader / reputation entities (spec.md §3: `Trader`, `UserStats`, `TruthScore`).

use crate::model::amount::Amount;
use crate::model::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    /// Threshold table from spec.md §4.2 ("Unified score").
    pub fn for_score(total_score: f64) -> Tier {
        if total_score >= 900.0 {
            Tier::Diamond
        } else if total_score >= 650.0 {
            Tier::Platinum
        } else if total_score >= 400.0 {
            Tier::Gold
        } else if total_score >= 200.0 {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }

    /// Weight used by the smart-money aggregator (spec.md §4.4 step 3).
    pub fn weight(self) -> f64 {
        match self {
            Tier::Diamond => 5.0,
            Tier::Platinum => 3.0,
            Tier::Gold => 2.0,
            Tier::Silver => 1.5,
            Tier::Bronze => 1.0,
        }
    }
}

/// A trader identified by lower-cased hex address, with a unified reputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trader {
    pub address: String,
    pub first_seen: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Trader {
    pub fn new(address: &str, now: DateTime<Utc>) -> Trader {
        Trader {
            address: address.to_lowercase(),
            first_seen: now,
            last_active: now,
        }
    }
}

/// Per-(trader, platform) rollup (spec.md §3 `UserStats`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserStats {
    pub address: String,
    pub platform: Option<Platform>,
    pub total_bets: u64,
    pub wins: u64,
    pub losses: u64,
    pub pending: u64,
    pub volume: Amount,
    /// Sum of realized PnL (wins - losses) in canonical units; used by the
    /// odds-market ROI score formula.
    pub realized_pnl: Amount,
    pub first_bet_at: Option<DateTime<Utc>>,
    pub last_bet_at: Option<DateTime<Utc>>,
}

impl UserStats {
    /// Invariant 3: `totalBets = wins + losses + pending`.
    pub fn win_rate(&self) -> f64 {
        let decided = self.wins + self.losses;
        if decided == 0 {
            0.0
        } else {
            self.wins as f64 / decided as f64
        }
    }

    pub fn assert_invariants(&self) {
        debug_assert_eq!(self.total_bets, self.wins + self.losses + self.pending);
    }
}

/// Per-platform contribution to a trader's unified `TruthScore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub platform: Platform,
    pub score: f64,
    pub weight: f64,
}

/// Unified, reproducible reputation (spec.md §3 `TruthScore`, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthScore {
    pub address: String,
    pub total_score: f64,
    pub breakdown: Vec<ScoreBreakdown>,
    pub tier: Tier,
    pub last_updated: DateTime<Utc>,
}

/// A trader row as exposed on the unified leaderboard / `/api/trader/:address`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedTrader {
    pub address: String,
    pub total_score: f64,
    pub tier: Tier,
    pub active_platforms: usize,
    pub breakdown: Vec<ScoreBreakdown>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_thresholds_match_spec() {
        assert_eq!(Tier::for_score(0.0), Tier::Bronze);
        assert_eq!(Tier::for_score(199.9), Tier::Bronze);
        assert_eq!(Tier::for_score(200.0), Tier::Silver);
        assert_eq!(Tier::for_score(400.0), Tier::Gold);
        assert_eq!(Tier::for_score(650.0), Tier::Platinum);
        assert_eq!(Tier::for_score(900.0), Tier::Diamond);
        assert_eq!(Tier::for_score(551.0), Tier::Gold);
    }

    #[test]
    fn win_rate_ignores_pending() {
        let stats = UserStats {
            total_bets: 10,
            wins: 6,
            losses: 2,
            pending: 2,
            ..Default::default()
        };
        assert_eq!(stats.win_rate(), 6.0 / 8.0);
    }
}
