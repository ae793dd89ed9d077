//! `Bet`, `Market`/`Round` (spec.md §3).

use crate::model::amount::Amount;
use crate::model::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bull,
    Bear,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Bull => "bull",
            Direction::Bear => "bear",
        }
    }
}

/// A single bet, normalized to the canonical `bull`/`bear` abstraction at
/// adapter ingress (spec.md §4.1 "Normalization at ingress").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub trader: String,
    pub platform: Platform,
    pub market_id: String,
    pub direction: Direction,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: Option<String>,
    pub block_height: Option<u64>,
    pub log_index: Option<u64>,
    /// `None` until the round resolves (invariant: set only after resolution).
    pub won: Option<bool>,
    /// Set only when `won == Some(true)`.
    pub claimed_amount: Option<Amount>,
}

impl Bet {
    /// Natural identity used for idempotent upsert (spec.md §3 "Ownership &
    /// lifecycle"): `(platform, txHash, logIndex)` when on-chain, else the
    /// adapter-assigned `id`.
    pub fn dedup_key(&self) -> String {
        match (&self.tx_hash, self.log_index) {
            (Some(tx), Some(idx)) => format!("{}:{tx}:{idx}", self.platform.as_str()),
            _ => format!("{}:{}", self.platform.as_str(), self.id),
        }
    }

    /// Invariant 2: `won = (direction=='bull' && bullWins) || (direction=='bear' && !bullWins)`.
    /// `bull_wins = None` represents a draw/void: no bet can have won it.
    pub fn resolve(&mut self, bull_wins: Option<bool>) {
        self.won = bull_wins.map(|bw| (self.direction == Direction::Bull) == bw);
    }
}

/// Resolution state of a round (spec.md §3 `Market`/`Round`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResolution {
    pub oracle_called: bool,
    /// `None` is a legitimate draw/void outcome, distinct from "not yet resolved".
    pub winner: Option<Direction>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub market_id: String,
    pub platform: Platform,
    pub epoch: u64,
    pub open_at: DateTime<Utc>,
    pub lock_at: DateTime<Utc>,
    pub close_at: DateTime<Utc>,
    pub bull_amount: Amount,
    pub bear_amount: Amount,
    pub total_amount: Amount,
    pub resolution: RoundResolution,
}

impl Round {
    /// Invariant 1: `bullAmount + bearAmount <= totalAmount` (difference is fee).
    pub fn amounts_consistent(&self) -> bool {
        match self.bull_amount.checked_add(self.bear_amount) {
            Some(sum) => sum <= self.total_amount,
            None => false,
        }
    }

    pub fn bull_wins(&self) -> Option<bool> {
        if !self.resolution.oracle_called {
            return None;
        }
        self.resolution.winner.map(|w| w == Direction::Bull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::amount::Amount;

    fn round(bull: i128, bear: i128, total: i128) -> Round {
        Round {
            market_id: "m1".into(),
            platform: Platform::PancakeSwapPrediction,
            epoch: 1001,
            open_at: Utc::now(),
            lock_at: Utc::now(),
            close_at: Utc::now(),
            bull_amount: Amount(bull),
            bear_amount: Amount(bear),
            total_amount: Amount(total),
            resolution: RoundResolution {
                oracle_called: true,
                winner: Some(Direction::Bull),
                resolved_at: Some(Utc::now()),
            },
        }
    }

    #[test]
    fn fee_difference_is_allowed() {
        assert!(round(40, 40, 100).amounts_consistent());
        assert!(round(40, 40, 80).amounts_consistent());
        assert!(!round(40, 40, 79).amounts_consistent());
    }

    #[test]
    fn resolve_sets_won_per_direction() {
        let mut bet = Bet {
            id: "b1".into(),
            trader: "0xa".into(),
            platform: Platform::PancakeSwapPrediction,
            market_id: "m1".into(),
            direction: Direction::Bull,
            amount: Amount::from_native_f64(0.1),
            timestamp: Utc::now(),
            tx_hash: None,
            block_height: None,
            log_index: None,
            won: None,
            claimed_amount: None,
        };
        bet.resolve(Some(true));
        assert_eq!(bet.won, Some(true));

        bet.direction = Direction::Bear;
        bet.resolve(Some(true));
        assert_eq!(bet.won, Some(false));

        // Draw/void: no side wins.
        bet.resolve(None);
        assert_eq!(bet.won, None);
    }

    #[test]
    fn dedup_key_prefers_tx_and_log_index() {
        let bet = Bet {
            id: "ignored".into(),
            trader: "0xa".into(),
            platform: Platform::Polymarket,
            market_id: "m1".into(),
            direction: Direction::Bull,
            amount: Amount::ZERO,
            timestamp: Utc::now(),
            tx_hash: Some("0xabc".into()),
            block_height: Some(10),
            log_index: Some(2),
            won: None,
            claimed_amount: None,
        };
        assert_eq!(bet.dedup_key(), "polymarket:0xabc:2");
    }
}
