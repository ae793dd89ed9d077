//! `SmartMoneySignal` (spec.md §3, §4.4).

use crate::model::amount::Amount;
use crate::model::platform::Platform;
use crate::model::trader::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Consensus {
    Bull,
    Bear,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

/// One contributing bet to a `SmartMoneySignal` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalBet {
    pub trader: String,
    pub tier: Tier,
    pub amount: Amount,
    pub direction_bull: bool,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartMoneySignal {
    pub platform: Platform,
    pub epoch: u64,
    pub consensus: Consensus,
    /// 0..100.
    pub confidence: f64,
    pub weighted_bull_percent: f64,
    pub participating_traders: usize,
    pub diamond_trader_count: usize,
    pub platinum_trader_count: usize,
    pub total_volume: Amount,
    pub strength: Strength,
    pub top_trader_agreement_percent: f64,
    pub contributing_bets: Vec<SignalBet>,
    pub updated_at: DateTime<Utc>,
}

impl SmartMoneySignal {
    pub fn natural_key(&self) -> (Platform, u64) {
        (self.platform, self.epoch)
    }
}
