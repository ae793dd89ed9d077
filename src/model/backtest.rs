//! `BacktestResult` and its inputs (spec.md §3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSettings {
    pub leader: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_capital: f64,
    pub allocation_percent: f64,
    pub max_bet_size: f64,
    pub compounding: bool,
    pub stop_loss_percent: Option<f64>,
}

impl BacktestSettings {
    /// Deterministic hash used as part of the cache key (spec.md §4.8 step 7).
    pub fn settings_hash(&self) -> String {
        let mut h = std::collections::hash_map::DefaultHasher::new();
        use std::hash::{Hash, Hasher};
        self.leader.hash(&mut h);
        self.start.timestamp().hash(&mut h);
        self.end.timestamp().hash(&mut h);
        self.initial_capital.to_bits().hash(&mut h);
        self.allocation_percent.to_bits().hash(&mut h);
        self.max_bet_size.to_bits().hash(&mut h);
        self.compounding.hash(&mut h);
        self.stop_loss_percent.map(f64::to_bits).hash(&mut h);
        format!("{:016x}", h.finish())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub bet_id: String,
    pub market_id: String,
    pub timestamp: DateTime<Utc>,
    pub copy_amount: f64,
    pub won: bool,
    pub pnl: f64,
    pub portfolio_after: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MonthlyReturn {
    pub month: String, // "YYYY-MM"
    pub return_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub total_return_percent: f64,
    pub annualized_return_percent: f64,
    pub max_drawdown_percent: f64,
    pub max_drawdown_at: Option<DateTime<Utc>>,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub settings: BacktestSettings,
    pub trades: Vec<BacktestTrade>,
    pub metrics: RiskMetrics,
    pub monthly_returns: Vec<MonthlyReturn>,
    pub best_month: Option<MonthlyReturn>,
    pub worst_month: Option<MonthlyReturn>,
    pub win_rate: f64,
    pub total_trades: usize,
    pub computed_at: DateTime<Utc>,
}
