//! Canonical domain model (spec.md §3).

pub mod alert;
pub mod amount;
pub mod backtest;
pub mod bet;
pub mod cross_signal;
pub mod platform;
pub mod signal;
pub mod trader;
pub mod trend;

pub use alert::{AlertStatus, AlertType, GamingAlert, Severity};
pub use amount::{Amount, Bps};
pub use backtest::{BacktestResult, BacktestSettings, BacktestTrade, MonthlyReturn, RiskMetrics};
pub use bet::{Bet, Direction, Round, RoundResolution};
pub use cross_signal::{CrossConsensus, CrossPlatformSignal, PlatformSignal};
pub use platform::{Category, Platform, PlatformInfo, ScoreFormula, PLATFORMS};
pub use signal::{Consensus, SignalBet, SmartMoneySignal, Strength};
pub use trader::{ScoreBreakdown, Tier, Trader, TruthScore, UnifiedTrader, UserStats};
pub use trend::{PlatformPresence, TopMarket, TrendingTopic};
