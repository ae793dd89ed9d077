//! Platform adapter layer (spec.md §4.1).
//!
//! One trait, two generic implementing families — `EvmBinaryAdapter` for
//! on-chain binary venues and `RestOddsAdapter` for REST/CLOB odds venues —
//! rather than one bespoke module per venue, mirroring the teacher's own
//! `PolymarketScraper` reusing a single `RateLimiter` across three sub-APIs
//! instead of three clients.

pub mod evm_binary;
pub mod resilience;
pub mod rest_odds;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::model::{Amount, Bet, Direction};
use std::sync::Arc;

pub use evm_binary::EvmBinaryAdapter;
pub use rest_odds::RestOddsAdapter;

/// `getMarketOutcome` result (spec.md §4.1): `winner=None` legitimately
/// represents a draw/void, distinct from "not yet resolved" (`resolved =
/// false`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketOutcome {
    pub resolved: bool,
    pub winner: Option<Direction>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A market's current state as the trend detector and cross-platform
/// signal fuser need it (spec.md §4.5 step 1, §4.6 step 2): a title to
/// extract topics from, total volume, and the current bull/yes probability.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub title: String,
    pub volume: Amount,
    /// Current bull/YES probability, in `[0, 1]`.
    pub probability: f64,
}

/// A disposer for a live subscription (spec.md §4.1 "subscribe... returns a
/// disposer"). Dropping it, or calling `dispose()`, cancels the task.
pub struct SubscriptionHandle {
    cancel: tokio_util::sync::CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn new(cancel: tokio_util::sync::CancellationToken, task: tokio::task::JoinHandle<()>) -> Self {
        SubscriptionHandle { cancel, task }
    }

    pub fn dispose(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// The capability set every venue implements, hiding heterogeneity behind
/// one contract (spec.md §4.1 "Contract").
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> crate::model::Platform;

    /// Verify connectivity; idempotent (chain-id check for EVM, 200 probe
    /// for REST).
    async fn initialize(&self) -> Result<(), EngineError>;

    /// Freshness probe: current block (EVM) or current epoch (REST venues
    /// with their own round numbering).
    async fn current_cursor(&self) -> Result<u64, EngineError>;

    async fn bets_for_user(
        &self,
        address: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bet>, EngineError>;

    async fn bets_for_market(&self, market_id: &str) -> Result<Vec<Bet>, EngineError>;

    async fn trader_bets(&self, address: &str, limit: usize) -> Result<Vec<Bet>, EngineError>;

    async fn recent_bets(&self, window: chrono::Duration, limit: usize) -> Result<Vec<Bet>, EngineError>;

    async fn market_outcome(&self, market_id: &str) -> Result<MarketOutcome, EngineError>;

    /// Current title/volume/probability for one market (spec.md §4.5 step 1
    /// "fetch currently open markets", §4.6 step 2 "read its current
    /// YES/bull probability and volume").
    async fn market_snapshot(&self, market_id: &str) -> Result<MarketSnapshot, EngineError>;

    async fn active_markets(&self, limit: usize) -> Result<Vec<String>, EngineError>;

    async fn is_market_active(&self, market_id: &str) -> Result<bool, EngineError>;

    /// Streams bets found in `[from_cursor, to_cursor]` to `on_bet` in
    /// chunks; restartable from any `from_cursor` (spec.md §4.1 "backfill").
    async fn backfill(
        &self,
        from_cursor: u64,
        to_cursor: u64,
        on_bet: &(dyn Fn(Bet) + Send + Sync),
    ) -> Result<(), EngineError>;

    /// Starts a live feed, publishing `BetDetected` onto `bus`. Returns a
    /// disposer; losing connectivity mid-subscription must not crash the
    /// process (spec.md §4.1 "Resilience requirements").
    async fn subscribe(self: Arc<Self>, bus: Arc<EventBus>) -> SubscriptionHandle;
}
