//! Smart-money aggregator (spec.md §4.4): per-round consensus among
//! "tracked" (top-N by unified score) high-tier traders.
//!
//! Grounded in the teacher's `signals::engine` event-driven accumulators —
//! state keyed by `(platform, epoch)`, updated incrementally as bets arrive
//! rather than recomputed from scratch each time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analyzers::scoring_support;
use crate::bus::{Event, EventBus};
use crate::config::AnalyzerSettings;
use crate::error::EngineError;
use crate::model::{
    Bet, Consensus, Direction, Platform, Round, ScoreFormula, SignalBet, SmartMoneySignal,
    Strength, Tier,
};
use crate::store::Store;

/// Weight one bet contributes to the round's consensus (spec.md §4.4 step
/// 3: `tierWeight(tier) * log1p(amountNative)`).
pub fn bet_weight(tier: Tier, amount_native: f64) -> f64 {
    tier.weight() * amount_native.max(0.0).ln_1p()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregate {
    pub weighted_bull_percent: f64,
    pub confidence: f64,
    pub participants: usize,
    pub diamond_count: usize,
    pub platinum_count: usize,
    pub total_weight: f64,
}

/// `confidence = f(deviation from 50%, total weight, participant count)`
/// (spec.md §4.4 step 6), clamped to `[0, 100]`.
fn confidence(weighted_bull_percent: f64, total_weight: f64, participants: usize) -> f64 {
    let deviation = (weighted_bull_percent - 50.0).abs();
    let deviation_component = (deviation * 2.0).min(100.0);
    let participant_factor = (participants as f64 / 5.0).min(1.0);
    let weight_factor = (total_weight / 10.0).min(1.0).max(0.3);
    (deviation_component * participant_factor * weight_factor).clamp(0.0, 100.0)
}

fn strength(confidence: f64, participants: usize, diamond: usize, platinum: usize) -> Strength {
    if confidence >= 70.0 && participants >= 5 && (diamond >= 2 || platinum >= 3) {
        Strength::Strong
    } else if confidence >= 50.0 && participants >= 3 {
        Strength::Moderate
    } else {
        Strength::Weak
    }
}

/// Folds a round's contributing bets into its aggregate stats (spec.md §4.4
/// steps 4-6).
pub fn aggregate(contributing: &[SignalBet]) -> Aggregate {
    let mut bull_weight = 0.0;
    let mut total_weight = 0.0;
    let mut diamond_count = 0;
    let mut platinum_count = 0;
    let mut traders = HashSet::new();

    for bet in contributing {
        total_weight += bet.weight;
        if bet.direction_bull {
            bull_weight += bet.weight;
        }
        match bet.tier {
            Tier::Diamond => diamond_count += 1,
            Tier::Platinum => platinum_count += 1,
            _ => {}
        }
        traders.insert(bet.trader.clone());
    }

    let weighted_bull_percent = if total_weight > 0.0 {
        bull_weight / total_weight * 100.0
    } else {
        50.0
    };
    let participants = traders.len();
    let conf = confidence(weighted_bull_percent, total_weight, participants);

    Aggregate {
        weighted_bull_percent,
        confidence: conf,
        participants,
        diamond_count,
        platinum_count,
        total_weight,
    }
}

fn signal_consensus(weighted_bull_percent: f64) -> Consensus {
    if weighted_bull_percent > 60.0 {
        Consensus::Bull
    } else if weighted_bull_percent < 40.0 {
        Consensus::Bear
    } else {
        Consensus::Neutral
    }
}

fn build_signal(platform: Platform, epoch: u64, contributing: Vec<SignalBet>) -> SmartMoneySignal {
    let agg = aggregate(&contributing);
    let total_volume = contributing.iter().fold(crate::model::Amount::ZERO, |acc, b| {
        acc.checked_add(b.amount).unwrap_or(acc)
    });
    SmartMoneySignal {
        platform,
        epoch,
        consensus: signal_consensus(agg.weighted_bull_percent),
        confidence: agg.confidence,
        weighted_bull_percent: agg.weighted_bull_percent,
        participating_traders: agg.participants,
        diamond_trader_count: agg.diamond_count,
        platinum_trader_count: agg.platinum_count,
        total_volume,
        strength: strength(agg.confidence, agg.participants, agg.diamond_count, agg.platinum_count),
        top_trader_agreement_percent: agg.weighted_bull_percent.max(100.0 - agg.weighted_bull_percent),
        contributing_bets: contributing,
        updated_at: Utc::now(),
    }
}

/// Per-round working state plus the refreshed set of tracked traders.
pub struct SmartMoneyAggregator {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    settings: AnalyzerSettings,
    working: Mutex<HashMap<(Platform, u64), Vec<SignalBet>>>,
    tracked: Mutex<HashSet<String>>,
}

impl SmartMoneyAggregator {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, settings: AnalyzerSettings) -> Self {
        SmartMoneyAggregator {
            store,
            bus,
            settings,
            working: Mutex::new(HashMap::new()),
            tracked: Mutex::new(HashSet::new()),
        }
    }

    fn is_tracked(&self, address: &str) -> bool {
        self.tracked.lock().contains(address)
    }

    /// Incorporates a new bet into its round's working signal if the bet's
    /// venue uses the binary-market formula and its trader is tracked
    /// (spec.md §4.4 steps 2-3).
    pub fn handle_bet(&self, bet: &Bet) -> Result<(), EngineError> {
        if bet.platform.info().formula != ScoreFormula::BinaryMarket {
            return Ok(());
        }
        if !self.is_tracked(&bet.trader) {
            return Ok(());
        }
        let Ok(epoch) = bet.market_id.parse::<u64>() else {
            return Ok(());
        };

        let tier = scoring_support::tier_for(&self.store, &bet.trader, &self.settings, Utc::now())?;
        let signal_bet = SignalBet {
            trader: bet.trader.clone(),
            tier,
            amount: bet.amount,
            direction_bull: bet.direction == Direction::Bull,
            weight: bet_weight(tier, bet.amount.as_native_f64()),
        };

        let contributing = {
            let mut working = self.working.lock();
            let entry = working.entry((bet.platform, epoch)).or_default();
            entry.push(signal_bet);
            entry.clone()
        };

        let signal = build_signal(bet.platform, epoch, contributing);
        self.bus.emit(Event::SignalGenerated(signal));
        Ok(())
    }

    /// Persists the round's final signal at lock (spec.md §4.4 "Emission").
    pub fn handle_round_locked(&self, round: &Round) -> Result<(), EngineError> {
        let contributing = self
            .working
            .lock()
            .get(&(round.platform, round.epoch))
            .cloned()
            .unwrap_or_default();
        let signal = build_signal(round.platform, round.epoch, contributing);
        self.store.upsert_smart_money_signal(&signal)?;
        self.bus.emit(Event::SignalGenerated(signal));
        Ok(())
    }

    /// Marks contributing bets resolved and drops the round's working state
    /// (spec.md §4.4 "At round end, mark each contributing bet's won").
    pub fn handle_round_ended(&self, round: &Round) -> Result<(), EngineError> {
        self.store.resolve_bets_for_round(
            round.platform,
            &round.market_id,
            round.epoch,
            round.bull_wins(),
        )?;
        self.working.lock().remove(&(round.platform, round.epoch));
        Ok(())
    }

    async fn refresh_tracked(&self) {
        let traders = match self.store.distinct_traders() {
            Ok(t) => t,
            Err(err) => {
                warn!(error = %err, "tracked-trader refresh: failed to list traders");
                return;
            }
        };
        let now = Utc::now();
        let mut scored: Vec<(String, f64)> = traders
            .into_iter()
            .filter_map(|address| {
                scoring_support::truth_score_for(&self.store, &address, &self.settings, now)
                    .ok()
                    .map(|s| (address, s.total_score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.settings.tracked_trader_count);
        let set: HashSet<String> = scored.into_iter().map(|(a, _)| a).collect();
        debug!(tracked = set.len(), "refreshed tracked-trader set");
        *self.tracked.lock() = set;
    }

    /// Starts the bus-listener and tracked-trader-refresh tasks.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let listener = self.clone();
        handles.push(tokio::spawn(async move {
            let mut rx = listener.bus.subscribe();
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        let result = match &envelope.data {
                            Event::BetDetected(bet) => listener.handle_bet(bet),
                            Event::RoundLocked(round) => listener.handle_round_locked(round),
                            Event::RoundEnded(round) => listener.handle_round_ended(round),
                            _ => Ok(()),
                        };
                        if let Err(err) = result {
                            warn!(error = %err, "smart-money aggregator: event handling failed");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        }));

        let refresher = self;
        handles.push(tokio::spawn(async move {
            info!("smart-money tracked-trader refresh loop starting");
            loop {
                refresher.refresh_tracked().await;
                tokio::time::sleep(refresher.settings.tracked_trader_refresh).await;
            }
        }));

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;

    fn signal_bet(trader: &str, tier: Tier, bull: bool, amount: f64) -> SignalBet {
        SignalBet {
            trader: trader.into(),
            tier,
            amount: Amount::from_native_f64(amount),
            direction_bull: bull,
            weight: bet_weight(tier, amount),
        }
    }

    /// spec.md §8 scenario 2: 3 Diamond + 2 Platinum bull vs 1 Gold bear ->
    /// weightedBullPercent ~98.5%, STRONG.
    #[test]
    fn scenario_2_strong_bull_consensus() {
        let mut bets = Vec::new();
        for i in 0..3 {
            bets.push(signal_bet(&format!("0xd{i}"), Tier::Diamond, true, 1.0));
        }
        for i in 0..2 {
            bets.push(signal_bet(&format!("0xp{i}"), Tier::Platinum, true, 1.0));
        }
        bets.push(signal_bet("0xg0", Tier::Gold, false, 0.2));

        let agg = aggregate(&bets);
        assert!(agg.weighted_bull_percent > 90.0, "got {}", agg.weighted_bull_percent);
        assert_eq!(agg.participants, 6);
        assert_eq!(agg.diamond_count, 3);
        let consensus = signal_consensus(agg.weighted_bull_percent);
        assert_eq!(consensus, Consensus::Bull);
        let s = strength(agg.confidence, agg.participants, agg.diamond_count, agg.platinum_count);
        assert_eq!(s, Strength::Strong);
    }

    #[test]
    fn neutral_when_bull_and_bear_balanced() {
        let bets = vec![
            signal_bet("0xa", Tier::Gold, true, 1.0),
            signal_bet("0xb", Tier::Gold, false, 1.0),
        ];
        let agg = aggregate(&bets);
        assert_eq!(signal_consensus(agg.weighted_bull_percent), Consensus::Neutral);
    }

    #[test]
    fn handle_bet_ignores_odds_market_venues() {
        let store = Arc::new(Store::open_in_memory());
        let bus = EventBus::new();
        let aggregator = SmartMoneyAggregator::new(store, bus, AnalyzerSettings::default());
        aggregator.tracked.lock().insert("0xabc".to_string());

        let bet = Bet {
            id: "b1".into(),
            trader: "0xabc".into(),
            platform: Platform::Polymarket, // odds-market venue
            market_id: "1001".into(),
            direction: Direction::Bull,
            amount: Amount::from_native_f64(1.0),
            timestamp: Utc::now(),
            tx_hash: None,
            block_height: None,
            log_index: None,
            won: None,
            claimed_amount: None,
        };
        aggregator.handle_bet(&bet).unwrap();
        assert!(aggregator.working.lock().is_empty());
    }

    #[test]
    fn handle_bet_accumulates_for_tracked_binary_venue_trader() {
        let store = Arc::new(Store::open_in_memory());
        let bus = EventBus::new();
        let aggregator = SmartMoneyAggregator::new(store, bus, AnalyzerSettings::default());
        aggregator.tracked.lock().insert("0xabc".to_string());

        let bet = Bet {
            id: "b1".into(),
            trader: "0xabc".into(),
            platform: Platform::PancakeSwapPrediction,
            market_id: "1001".into(),
            direction: Direction::Bull,
            amount: Amount::from_native_f64(1.0),
            timestamp: Utc::now(),
            tx_hash: None,
            block_height: None,
            log_index: None,
            won: None,
            claimed_amount: None,
        };
        aggregator.handle_bet(&bet).unwrap();
        let working = aggregator.working.lock();
        assert_eq!(working.get(&(Platform::PancakeSwapPrediction, 1001)).unwrap().len(), 1);
    }
}
