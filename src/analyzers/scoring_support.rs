//! Bridges the pure `scoring` module to the store for the analyzers that
//! need a trader's live `TruthScore`/`Tier` (smart-money tracked-trader
//! refresh, leaderboard ordering).

use chrono::{DateTime, Utc};

use crate::config::AnalyzerSettings;
use crate::error::EngineError;
use crate::model::{Tier, TruthScore};
use crate::scoring;
use crate::store::Store;

/// Every platform currently weighs equally toward the unified score (spec.md
/// §4.2 Open Question "per-platform weighting" — see DESIGN.md).
fn equal_weight(_platform: crate::model::Platform) -> f64 {
    1.0
}

pub fn truth_score_for(
    store: &Store,
    address: &str,
    settings: &AnalyzerSettings,
    now: DateTime<Utc>,
) -> Result<TruthScore, EngineError> {
    let per_platform: Vec<_> = store
        .all_platform_stats_for(address)?
        .into_iter()
        .filter_map(|stats| stats.platform.map(|p| (p, stats)))
        .collect();
    Ok(scoring::unified_score(
        address,
        &per_platform,
        equal_weight,
        now,
        settings.min_bets_for_full_score,
        chrono::Duration::from_std(settings.recency_window).unwrap_or(chrono::Duration::zero()),
    ))
}

pub fn tier_for(
    store: &Store,
    address: &str,
    settings: &AnalyzerSettings,
    now: DateTime<Utc>,
) -> Result<Tier, EngineError> {
    Ok(truth_score_for(store, address, settings, now)?.tier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Bet, Direction, Platform};

    fn bet(trader: &str, amount: f64) -> Bet {
        Bet {
            id: format!("{trader}-1"),
            trader: trader.into(),
            platform: Platform::PancakeSwapPrediction,
            market_id: "1001".into(),
            direction: Direction::Bull,
            amount: Amount::from_native_f64(amount),
            timestamp: Utc::now(),
            tx_hash: Some("0xabc".into()),
            block_height: Some(1),
            log_index: Some(0),
            won: Some(true),
            claimed_amount: None,
        }
    }

    #[test]
    fn unseen_trader_is_bronze() {
        let store = Store::open_in_memory();
        let settings = AnalyzerSettings::default();
        let tier = tier_for(&store, "0xnewcomer", &settings, Utc::now()).unwrap();
        assert_eq!(tier, Tier::Bronze);
    }

    #[test]
    fn active_winning_trader_scores_above_zero() {
        let store = Store::open_in_memory();
        store.upsert_bet(&bet("0xabc", 0.1)).unwrap();
        let settings = AnalyzerSettings::default();
        let score = truth_score_for(&store, "0xabc", &settings, Utc::now()).unwrap();
        assert!(score.total_score > 0.0);
    }
}
