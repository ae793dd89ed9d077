//! Anti-gaming detector (spec.md §4.7): wash trading, sybil clusters,
//! statistical win-rate anomalies and wallet collusion, each with a 24h
//! duplicate-suppression window before an alert is persisted.
//!
//! Grounded in the same event-listener + fixed-cadence-scan split the
//! smart-money aggregator uses, reusing `statrs`'s normal distribution for
//! the one-tailed anomaly probability the way the pack's stats-heavy
//! examples do rather than hand-rolling an erf approximation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{Event, EventBus};
use crate::config::AnalyzerSettings;
use crate::model::{AlertType, Bet, Direction, GamingAlert, Platform, Severity};
use crate::store::Store;

fn new_alert(
    alert_type: AlertType,
    severity: Severity,
    wallets: Vec<String>,
    evidence: serde_json::Value,
    recommended_action: &str,
) -> GamingAlert {
    GamingAlert {
        id: Uuid::new_v4().to_string(),
        alert_type,
        severity,
        wallets,
        evidence,
        recommended_action: recommended_action.to_string(),
        status: crate::model::AlertStatus::Pending,
        reviewer: None,
        notes: None,
        created_at: Utc::now(),
    }
}

/// Counts, per wallet, the number of distinct rounds in which it bet both
/// `bull` and `bear` (spec.md §4.7 "Wash trading").
pub fn wash_trading_counts(bets: &[Bet]) -> HashMap<String, u32> {
    let mut sides: HashMap<(String, Platform, String), (bool, bool)> = HashMap::new();
    for bet in bets {
        let entry = sides
            .entry((bet.trader.clone(), bet.platform, bet.market_id.clone()))
            .or_insert((false, false));
        match bet.direction {
            Direction::Bull => entry.0 = true,
            Direction::Bear => entry.1 = true,
        }
    }
    let mut counts: HashMap<String, u32> = HashMap::new();
    for ((trader, _, _), (saw_bull, saw_bear)) in sides {
        if saw_bull && saw_bear {
            *counts.entry(trader).or_insert(0) += 1;
        }
    }
    counts
}

/// Buckets bets by `(round, side, amount bucket, 5s timestamp bucket)`;
/// returns buckets with `>=min_wallets` distinct participants (spec.md §4.7
/// "Sybil cluster").
pub fn sybil_clusters(bets: &[Bet], min_wallets: u32) -> Vec<Vec<String>> {
    let mut buckets: HashMap<(Platform, String, &'static str, i64, i64), HashSet<String>> = HashMap::new();
    for bet in bets {
        let amount_bucket = (bet.amount.as_native_f64() / 0.1).round() as i64;
        let time_bucket = bet.timestamp.timestamp() / 5;
        buckets
            .entry((bet.platform, bet.market_id.clone(), bet.direction.as_str(), amount_bucket, time_bucket))
            .or_default()
            .insert(bet.trader.clone());
    }
    buckets
        .into_values()
        .filter(|wallets| wallets.len() as u32 >= min_wallets)
        .map(|wallets| wallets.into_iter().collect())
        .collect()
}

/// One-tailed z-score of a trader's win rate against a fair 50% baseline
/// (spec.md §4.7 "Statistical anomaly").
pub fn anomaly_z_score(wins: u64, decided: u64) -> Option<f64> {
    if decided == 0 {
        return None;
    }
    let n = decided as f64;
    let p_hat = wins as f64 / n;
    let se = (0.25 / n).sqrt();
    if se <= 0.0 {
        return None;
    }
    Some((p_hat - 0.5) / se)
}

fn one_tailed_probability(z: f64) -> f64 {
    Normal::new(0.0, 1.0)
        .map(|normal| 1.0 - normal.cdf(z.abs()))
        .unwrap_or(0.0)
}

/// Per-wallet distinct rounds played, as `(platform, market_id)` pairs —
/// the working set collusion co-occurrence is computed from.
fn rounds_by_wallet(bets: &[Bet]) -> HashMap<String, HashSet<(Platform, String)>> {
    let mut out: HashMap<String, HashSet<(Platform, String)>> = HashMap::new();
    for bet in bets {
        out.entry(bet.trader.clone())
            .or_default()
            .insert((bet.platform, bet.market_id.clone()));
    }
    out
}

/// Wallet pairs co-occurring in `>=min_rounds` rounds with
/// `co_occurrence / union_rounds > ratio_threshold` (spec.md §4.7
/// "Collusion").
pub fn collusion_pairs(
    bets: &[Bet],
    min_rounds: u32,
    ratio_threshold: f64,
) -> Vec<(String, String, u32, f64)> {
    let per_wallet = rounds_by_wallet(bets);
    let wallets: Vec<&String> = per_wallet.keys().collect();
    let mut out = Vec::new();

    for i in 0..wallets.len() {
        for j in (i + 1)..wallets.len() {
            let a = &per_wallet[wallets[i]];
            let b = &per_wallet[wallets[j]];
            let co = a.intersection(b).count() as u32;
            if co < min_rounds {
                continue;
            }
            let union = a.union(b).count();
            if union == 0 {
                continue;
            }
            let ratio = co as f64 / union as f64;
            if ratio > ratio_threshold {
                out.push((wallets[i].clone(), wallets[j].clone(), co, ratio));
            }
        }
    }
    out
}

async fn raise_if_not_duplicate(
    store: &Store,
    bus: &EventBus,
    settings: &AnalyzerSettings,
    alert: GamingAlert,
) {
    let since = Utc::now() - chrono::Duration::from_std(settings.alert_dedup_window).unwrap_or(chrono::Duration::hours(24));
    for wallet in &alert.wallets {
        match store.has_recent_alert(alert.alert_type, wallet, since) {
            Ok(true) => return,
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "anti-gaming: dedup lookup failed, raising anyway");
            }
        }
    }
    if let Err(err) = store.insert_alert(&alert) {
        warn!(error = %err, "anti-gaming: failed to persist alert");
        return;
    }
    bus.emit(Event::AlertCreated(alert));
}

/// One full periodic scan (spec.md §4.7): wash trading, sybil clusters,
/// statistical anomalies, collusion, each over the scan window.
pub async fn run_scan(store: &Store, bus: &EventBus, settings: &AnalyzerSettings) {
    let window_start = Utc::now() - chrono::Duration::days(7);
    let bets = match store.bets_since(window_start) {
        Ok(b) => b,
        Err(err) => {
            warn!(error = %err, "anti-gaming scan: failed to load recent bets");
            return;
        }
    };

    for (trader, count) in wash_trading_counts(&bets) {
        if count >= settings.wash_trading_threshold {
            let alert = new_alert(
                AlertType::WashTrading,
                Severity::Critical,
                vec![trader.clone()],
                json!({"both_sided_rounds": count}),
                "freeze wallet pending manual review",
            );
            raise_if_not_duplicate(store, bus, settings, alert).await;
        }
    }

    for cluster in sybil_clusters(&bets, settings.sybil_cluster_min_wallets) {
        let alert = new_alert(
            AlertType::SybilCluster,
            Severity::Warning,
            cluster.clone(),
            json!({"cluster_size": cluster.len()}),
            "review cluster for shared funding source",
        );
        raise_if_not_duplicate(store, bus, settings, alert).await;
    }

    let traders = match store.distinct_traders() {
        Ok(t) => t,
        Err(err) => {
            warn!(error = %err, "anti-gaming scan: failed to list traders");
            Vec::new()
        }
    };
    for trader in traders {
        let stats = match store.all_platform_stats_for(&trader) {
            Ok(s) => s,
            Err(err) => {
                warn!(%trader, error = %err, "anti-gaming scan: stats lookup failed");
                continue;
            }
        };
        let wins: u64 = stats.iter().map(|s| s.wins).sum();
        let decided: u64 = stats.iter().map(|s| s.wins + s.losses).sum();
        if decided < settings.anomaly_min_bets as u64 {
            continue;
        }
        let Some(z) = anomaly_z_score(wins, decided) else { continue };
        if z.abs() > settings.anomaly_z_threshold {
            let alert = new_alert(
                AlertType::StatisticalAnomaly,
                Severity::Info,
                vec![trader.clone()],
                json!({"z_score": z, "decided_bets": decided, "wins": wins, "one_tailed_probability": one_tailed_probability(z)}),
                "monitor wallet, no action required yet",
            );
            raise_if_not_duplicate(store, bus, settings, alert).await;
        }
    }

    for (a, b, co_occurring, ratio) in
        collusion_pairs(&bets, settings.collusion_min_co_occurring_rounds, settings.collusion_ratio_threshold)
    {
        let alert = new_alert(
            AlertType::Collusion,
            Severity::Warning,
            vec![a, b],
            json!({"co_occurring_rounds": co_occurring, "ratio": ratio}),
            "review wallet pair for coordinated betting",
        );
        raise_if_not_duplicate(store, bus, settings, alert).await;
    }
}

/// Starts the bus-listener (per-bet wash-trading fast path) and the
/// fixed-cadence full scan (spec.md §4.7 "periodic scan... plus a per-bet
/// fast path").
pub fn spawn(store: Arc<Store>, bus: Arc<EventBus>, settings: AnalyzerSettings) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    let fast_path_store = store.clone();
    let fast_path_bus = bus.clone();
    let fast_path_settings = settings.clone();
    handles.push(tokio::spawn(async move {
        let mut rx = fast_path_bus.subscribe();
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    if let Event::BetDetected(bet) = &envelope.data {
                        let window_start = Utc::now() - chrono::Duration::days(7);
                        if let Ok(recent) = fast_path_store.bets_since(window_start) {
                            let trader_bets: Vec<Bet> =
                                recent.into_iter().filter(|b| b.trader == bet.trader).collect();
                            if let Some(&count) = wash_trading_counts(&trader_bets).get(&bet.trader) {
                                if count >= fast_path_settings.wash_trading_threshold {
                                    let alert = new_alert(
                                        AlertType::WashTrading,
                                        Severity::Critical,
                                        vec![bet.trader.clone()],
                                        json!({"both_sided_rounds": count}),
                                        "freeze wallet pending manual review",
                                    );
                                    raise_if_not_duplicate(&fast_path_store, &fast_path_bus, &fast_path_settings, alert).await;
                                }
                            }
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    }));

    handles.push(tokio::spawn(async move {
        info!(cycle_secs = settings.anti_gaming_cycle.as_secs(), "anti-gaming scan loop starting");
        loop {
            run_scan(&store, &bus, &settings).await;
            tokio::time::sleep(settings.anti_gaming_cycle).await;
        }
    }));

    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;

    fn bet(trader: &str, market_id: &str, direction: Direction, amount: f64, ts_secs: i64) -> Bet {
        Bet {
            id: format!("{trader}-{market_id}-{ts_secs}"),
            trader: trader.into(),
            platform: Platform::PancakeSwapPrediction,
            market_id: market_id.into(),
            direction,
            amount: Amount::from_native_f64(amount),
            timestamp: chrono::DateTime::from_timestamp(ts_secs, 0).unwrap(),
            tx_hash: None,
            block_height: None,
            log_index: None,
            won: None,
            claimed_amount: None,
        }
    }

    #[test]
    fn wash_trading_flags_both_sided_rounds() {
        let bets = vec![
            bet("0xa", "1001", Direction::Bull, 1.0, 1_000),
            bet("0xa", "1001", Direction::Bear, 1.0, 1_001),
            bet("0xa", "1002", Direction::Bull, 1.0, 2_000),
            bet("0xa", "1002", Direction::Bear, 1.0, 2_001),
            bet("0xa", "1003", Direction::Bull, 1.0, 3_000),
            bet("0xa", "1003", Direction::Bear, 1.0, 3_001),
        ];
        let counts = wash_trading_counts(&bets);
        assert_eq!(counts.get("0xa"), Some(&3));
    }

    #[test]
    fn single_sided_wallet_never_flags() {
        let bets = vec![
            bet("0xa", "1001", Direction::Bull, 1.0, 1_000),
            bet("0xa", "1002", Direction::Bull, 1.0, 2_000),
        ];
        assert!(wash_trading_counts(&bets).is_empty());
    }

    #[test]
    fn sybil_cluster_needs_three_distinct_wallets_same_bucket() {
        let bets = vec![
            bet("0xa", "1001", Direction::Bull, 0.1, 1_000),
            bet("0xb", "1001", Direction::Bull, 0.1, 1_001),
            bet("0xc", "1001", Direction::Bull, 0.1, 1_002),
        ];
        let clusters = sybil_clusters(&bets, 3);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn sybil_cluster_below_threshold_is_not_reported() {
        let bets = vec![
            bet("0xa", "1001", Direction::Bull, 0.1, 1_000),
            bet("0xb", "1001", Direction::Bull, 0.1, 1_001),
        ];
        assert!(sybil_clusters(&bets, 3).is_empty());
    }

    #[test]
    fn anomaly_z_score_flags_suspiciously_high_win_rate() {
        // 80/100 decided bets won: far from a fair 50% coin.
        let z = anomaly_z_score(80, 100).unwrap();
        assert!(z > 3.29, "got z={z}");
    }

    #[test]
    fn anomaly_z_score_is_near_zero_for_fair_win_rate() {
        let z = anomaly_z_score(51, 100).unwrap();
        assert!(z.abs() < 1.0, "got z={z}");
    }

    #[test]
    fn collusion_pair_detected_for_high_overlap() {
        let mut bets = Vec::new();
        for i in 0..25 {
            bets.push(bet("0xa", &format!("{i}"), Direction::Bull, 1.0, i as i64 * 100));
            bets.push(bet("0xb", &format!("{i}"), Direction::Bear, 1.0, i as i64 * 100 + 1));
        }
        let pairs = collusion_pairs(&bets, 20, 0.8);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].2, 25);
    }

    #[test]
    fn collusion_pair_absent_below_overlap_ratio() {
        let mut bets = Vec::new();
        for i in 0..25 {
            bets.push(bet("0xa", &format!("{i}"), Direction::Bull, 1.0, i as i64 * 100));
        }
        for i in 0..25 {
            bets.push(bet("0xb", &format!("other-{i}"), Direction::Bear, 1.0, i as i64 * 100));
        }
        let pairs = collusion_pairs(&bets, 20, 0.8);
        assert!(pairs.is_empty());
    }
}
