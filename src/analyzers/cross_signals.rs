//! Cross-platform signal fuser (spec.md §4.6): folds the same topic's
//! markets across every venue into one volume-weighted consensus.
//!
//! Grounded in the same fixed-cadence loop shape as
//! [`crate::analyzers::trends`], reusing its freshly-scored topics as the
//! candidate set rather than re-deriving clusters from scratch.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::adapters::MarketSnapshot;
use crate::analyzers::AdapterRegistry;
use crate::bus::{Event, EventBus};
use crate::config::AnalyzerSettings;
use crate::model::{Bps, CrossConsensus, CrossPlatformSignal, Platform, PlatformSignal};
use crate::store::Store;

fn consensus_for(p: f64, confidence: f64) -> CrossConsensus {
    if p >= 0.75 && confidence >= 60.0 {
        CrossConsensus::StrongYes
    } else if p <= 0.25 && confidence >= 60.0 {
        CrossConsensus::StrongNo
    } else if p >= 0.55 {
        CrossConsensus::LeanYes
    } else if p <= 0.45 {
        CrossConsensus::LeanNo
    } else {
        CrossConsensus::Mixed
    }
}

/// Fuses one topic's per-platform highest-volume market snapshots into a
/// [`CrossPlatformSignal`] (spec.md §4.6 steps 3-6), or `None` if confidence
/// drops below the configured floor.
pub fn fuse(
    topic: &str,
    per_platform: Vec<(Platform, MarketSnapshot)>,
    min_confidence: f64,
    expiry: chrono::Duration,
    now: chrono::DateTime<Utc>,
) -> Option<CrossPlatformSignal> {
    if per_platform.len() < 2 {
        return None;
    }

    let total_volume: f64 = per_platform.iter().map(|(_, s)| s.volume.as_native_f64()).sum();
    if total_volume <= 0.0 {
        return None;
    }

    let weighted_probability: f64 = per_platform
        .iter()
        .map(|(_, s)| s.probability * s.volume.as_native_f64())
        .sum::<f64>()
        / total_volume;

    let avg_deviation: f64 = per_platform
        .iter()
        .map(|(_, s)| (s.probability - weighted_probability).abs())
        .sum::<f64>()
        / per_platform.len() as f64;

    let confidence = ((weighted_probability - 0.5).abs() * 2.0 * 40.0
        + (30.0 - avg_deviation * 60.0).max(0.0)
        + (per_platform.len() as f64 * 10.0).min(30.0))
    .round();

    if confidence < min_confidence {
        return None;
    }

    let platforms: Vec<PlatformSignal> = per_platform
        .iter()
        .map(|(platform, snapshot)| PlatformSignal {
            platform: *platform,
            market_id: snapshot.market_id.clone(),
            probability: Bps::from_probability(snapshot.probability),
            volume: snapshot.volume,
        })
        .collect();

    let total_volume_amount = per_platform.iter().fold(crate::model::Amount::ZERO, |acc, (_, s)| {
        acc.checked_add(s.volume).unwrap_or(acc)
    });

    Some(CrossPlatformSignal {
        topic: topic.to_string(),
        consensus: consensus_for(weighted_probability, confidence),
        confidence,
        volume_weighted_probability: Bps::from_probability(weighted_probability),
        platforms,
        total_volume: total_volume_amount,
        market_count: per_platform.len() as u32,
        expires_at: now + expiry,
    })
}

/// One fetch-fuse-persist cycle. Candidate topics come from the trend
/// detector's own persisted state, since a topic can't have cross-platform
/// presence without first clustering (spec.md §4.6 step 1).
pub async fn run_cycle(
    store: &Store,
    bus: &EventBus,
    settings: &AnalyzerSettings,
    adapters: &AdapterRegistry,
) {
    let now = Utc::now();
    let topics = match store.top_trending_topics(200) {
        Ok(t) => t,
        Err(err) => {
            warn!(error = %err, "cross-signal cycle: failed to load trending topics");
            return;
        }
    };

    for topic in topics {
        if topic.platforms.len() < 2 {
            continue;
        }

        let mut per_platform = Vec::new();
        for presence in &topic.platforms {
            let Some(top_market) = presence.top_markets.first() else { continue };
            let Some(adapter) = adapters.get(&presence.platform) else { continue };
            match adapter.market_snapshot(&top_market.market_id).await {
                Ok(snapshot) => per_platform.push((presence.platform, snapshot)),
                Err(err) => {
                    warn!(platform = %presence.platform, market_id = %top_market.market_id, error = %err,
                        "cross-signal cycle: market_snapshot failed, platform dropped");
                }
            }
        }

        let Some(signal) = fuse(
            &topic.topic,
            per_platform,
            settings.cross_signal_min_confidence,
            chrono::Duration::from_std(settings.cross_signal_expiry).unwrap_or(chrono::Duration::hours(1)),
            now,
        ) else {
            continue;
        };

        if let Err(err) = store.upsert_cross_signal(&signal) {
            warn!(topic = %signal.topic, error = %err, "cross-signal cycle: persist failed");
            continue;
        }
        bus.emit(Event::CrossSignal(signal));
    }
}

/// Starts the fixed-cadence cross-platform signal loop, sharing the trend
/// detector's cadence (spec.md §4.6 has no separate default; run in lockstep
/// with the topics it depends on).
pub fn spawn(
    store: Arc<Store>,
    bus: Arc<EventBus>,
    settings: AnalyzerSettings,
    adapters: Arc<AdapterRegistry>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("cross-platform signal loop starting");
        loop {
            run_cycle(&store, &bus, &settings, &adapters).await;
            tokio::time::sleep(settings.trend_cycle).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;

    fn snapshot(id: &str, volume: f64, probability: f64) -> MarketSnapshot {
        MarketSnapshot {
            market_id: id.into(),
            title: "x".into(),
            volume: Amount::from_native_f64(volume),
            probability,
        }
    }

    #[test]
    fn single_platform_never_fuses() {
        let result = fuse(
            "trump",
            vec![(Platform::Polymarket, snapshot("m1", 1000.0, 0.8))],
            20.0,
            chrono::Duration::hours(1),
            Utc::now(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn strong_agreement_yields_strong_yes() {
        let result = fuse(
            "trump",
            vec![
                (Platform::Polymarket, snapshot("m1", 10_000.0, 0.82)),
                (Platform::Kalshi, snapshot("m2", 10_000.0, 0.80)),
                (Platform::Manifold, snapshot("m3", 10_000.0, 0.81)),
            ],
            20.0,
            chrono::Duration::hours(1),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(result.consensus, CrossConsensus::StrongYes);
        assert!(result.confidence >= 60.0);
        assert_eq!(result.market_count, 3);
    }

    #[test]
    fn disagreement_drags_confidence_toward_mixed() {
        let result = fuse(
            "election",
            vec![
                (Platform::Polymarket, snapshot("m1", 5_000.0, 0.9)),
                (Platform::Kalshi, snapshot("m2", 5_000.0, 0.1)),
            ],
            0.0,
            chrono::Duration::hours(1),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(result.consensus, CrossConsensus::Mixed);
    }

    #[test]
    fn matches_worked_election_scenario() {
        // Polymarket p=0.72/vol=10k, Kalshi p=0.68/vol=8k, Manifold p=0.70/vol=2k.
        let result = fuse(
            "election",
            vec![
                (Platform::Polymarket, snapshot("m1", 10_000.0, 0.72)),
                (Platform::Kalshi, snapshot("m2", 8_000.0, 0.68)),
                (Platform::Manifold, snapshot("m3", 2_000.0, 0.70)),
            ],
            20.0,
            chrono::Duration::hours(1),
            Utc::now(),
        )
        .unwrap();
        assert!((result.volume_weighted_probability.as_probability() - 0.702).abs() < 0.001);
        assert_eq!(result.confidence, 75.0);
        assert_eq!(result.consensus, CrossConsensus::LeanYes);
    }

    #[test]
    fn topics_below_the_confidence_floor_are_dropped() {
        let result = fuse(
            "minor-topic",
            vec![
                (Platform::Polymarket, snapshot("m1", 50.0, 0.51)),
                (Platform::Kalshi, snapshot("m2", 50.0, 0.49)),
            ],
            80.0,
            chrono::Duration::hours(1),
            Utc::now(),
        );
        assert!(result.is_none());
    }
}
