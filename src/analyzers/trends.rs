//! Trend detector (spec.md §4.5): clusters open markets across every venue
//! by normalized topic and scores each cluster on volume, breadth and
//! velocity.
//!
//! Grounded in the teacher's fixed-cadence `tokio::spawn` loop pattern
//! (mirrored from [`crate::analyzers::smart_money`]'s tracked-trader
//! refresh) plus `regex`/`once_cell` for the capitalized-entity and
//! quoted-phrase extraction the teacher's own scrapers don't need but the
//! pack's NLP-adjacent examples reach for the same way.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::adapters::MarketSnapshot;
use crate::analyzers::AdapterRegistry;
use crate::bus::{Event, EventBus};
use crate::config::AnalyzerSettings;
use crate::error::EngineError;
use crate::model::{Category, Platform, PlatformPresence, TopMarket, TrendingTopic};
use crate::store::Store;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "will", "with", "that", "this", "from", "over", "into", "than",
    "who", "what", "when", "where", "does", "win", "wins", "vs", "new", "more", "than",
    "has", "have", "its", "our", "you", "are", "was", "were", "not", "but", "his", "her",
];

/// Closed alias table (spec.md §4.5 step 3): variants subsumed by a single
/// canonical topic.
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("trump", "trump"),
        ("donald", "trump"),
        ("maga", "trump"),
        ("btc", "bitcoin"),
        ("bitcoin", "bitcoin"),
        ("eth", "ethereum"),
        ("ethereum", "ethereum"),
        ("elections", "election"),
        ("election", "election"),
        ("presidential", "election"),
        ("fed", "fed"),
        ("federal reserve", "fed"),
        ("rate cut", "fed"),
        ("ai", "ai"),
        ("openai", "ai"),
    ])
});

static CAPITALIZED_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*)+)\b").unwrap());
static QUOTED_PHRASE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["‘’“”]([^"‘’“”]{3,40})["‘’“”]"#).unwrap());

/// Extracts every candidate topic string from a market title (spec.md §4.5
/// step 2), before normalization.
fn extract_candidates(title: &str) -> Vec<String> {
    let mut candidates = HashSet::new();

    for token in title.split(|c: char| !c.is_alphanumeric() && c != '\'').map(str::to_lowercase) {
        let trimmed = token.trim_matches('\'');
        if trimmed.chars().count() >= 3 && !STOPWORDS.contains(&trimmed) {
            candidates.insert(trimmed.to_string());
        }
    }

    for capture in CAPITALIZED_ENTITY.captures_iter(title) {
        candidates.insert(capture[1].to_lowercase());
    }

    for capture in QUOTED_PHRASE.captures_iter(title) {
        candidates.insert(capture[1].trim().to_lowercase());
    }

    candidates.into_iter().collect()
}

/// Strips a trailing possessive or naive plural, then resolves the alias
/// table; drops short or purely numeric tokens (spec.md §4.5 step 3).
fn normalize(raw: &str) -> Option<String> {
    let mut stem = raw.trim();
    if let Some(s) = stem.strip_suffix("'s") {
        stem = s;
    } else if let Some(s) = stem.strip_suffix('s') {
        if s.len() >= 3 {
            stem = s;
        }
    }
    if stem.chars().count() <= 2 || stem.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(ALIASES.get(stem).copied().unwrap_or(stem).to_string())
}

struct ClusterEntry {
    title: String,
    snapshot: MarketSnapshot,
}

/// Working cluster state for one normalized topic across the whole fetch
/// cycle (spec.md §4.5 step 4).
#[derive(Default)]
struct Cluster {
    by_platform: HashMap<Platform, Vec<ClusterEntry>>,
    first_seen: Option<chrono::DateTime<Utc>>,
}

fn category_for(topic: &str, platforms: &[Platform]) -> Category {
    if ["bitcoin", "ethereum"].contains(&topic) {
        return Category::Crypto;
    }
    if ["trump", "election", "fed"].contains(&topic) {
        return Category::Events;
    }
    platforms
        .first()
        .map(|p| p.info().category)
        .unwrap_or(Category::Events)
}

/// Scores a fully-populated cluster into a [`TrendingTopic`] (spec.md §4.5
/// step 5), given the previous cycle's stored state for velocity.
fn score_cluster(
    topic: &str,
    cluster: Cluster,
    previous: Option<&TrendingTopic>,
    minutes_elapsed: f64,
    now: chrono::DateTime<Utc>,
) -> TrendingTopic {
    let mut platforms = Vec::new();
    let mut total_volume = crate::model::Amount::ZERO;
    let mut total_markets = 0u32;

    for (platform, mut entries) in cluster.by_platform {
        entries.sort_by(|a, b| b.snapshot.volume.cmp(&a.snapshot.volume));
        let platform_volume = entries.iter().fold(crate::model::Amount::ZERO, |acc, e| {
            acc.checked_add(e.snapshot.volume).unwrap_or(acc)
        });
        let top_markets: Vec<TopMarket> = entries
            .iter()
            .take(3)
            .map(|e| TopMarket {
                platform,
                market_id: e.snapshot.market_id.clone(),
                title: e.title.clone(),
                volume: e.snapshot.volume,
            })
            .collect();
        total_markets += entries.len() as u32;
        total_volume = total_volume.checked_add(platform_volume).unwrap_or(total_volume);
        platforms.push(PlatformPresence {
            platform,
            market_count: entries.len() as u32,
            volume: platform_volume,
            top_markets,
        });
    }

    let volume_native = total_volume.as_native_f64();
    let previous_volume = previous.map(|p| p.total_volume.as_native_f64()).unwrap_or(0.0);
    let velocity = if minutes_elapsed > 0.0 {
        (volume_native - previous_volume) / minutes_elapsed
    } else {
        0.0
    };

    let volume_score = (volume_native / 10_000.0).min(40.0);
    let market_score = (total_markets as f64 * 4.0).min(20.0);
    let platform_score = (platforms.len() as f64 * 5.0).min(25.0);
    let velocity_score = (velocity.max(0.0) / 100.0).min(15.0);
    let score = ((volume_score + market_score + platform_score + velocity_score) * 100.0).round() / 100.0;

    let platform_list: Vec<Platform> = platforms.iter().map(|p| p.platform).collect();

    TrendingTopic {
        topic: topic.to_string(),
        score,
        velocity,
        total_volume,
        total_markets,
        category: category_for(topic, &platform_list),
        platforms,
        first_seen: previous.map(|p| p.first_seen).or(cluster.first_seen).unwrap_or(now),
        last_updated: now,
    }
}

/// One fetch-cluster-score-persist cycle (spec.md §4.5).
pub async fn run_cycle(
    store: &Store,
    bus: &EventBus,
    settings: &AnalyzerSettings,
    adapters: &AdapterRegistry,
) {
    let now = Utc::now();
    let mut clusters: HashMap<String, Cluster> = HashMap::new();

    for (platform, adapter) in adapters.iter() {
        let market_ids = match adapter.active_markets(200).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(%platform, error = %err, "trend cycle: active_markets failed, coverage reduced");
                continue;
            }
        };
        for market_id in market_ids {
            let snapshot = match adapter.market_snapshot(&market_id).await {
                Ok(s) => s,
                Err(err) => {
                    warn!(%platform, market_id, error = %err, "trend cycle: market_snapshot failed");
                    continue;
                }
            };
            let mut topics = HashSet::new();
            for candidate in extract_candidates(&snapshot.title) {
                if let Some(topic) = normalize(&candidate) {
                    topics.insert(topic);
                }
            }
            for topic in topics {
                let cluster = clusters.entry(topic).or_default();
                cluster.first_seen.get_or_insert(now);
                cluster.by_platform.entry(*platform).or_default().push(ClusterEntry {
                    title: snapshot.title.clone(),
                    snapshot: snapshot.clone(),
                });
            }
        }
    }

    let mut scored = Vec::new();
    for (topic, cluster) in clusters {
        let total_markets: u32 = cluster.by_platform.values().map(|v| v.len() as u32).sum();
        let total_volume: f64 = cluster
            .by_platform
            .values()
            .flatten()
            .map(|e| e.snapshot.volume.as_native_f64())
            .sum();
        if total_markets < settings.trend_min_markets || total_volume < settings.trend_min_volume {
            continue;
        }

        let previous = match store.trending_topic(&topic) {
            Ok(p) => p,
            Err(err) => {
                warn!(topic, error = %err, "trend cycle: failed to load previous topic state");
                None
            }
        };
        let minutes_elapsed = previous
            .as_ref()
            .map(|p| (now - p.last_updated).num_seconds() as f64 / 60.0)
            .unwrap_or(0.0);

        let computed = score_cluster(&topic, cluster, previous.as_ref(), minutes_elapsed, now);
        scored.push((computed, previous));
    }

    scored.sort_by(|a, b| b.0.score.partial_cmp(&a.0.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(100);

    for (computed, previous) in scored {
        if let Err(err) = store.upsert_trending_topic(&computed) {
            warn!(topic = %computed.topic, error = %err, "trend cycle: persist failed");
            continue;
        }
        match previous {
            None => bus.emit(Event::TrendDetected(computed)),
            Some(prev) if computed.score > 1.1 * prev.score => bus.emit(Event::TrendUpdated(computed)),
            Some(_) => {}
        }
    }
}

/// Starts the fixed-cadence trend-detector loop (spec.md §4.5 "each cycle,
/// default every 2 minutes").
pub fn spawn(
    store: Arc<Store>,
    bus: Arc<EventBus>,
    settings: AnalyzerSettings,
    adapters: Arc<AdapterRegistry>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(cycle_secs = settings.trend_cycle.as_secs(), "trend detector loop starting");
        loop {
            run_cycle(&store, &bus, &settings, &adapters).await;
            debug!("trend cycle complete");
            tokio::time::sleep(settings.trend_cycle).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;

    #[test]
    fn stopwords_and_short_tokens_are_dropped() {
        let candidates = extract_candidates("Will Bitcoin hit 100k by 2026?");
        assert!(candidates.contains(&"bitcoin".to_string()));
        assert!(!candidates.iter().any(|c| c == "by" || c == "hit"));
    }

    #[test]
    fn capitalized_multi_word_entity_is_extracted() {
        let candidates = extract_candidates("Will Donald Trump win the election?");
        assert!(candidates.iter().any(|c| c == "donald trump"));
    }

    #[test]
    fn quoted_phrase_is_extracted() {
        let candidates = extract_candidates("Will the \"Polar Vortex\" hit the Midwest?");
        assert!(candidates.iter().any(|c| c == "polar vortex"));
    }

    #[test]
    fn alias_table_collapses_variants() {
        assert_eq!(normalize("btc").as_deref(), Some("bitcoin"));
        assert_eq!(normalize("bitcoin").as_deref(), Some("bitcoin"));
        assert_eq!(normalize("donald").as_deref(), Some("trump"));
    }

    #[test]
    fn pure_numeric_and_tiny_tokens_are_rejected() {
        assert_eq!(normalize("42"), None);
        assert_eq!(normalize("fed").as_deref(), Some("fed"));
        assert_eq!(normalize("a"), None);
    }

    #[test]
    fn possessive_and_plural_strip_to_same_stem() {
        assert_eq!(normalize("election's"), normalize("elections"));
    }

    fn snapshot(id: &str, volume: f64, probability: f64) -> MarketSnapshot {
        MarketSnapshot {
            market_id: id.into(),
            title: "Will Trump win the election?".into(),
            volume: Amount::from_native_f64(volume),
            probability,
        }
    }

    #[test]
    fn cluster_below_two_platforms_still_scores_with_one_platform_two_markets() {
        let mut cluster = Cluster::default();
        cluster.first_seen = Some(Utc::now());
        cluster.by_platform.insert(
            Platform::Polymarket,
            vec![
                ClusterEntry { title: "Will Trump win the election?".into(), snapshot: snapshot("m1", 5_000.0, 0.6) },
                ClusterEntry { title: "Trump election odds".into(), snapshot: snapshot("m2", 6_000.0, 0.55) },
            ],
        );
        let topic = score_cluster("trump", cluster, None, 0.0, Utc::now());
        assert_eq!(topic.total_markets, 2);
        assert!(topic.score > 0.0);
        assert_eq!(topic.platforms.len(), 1);
    }

    #[test]
    fn velocity_score_rewards_rising_volume() {
        let mut cluster = Cluster::default();
        cluster.by_platform.insert(
            Platform::Polymarket,
            vec![
                ClusterEntry { title: "Trump".into(), snapshot: snapshot("m1", 20_000.0, 0.6) },
                ClusterEntry { title: "Trump".into(), snapshot: snapshot("m2", 20_000.0, 0.6) },
            ],
        );
        let previous = TrendingTopic {
            topic: "trump".into(),
            score: 10.0,
            velocity: 0.0,
            total_volume: Amount::from_native_f64(10_000.0),
            total_markets: 2,
            category: Category::Events,
            platforms: vec![],
            first_seen: Utc::now(),
            last_updated: Utc::now(),
        };
        let topic = score_cluster("trump", cluster, Some(&previous), 10.0, Utc::now());
        assert!(topic.velocity > 0.0);
    }
}
