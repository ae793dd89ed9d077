//! Typed settings, assembled from the environment (SPEC_FULL.md §2.1).
//!
//! Mirrors the teacher's `models::Config::from_env`: `dotenv` first, then
//! `env::var(..).ok().and_then(|v| v.parse().ok()).unwrap_or(default)` for
//! every knob so a missing/malformed var never panics at startup.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::model::Platform;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Resilience knobs shared by every adapter (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub request_timeout: Duration,
    pub fast_chain_chunk_blocks: u64,
    pub slow_chain_chunk_blocks: u64,
    pub inter_chunk_delay: Duration,
    pub seen_id_cap: usize,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            max_retries: env_parse("ADAPTER_MAX_RETRIES", 3),
            base_backoff: Duration::from_millis(env_parse("ADAPTER_BASE_BACKOFF_MS", 2_000)),
            request_timeout: Duration::from_secs(env_parse("ADAPTER_REQUEST_TIMEOUT_SECS", 15)),
            fast_chain_chunk_blocks: env_parse("ADAPTER_FAST_CHAIN_CHUNK_BLOCKS", 2_000),
            slow_chain_chunk_blocks: env_parse("ADAPTER_SLOW_CHAIN_CHUNK_BLOCKS", 100),
            inter_chunk_delay: Duration::from_millis(env_parse("ADAPTER_INTER_CHUNK_DELAY_MS", 250)),
            seen_id_cap: env_parse("ADAPTER_SEEN_ID_CAP", 1_000),
        }
    }
}

/// Cadence / cache knobs for the analyzer bots (spec.md §4.4-4.8).
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub smart_money_enabled: bool,
    pub tracked_trader_count: usize,
    pub tracked_trader_refresh: Duration,

    pub trend_detector_enabled: bool,
    pub trend_cycle: Duration,
    pub trend_min_markets: u32,
    pub trend_min_volume: f64,

    pub cross_signals_enabled: bool,
    pub cross_signal_min_confidence: f64,
    pub cross_signal_expiry: Duration,

    pub anti_gaming_enabled: bool,
    pub anti_gaming_cycle: Duration,
    pub wash_trading_threshold: u32,
    pub sybil_cluster_min_wallets: u32,
    pub anomaly_min_bets: u32,
    pub anomaly_z_threshold: f64,
    pub collusion_min_co_occurring_rounds: u32,
    pub collusion_ratio_threshold: f64,
    pub alert_dedup_window: Duration,

    pub backtest_cache_ttl: Duration,
    pub recency_window: Duration,
    pub min_bets_for_full_score: u64,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            smart_money_enabled: env_bool("SMART_MONEY_ENABLED", true),
            tracked_trader_count: env_parse("SMART_MONEY_TRACKED_TRADERS", 50),
            tracked_trader_refresh: Duration::from_secs(env_parse(
                "SMART_MONEY_REFRESH_SECS",
                60,
            )),

            trend_detector_enabled: env_bool("TREND_DETECTOR_ENABLED", true),
            trend_cycle: Duration::from_secs(env_parse("TREND_CYCLE_SECS", 120)),
            trend_min_markets: env_parse("TREND_MIN_MARKETS", 2),
            trend_min_volume: env_parse("TREND_MIN_VOLUME", 100.0),

            cross_signals_enabled: env_bool("CROSS_SIGNALS_ENABLED", true),
            cross_signal_min_confidence: env_parse("CROSS_SIGNAL_MIN_CONFIDENCE", 20.0),
            cross_signal_expiry: Duration::from_secs(env_parse(
                "CROSS_SIGNAL_EXPIRY_SECS",
                3_600,
            )),

            anti_gaming_enabled: env_bool("ANTI_GAMING_ENABLED", true),
            anti_gaming_cycle: Duration::from_secs(env_parse("ANTI_GAMING_CYCLE_SECS", 300)),
            wash_trading_threshold: env_parse("WASH_TRADING_THRESHOLD", 3),
            sybil_cluster_min_wallets: env_parse("SYBIL_CLUSTER_MIN_WALLETS", 3),
            anomaly_min_bets: env_parse("ANOMALY_MIN_BETS", 50),
            anomaly_z_threshold: env_parse("ANOMALY_Z_THRESHOLD", 3.29),
            collusion_min_co_occurring_rounds: env_parse("COLLUSION_MIN_ROUNDS", 20),
            collusion_ratio_threshold: env_parse("COLLUSION_RATIO_THRESHOLD", 0.8),
            alert_dedup_window: Duration::from_secs(env_parse(
                "ALERT_DEDUP_WINDOW_SECS",
                86_400,
            )),

            backtest_cache_ttl: Duration::from_secs(env_parse("BACKTEST_CACHE_TTL_SECS", 86_400)),
            recency_window: Duration::from_secs(env_parse("RECENCY_WINDOW_SECS", 90 * 86_400)),
            min_bets_for_full_score: env_parse("MIN_BETS_FOR_FULL_SCORE", 50),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainEndpoint {
    pub rpc_url: String,
    pub ws_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: String,
    pub api_host: String,
    pub api_port: u16,
    /// When set, all non-`/health` endpoints require `X-API-Key` to match.
    pub api_shared_secret: Option<String>,
    pub cors_origins: Vec<String>,
    pub chains: HashMap<&'static str, ChainEndpoint>,
    pub platform_rest_base: HashMap<Platform, String>,
    pub adapters: AdapterSettings,
    pub analyzers: AnalyzerSettings,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Settings> {
        dotenv::dotenv().ok();

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./truthscore.db".to_string());

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = env_parse("API_PORT", 8080u16);
        let api_shared_secret = env::var("API_SHARED_SECRET").ok().filter(|s| !s.is_empty());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let mut chains = HashMap::new();
        chains.insert(
            "bsc",
            ChainEndpoint {
                rpc_url: env::var("BSC_RPC_URL")
                    .unwrap_or_else(|_| "https://bsc-dataseed.binance.org".to_string()),
                ws_url: env::var("BSC_RPC_WS_URL").ok(),
            },
        );
        chains.insert(
            "polygon",
            ChainEndpoint {
                rpc_url: env::var("POLYGON_RPC_URL")
                    .unwrap_or_else(|_| "https://polygon-rpc.com".to_string()),
                ws_url: env::var("POLYGON_RPC_WS_URL").ok(),
            },
        );

        let mut platform_rest_base = HashMap::new();
        for info in crate::model::PLATFORMS {
            let var = format!(
                "{}_API_BASE",
                info.platform.as_str().to_uppercase()
            );
            if let Ok(base) = env::var(&var) {
                platform_rest_base.insert(info.platform, base);
            }
        }

        Ok(Settings {
            database_path,
            api_host,
            api_port,
            api_shared_secret,
            cors_origins,
            chains,
            platform_rest_base,
            adapters: AdapterSettings::default(),
            analyzers: AnalyzerSettings::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let a = AdapterSettings::default();
        assert_eq!(a.max_retries, 3);
        assert_eq!(a.request_timeout, Duration::from_secs(15));
    }
}
