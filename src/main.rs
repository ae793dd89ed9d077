//! Composition root: wires config, store, bus, adapters and analyzer bots
//! together and serves the REST/WebSocket API (SPEC_FULL.md §2, §4.9).
//!
//! Grounded in the teacher's `main()` (`load_env` → `init_tracing` → build
//! every subsystem → merge routers → `axum::serve`), trimmed to this
//! engine's actual subsystem set.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use truthscore_engine::adapters::evm_binary::{EvmBinaryAdapter, EvmBinaryParams};
use truthscore_engine::adapters::rest_odds::{RestOddsAdapter, RestOddsParams};
use truthscore_engine::adapters::PlatformAdapter;
use truthscore_engine::analyzers::{spawn_all, AdapterRegistry};
use truthscore_engine::api::{self, AppState};
use truthscore_engine::bus::EventBus;
use truthscore_engine::chain::ChainClient;
use truthscore_engine::model::{Platform, ScoreFormula, PLATFORMS};
use truthscore_engine::store::Store;
use truthscore_engine::Settings;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "truthscore_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Per-venue EVM log-topic configuration (SPEC_FULL.md §4.1): every
/// `ScoreFormula::BinaryMarket` venue is read from its own `BetBull`/`BetBear`
/// event, identified by these env-configured `topic0` hashes since each
/// venue's contract, while structurally identical, is deployed separately.
fn evm_binary_params(platform: Platform, chain: &'static str) -> EvmBinaryParams {
    let prefix = platform.as_str().to_uppercase();
    EvmBinaryParams {
        platform,
        chain,
        contract_address: env::var(format!("{prefix}_CONTRACT_ADDRESS")).unwrap_or_default(),
        bull_topic0: env::var(format!("{prefix}_BULL_TOPIC0")).unwrap_or_default(),
        bear_topic0: env::var(format!("{prefix}_BEAR_TOPIC0")).unwrap_or_default(),
        native_decimals: 18,
        blocks_per_round: env::var(format!("{prefix}_BLOCKS_PER_ROUND"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100),
    }
}

/// Builds one adapter per venue, keyed by platform (SPEC_FULL.md §4.1):
/// `ScoreFormula::BinaryMarket` venues read on-chain logs directly,
/// `ScoreFormula::OddsMarket` venues are read through each venue's REST API.
/// A venue missing its chain client or REST base URL is skipped with a
/// warning rather than aborting startup, so one misconfigured venue never
/// takes the whole engine down.
async fn build_adapters(settings: &Settings) -> Result<AdapterRegistry> {
    let mut chains: HashMap<&'static str, Arc<ChainClient>> = HashMap::new();
    for (&name, endpoint) in &settings.chains {
        let client = ChainClient::new(name, endpoint, settings.adapters.request_timeout)
            .with_context(|| format!("building chain client for '{name}'"))?;
        chains.insert(name, Arc::new(client));
    }

    let mut registry: AdapterRegistry = HashMap::new();
    for info in PLATFORMS {
        let adapter: Arc<dyn PlatformAdapter> = match info.formula {
            ScoreFormula::BinaryMarket => {
                let Some(chain) = chains.get(info.chain).cloned() else {
                    warn!(platform = %info.platform, chain = info.chain, "no chain client configured, skipping adapter");
                    continue;
                };
                let params = evm_binary_params(info.platform, info.chain);
                let chunk_blocks = if info.chain == "bsc" {
                    settings.adapters.fast_chain_chunk_blocks
                } else {
                    settings.adapters.slow_chain_chunk_blocks
                };
                Arc::new(EvmBinaryAdapter::new(
                    params,
                    chain,
                    settings.adapters.clone(),
                    chunk_blocks,
                ))
            }
            ScoreFormula::OddsMarket => {
                let Some(base_url) = settings.platform_rest_base.get(&info.platform).cloned()
                else {
                    warn!(platform = %info.platform, "no REST base URL configured, skipping adapter");
                    continue;
                };
                let prefix = info.platform.as_str().to_uppercase();
                let params = RestOddsParams {
                    platform: info.platform,
                    base_url,
                    api_key: env::var(format!("{prefix}_API_KEY")).ok(),
                };
                Arc::new(
                    RestOddsAdapter::new(params, settings.adapters.clone())
                        .with_context(|| format!("building REST adapter for {}", info.platform))?,
                )
            }
        };
        registry.insert(info.platform, adapter);
    }

    Ok(registry)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = Settings::from_env().context("loading configuration")?;
    info!(db = %settings.database_path, port = settings.api_port, "starting engine");

    let store = Store::open(&settings.database_path).context("opening store")?;
    let bus = EventBus::new();

    let adapters = Arc::new(build_adapters(&settings).await?);
    info!(count = adapters.len(), "adapters ready");

    for adapter in adapters.values() {
        if let Err(err) = adapter.initialize().await {
            warn!(platform = %adapter.platform(), error = %err, "adapter failed to initialize, will keep retrying on its own schedule");
        }
    }

    let mut subscriptions = Vec::new();
    for adapter in adapters.values() {
        subscriptions.push(adapter.clone().subscribe(bus.clone()).await);
    }

    let analyzer_handles = spawn_all(
        store.clone(),
        bus.clone(),
        settings.analyzers.clone(),
        adapters.clone(),
    );

    let state = AppState::new(store.clone(), bus.clone(), &settings, adapters.clone());
    let app = api::router(state, &settings.cors_origins);

    let addr = format!("{}:{}", settings.api_host, settings.api_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down, stopping background tasks");
    analyzer_handles.abort_all();
    for handle in subscriptions {
        handle.dispose();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_binary_params_default_to_empty_when_unset() {
        let params = evm_binary_params(Platform::PancakeSwapPrediction, "bsc");
        assert_eq!(params.blocks_per_round, 100);
        assert_eq!(params.native_decimals, 18);
    }
}
