//! `RestOddsAdapter` — one generic adapter for every REST/CLOB odds venue
//! (Polymarket, Kalshi, Manifold, the forecasting venues), parameterized by
//! `RestOddsParams` rather than one bespoke client per venue.
//!
//! Grounded in the teacher's `PolymarketScraper` (CLOB + GAMMA + Data APIs
//! behind one rate-limited client) and the pack's Manifold DTOs
//! (`other_examples/.../themis__extract-src-platforms-manifold.rs.rs`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::resilience::{execute_with_retry, SeenIdSet};
use crate::adapters::{MarketOutcome, MarketSnapshot, PlatformAdapter, SubscriptionHandle};
use crate::bus::{Event, EventBus};
use crate::config::AdapterSettings;
use crate::error::EngineError;
use crate::model::{Amount, Bet, Direction, Platform};

#[derive(Debug, Clone)]
pub struct RestOddsParams {
    pub platform: Platform,
    pub base_url: String,
    pub api_key: Option<String>,
}

/// A single venue-native trade/fill record, the shape common to CLOB-style
/// REST APIs: one outcome side, one size, one timestamp.
#[derive(Debug, Deserialize)]
struct RawTrade {
    id: String,
    market_id: String,
    trader: String,
    side: String, // "yes" | "no" (mapped to bull/bear at ingress)
    size: f64,
    #[serde(default)]
    tx_hash: Option<String>,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct RawMarketOutcome {
    resolved: bool,
    winner: Option<String>,
    resolved_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawMarket {
    id: String,
    title: String,
    volume: f64,
    /// Current YES/bull probability, already `[0, 1]` (CLOB mid-price).
    probability: f64,
}

pub struct RestOddsAdapter {
    params: RestOddsParams,
    http: reqwest::Client,
    settings: AdapterSettings,
}

impl RestOddsAdapter {
    pub fn new(params: RestOddsParams, settings: AdapterSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(RestOddsAdapter { params, http, settings })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.params.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    fn direction_of(side: &str) -> Direction {
        match side.to_lowercase().as_str() {
            "no" | "down" | "bear" => Direction::Bear,
            _ => Direction::Bull,
        }
    }

    fn to_bet(&self, raw: RawTrade) -> Bet {
        let direction = Self::direction_of(&raw.side);
        Bet {
            id: raw.id,
            trader: raw.trader.to_lowercase(),
            platform: self.params.platform,
            market_id: raw.market_id,
            direction,
            // Odds venues quote USDC-like 6-decimal stablecoins; normalize
            // via integer math, never a float round-trip (spec.md §4.1).
            amount: Amount::from_native_scaled((raw.size * 1_000_000.0).round() as i128, 6),
            timestamp: DateTime::from_timestamp(raw.timestamp, 0).unwrap_or_else(Utc::now),
            tx_hash: raw.tx_hash,
            block_height: None,
            log_index: None,
            won: None,
            claimed_amount: None,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> anyhow::Result<T> {
        let url = format!("{}{}", self.params.base_url, path);
        let response = self.authed(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("{} {} returned {}", self.params.platform, path, response.status());
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PlatformAdapter for RestOddsAdapter {
    fn platform(&self) -> Platform {
        self.params.platform
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        self.http
            .get(&self.params.base_url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Unavailable(format!("{}: {e}", self.params.platform)))
    }

    async fn current_cursor(&self) -> Result<u64, EngineError> {
        #[derive(Deserialize)]
        struct Health {
            epoch: u64,
        }
        let health: Health = execute_with_retry(&self.settings, "current_cursor", || {
            self.get_json::<Health>("/health")
        })
        .await?;
        Ok(health.epoch)
    }

    async fn bets_for_user(
        &self,
        address: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bet>, EngineError> {
        let path = format!("/trades?user={}", address.to_lowercase());
        let raw: Vec<RawTrade> = self
            .get_json(&path)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(raw
            .into_iter()
            .map(|r| self.to_bet(r))
            .filter(|b| since.map(|s| b.timestamp >= s).unwrap_or(true))
            .collect())
    }

    async fn bets_for_market(&self, market_id: &str) -> Result<Vec<Bet>, EngineError> {
        let path = format!("/trades?market={market_id}");
        let raw: Vec<RawTrade> = self
            .get_json(&path)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(raw.into_iter().map(|r| self.to_bet(r)).collect())
    }

    async fn trader_bets(&self, address: &str, limit: usize) -> Result<Vec<Bet>, EngineError> {
        let mut bets = self.bets_for_user(address, None).await?;
        bets.truncate(limit);
        Ok(bets)
    }

    async fn recent_bets(&self, window: chrono::Duration, limit: usize) -> Result<Vec<Bet>, EngineError> {
        let path = format!("/trades/recent?minutes={}&limit={limit}", window.num_minutes().max(1));
        let raw: Vec<RawTrade> = self
            .get_json(&path)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(raw.into_iter().map(|r| self.to_bet(r)).collect())
    }

    async fn market_outcome(&self, market_id: &str) -> Result<MarketOutcome, EngineError> {
        let path = format!("/markets/{market_id}/outcome");
        let raw: RawMarketOutcome = self
            .get_json(&path)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(MarketOutcome {
            resolved: raw.resolved,
            winner: raw.winner.as_deref().map(Self::direction_of),
            resolved_at: raw
                .resolved_at
                .and_then(|t| DateTime::from_timestamp(t, 0)),
        })
    }

    async fn market_snapshot(&self, market_id: &str) -> Result<MarketSnapshot, EngineError> {
        let path = format!("/markets/{market_id}");
        let raw: RawMarket = self
            .get_json(&path)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(MarketSnapshot {
            market_id: raw.id,
            title: raw.title,
            volume: Amount::from_native_scaled((raw.volume * 1_000_000.0).round() as i128, 6),
            probability: raw.probability.clamp(0.0, 1.0),
        })
    }

    async fn active_markets(&self, limit: usize) -> Result<Vec<String>, EngineError> {
        let path = format!("/markets/active?limit={limit}");
        let raw: Vec<RawMarket> = self
            .get_json(&path)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        Ok(raw.into_iter().map(|m| m.id).collect())
    }

    async fn is_market_active(&self, market_id: &str) -> Result<bool, EngineError> {
        let outcome = self.market_outcome(market_id).await?;
        Ok(!outcome.resolved)
    }

    async fn backfill(
        &self,
        from_cursor: u64,
        to_cursor: u64,
        on_bet: &(dyn Fn(Bet) + Send + Sync),
    ) -> Result<(), EngineError> {
        // REST odds venues expose a full trade history endpoint rather than
        // block ranges; "cursor" here is an opaque page offset.
        let mut offset = from_cursor;
        while offset <= to_cursor {
            let path = format!("/trades?offset={offset}&limit=500");
            let raw: Vec<RawTrade> = match self.get_json(&path).await {
                Ok(r) => r,
                Err(err) => {
                    warn!(platform = %self.params.platform, offset, error = %err, "backfill page failed, retrying after backoff");
                    tokio::time::sleep(self.settings.inter_chunk_delay * 10).await;
                    continue;
                }
            };
            if raw.is_empty() {
                break;
            }
            let found = raw.len();
            for trade in raw {
                on_bet(self.to_bet(trade));
            }
            info!(platform = %self.params.platform, chunk_range = format!("{offset}-{}", offset + 500), found, "backfill page");
            offset += 500;
            if offset <= to_cursor {
                tokio::time::sleep(self.settings.inter_chunk_delay).await;
            }
        }
        Ok(())
    }

    async fn subscribe(self: Arc<Self>, bus: Arc<EventBus>) -> SubscriptionHandle {
        let cancel = CancellationToken::new();
        let child_cancel = cancel.clone();
        let adapter = self.clone();
        let poll_interval = Duration::from_secs(5);

        let task = tokio::spawn(async move {
            let mut seen = SeenIdSet::new(adapter.settings.seen_id_cap);
            loop {
                tokio::select! {
                    _ = child_cancel.cancelled() => {
                        info!(platform = %adapter.params.platform, "subscription cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        match adapter.recent_bets(chrono::Duration::minutes(5), 200).await {
                            Ok(bets) => {
                                for bet in bets {
                                    if seen.observe(&bet.dedup_key()) {
                                        bus.emit(Event::BetDetected(bet));
                                    }
                                }
                            }
                            Err(err) => {
                                warn!(platform = %adapter.params.platform, error = %err, "subscribe poll failed");
                            }
                        }
                    }
                }
            }
        });

        SubscriptionHandle::new(cancel, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_no_side_to_bear() {
        assert_eq!(RestOddsAdapter::direction_of("NO"), Direction::Bear);
        assert_eq!(RestOddsAdapter::direction_of("yes"), Direction::Bull);
        assert_eq!(RestOddsAdapter::direction_of("up"), Direction::Bull);
    }

    #[test]
    fn six_decimal_size_normalizes_without_drift() {
        let params = RestOddsParams {
            platform: Platform::Polymarket,
            base_url: "http://localhost".into(),
            api_key: None,
        };
        let adapter = RestOddsAdapter::new(params, AdapterSettings::default()).unwrap();
        let bet = adapter.to_bet(RawTrade {
            id: "t1".into(),
            market_id: "m1".into(),
            trader: "0xAAA".into(),
            side: "yes".into(),
            size: 12.5,
            tx_hash: None,
            timestamp: 0,
        });
        assert_eq!(bet.amount.as_native_f64(), 12.5);
    }
}
