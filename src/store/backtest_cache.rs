//! Backtest result cache, keyed by leader + settings hash (spec.md §4.8 step
//! 7: "re-running an identical backtest within the cache TTL returns the
//! cached result unchanged").

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::EngineError;
use crate::model::{BacktestResult, BacktestSettings};

use super::Store;

fn cache_key(settings: &BacktestSettings) -> String {
    format!("{}:{}", settings.leader.to_lowercase(), settings.settings_hash())
}

impl Store {
    pub fn cached_backtest(
        &self,
        settings: &BacktestSettings,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<BacktestResult>, EngineError> {
        let conn = self.conn.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT payload_json, created_at FROM backtest_cache WHERE cache_key = ?1",
                params![cache_key(settings)],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((payload, created_at)) = row else {
            return Ok(None);
        };
        if now.timestamp() - created_at > ttl.as_secs() as i64 {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&payload).map_err(|e| {
            EngineError::Invariant(format!("backtest cache deserialize: {e}"))
        })?))
    }

    pub fn put_backtest(
        &self,
        settings: &BacktestSettings,
        result: &BacktestResult,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let payload = serde_json::to_string(result)
            .map_err(|e| EngineError::Invariant(format!("backtest cache serialize: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO backtest_cache (cache_key, payload_json, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET
                payload_json = excluded.payload_json,
                created_at = excluded.created_at",
            params![cache_key(settings), payload, now.timestamp()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MonthlyReturn, RiskMetrics};

    fn sample_settings() -> BacktestSettings {
        BacktestSettings {
            leader: "0xaaa".into(),
            start: Utc::now() - chrono::Duration::days(30),
            end: Utc::now(),
            initial_capital: 1000.0,
            allocation_percent: 5.0,
            max_bet_size: 100.0,
            compounding: true,
            stop_loss_percent: None,
        }
    }

    fn sample_result(settings: BacktestSettings) -> BacktestResult {
        BacktestResult {
            settings,
            trades: vec![],
            metrics: RiskMetrics {
                total_return_percent: 12.0,
                annualized_return_percent: 140.0,
                max_drawdown_percent: 5.0,
                max_drawdown_at: None,
                sharpe_ratio: 1.5,
                sortino_ratio: 2.0,
                calmar_ratio: 1.1,
                profit_factor: 1.8,
                expectancy: 0.02,
            },
            monthly_returns: vec![MonthlyReturn {
                month: "2026-06".into(),
                return_percent: 12.0,
            }],
            best_month: None,
            worst_month: None,
            win_rate: 0.6,
            total_trades: 10,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn cache_hit_within_ttl_miss_after_expiry() {
        let store = Store::open_in_memory();
        let settings = sample_settings();
        let result = sample_result(settings.clone());
        let now = Utc::now();

        store.put_backtest(&settings, &result, now).unwrap();
        let hit = store
            .cached_backtest(&settings, Duration::from_secs(3600), now)
            .unwrap();
        assert!(hit.is_some());

        let miss = store
            .cached_backtest(&settings, Duration::from_secs(3600), now + chrono::Duration::hours(2))
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn distinct_settings_hash_to_distinct_keys() {
        let a = sample_settings();
        let mut b = sample_settings();
        b.allocation_percent = 10.0;
        assert_ne!(cache_key(&a), cache_key(&b));
    }
}
