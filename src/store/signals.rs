//! `SmartMoneySignal` (spec.md §4.4) and `CrossPlatformSignal` (spec.md §4.6)
//! storage — both upserted by their natural key, both payload-as-JSON like
//! the teacher's `db_storage.rs` signal rows.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::EngineError;
use crate::model::{CrossPlatformSignal, Platform, SmartMoneySignal};

use super::Store;

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

impl Store {
    pub fn upsert_smart_money_signal(&self, signal: &SmartMoneySignal) -> Result<(), EngineError> {
        let (platform, epoch) = signal.natural_key();
        let payload = serde_json::to_string(signal)
            .map_err(|e| EngineError::Invariant(format!("signal serialize: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO signals (platform, epoch, payload_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(platform, epoch) DO UPDATE SET
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
            params![platform.as_str(), epoch as i64, payload, ts(signal.updated_at)],
        )?;
        Ok(())
    }

    pub fn current_signal(
        &self,
        platform: Platform,
    ) -> Result<Option<SmartMoneySignal>, EngineError> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM signals WHERE platform = ?1
                 ORDER BY epoch DESC LIMIT 1",
                params![platform.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        payload
            .map(|p| {
                serde_json::from_str(&p)
                    .map_err(|e| EngineError::Invariant(format!("signal deserialize: {e}")))
            })
            .transpose()
    }

    pub fn signal_history(
        &self,
        platform: Platform,
        limit: usize,
    ) -> Result<Vec<SmartMoneySignal>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM signals WHERE platform = ?1
             ORDER BY epoch DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![platform.as_str(), limit as i64], |r| {
            r.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row?;
            out.push(
                serde_json::from_str(&payload)
                    .map_err(|e| EngineError::Invariant(format!("signal deserialize: {e}")))?,
            );
        }
        Ok(out)
    }

    pub fn upsert_cross_signal(&self, signal: &CrossPlatformSignal) -> Result<(), EngineError> {
        let payload = serde_json::to_string(signal)
            .map_err(|e| EngineError::Invariant(format!("cross signal serialize: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cross_platform_signals (topic, payload_json, confidence, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(topic) DO UPDATE SET
                payload_json = excluded.payload_json,
                confidence = excluded.confidence,
                expires_at = excluded.expires_at",
            params![
                signal.topic,
                payload,
                signal.confidence,
                ts(signal.expires_at),
            ],
        )?;
        Ok(())
    }

    /// Strongest non-expired cross-platform signals, highest confidence first
    /// (spec.md §6 `/api/cross-signals/strongest`).
    pub fn strongest_cross_signals(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CrossPlatformSignal>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM cross_platform_signals
             WHERE expires_at > ?1 ORDER BY confidence DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![ts(now), limit as i64], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row?;
            out.push(
                serde_json::from_str(&payload)
                    .map_err(|e| EngineError::Invariant(format!("cross signal deserialize: {e}")))?,
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Bps, Consensus, Strength};

    fn sample_signal(epoch: u64) -> SmartMoneySignal {
        SmartMoneySignal {
            platform: Platform::PancakeSwapPrediction,
            epoch,
            consensus: Consensus::Bull,
            confidence: 80.0,
            weighted_bull_percent: 70.0,
            participating_traders: 5,
            diamond_trader_count: 1,
            platinum_trader_count: 2,
            total_volume: Amount::from_native_f64(10.0),
            strength: Strength::Strong,
            top_trader_agreement_percent: 90.0,
            contributing_bets: vec![],
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_then_fetch_current_and_history() {
        let store = Store::open_in_memory();
        store.upsert_smart_money_signal(&sample_signal(1001)).unwrap();
        store.upsert_smart_money_signal(&sample_signal(1002)).unwrap();

        let current = store
            .current_signal(Platform::PancakeSwapPrediction)
            .unwrap()
            .unwrap();
        assert_eq!(current.epoch, 1002);

        let history = store
            .signal_history(Platform::PancakeSwapPrediction, 10)
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn cross_signal_expiry_is_respected() {
        let store = Store::open_in_memory();
        let mut signal = CrossPlatformSignal {
            topic: "election-2028".into(),
            consensus: crate::model::CrossConsensus::LeanYes,
            confidence: 55.0,
            volume_weighted_probability: Bps::from_probability(0.6),
            platforms: vec![],
            total_volume: Amount::from_native_f64(1000.0),
            market_count: 3,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        store.upsert_cross_signal(&signal).unwrap();
        assert_eq!(store.strongest_cross_signals(Utc::now(), 10).unwrap().len(), 1);

        signal.expires_at = Utc::now() - chrono::Duration::hours(1);
        store.upsert_cross_signal(&signal).unwrap();
        assert!(store.strongest_cross_signals(Utc::now(), 10).unwrap().is_empty());
    }
}
