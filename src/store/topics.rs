//! `TrendingTopic` storage, upserted by normalized topic (spec.md §4.5).

use chrono::{TimeZone, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::EngineError;
use crate::model::TrendingTopic;

use super::Store;

impl Store {
    /// One topic by its normalized key — what the detector reads back each
    /// cycle to compute `velocity` against the previous cycle's volume
    /// (spec.md §4.5 step 5).
    pub fn trending_topic(&self, topic: &str) -> Result<Option<TrendingTopic>, EngineError> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM trending_topics WHERE normalized_topic = ?1",
                params![topic],
                |r| r.get(0),
            )
            .optional()?;
        payload
            .map(|p| {
                serde_json::from_str(&p)
                    .map_err(|e| EngineError::Invariant(format!("topic deserialize: {e}")))
            })
            .transpose()
    }

    pub fn upsert_trending_topic(&self, topic: &TrendingTopic) -> Result<(), EngineError> {
        let payload = serde_json::to_string(topic)
            .map_err(|e| EngineError::Invariant(format!("topic serialize: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO trending_topics (normalized_topic, payload_json, score, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(normalized_topic) DO UPDATE SET
                payload_json = excluded.payload_json,
                score = excluded.score,
                last_updated = excluded.last_updated",
            params![
                topic.topic,
                payload,
                topic.score,
                topic.last_updated.timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Highest-scoring topics first (spec.md §6 `/api/trends`).
    pub fn top_trending_topics(&self, limit: usize) -> Result<Vec<TrendingTopic>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM trending_topics ORDER BY score DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row?;
            out.push(
                serde_json::from_str(&payload)
                    .map_err(|e| EngineError::Invariant(format!("topic deserialize: {e}")))?,
            );
        }
        Ok(out)
    }

    /// Evicts topics untouched since `older_than` epoch-seconds cutoff (used
    /// by the trend-detector cycle to drop stale clusters, spec.md §4.5).
    pub fn evict_stale_topics(&self, cutoff: chrono::DateTime<Utc>) -> Result<usize, EngineError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM trending_topics WHERE last_updated < ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Category};

    fn sample_topic(score: f64) -> TrendingTopic {
        TrendingTopic {
            topic: "us-election".into(),
            score,
            velocity: 1.0,
            total_volume: Amount::from_native_f64(500.0),
            total_markets: 3,
            category: Category::Events,
            platforms: vec![],
            first_seen: Utc::now(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn upsert_and_order_by_score() {
        let store = Store::open_in_memory();
        store.upsert_trending_topic(&sample_topic(10.0)).unwrap();
        store
            .upsert_trending_topic(&{
                let mut t = sample_topic(99.0);
                t.topic = "world-cup".into();
                t
            })
            .unwrap();

        let top = store.top_trending_topics(10).unwrap();
        assert_eq!(top[0].topic, "world-cup");
    }

    #[test]
    fn stale_topics_are_evicted() {
        let store = Store::open_in_memory();
        let mut topic = sample_topic(5.0);
        topic.last_updated = Utc.timestamp_opt(1, 0).unwrap();
        store.upsert_trending_topic(&topic).unwrap();

        let evicted = store
            .evict_stale_topics(Utc.timestamp_opt(1000, 0).unwrap())
            .unwrap();
        assert_eq!(evicted, 1);
        assert!(store.top_trending_topics(10).unwrap().is_empty());
    }
}
