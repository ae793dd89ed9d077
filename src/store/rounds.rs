//! Round/market lifecycle storage (spec.md §3 `Market`/`Round`, invariant 1).

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::EngineError;
use crate::model::{Amount, Direction, Platform, Round, RoundResolution};

use super::Store;

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

impl Store {
    pub fn upsert_round(&self, round: &Round) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO rounds (platform, market_id, epoch, open_at, lock_at, close_at,
                bull_amount, bear_amount, total_amount, oracle_called, winner, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(platform, epoch) DO UPDATE SET
                lock_at = excluded.lock_at,
                close_at = excluded.close_at,
                bull_amount = excluded.bull_amount,
                bear_amount = excluded.bear_amount,
                total_amount = excluded.total_amount,
                oracle_called = excluded.oracle_called,
                winner = excluded.winner,
                resolved_at = excluded.resolved_at",
            params![
                round.platform.as_str(),
                round.market_id,
                round.epoch as i64,
                ts(round.open_at),
                ts(round.lock_at),
                ts(round.close_at),
                round.bull_amount.0.to_string(),
                round.bear_amount.0.to_string(),
                round.total_amount.0.to_string(),
                round.resolution.oracle_called,
                round.resolution.winner.map(|w| w.as_str()),
                round.resolution.resolved_at.map(ts),
            ],
        )?;
        Ok(())
    }

    pub fn round(&self, platform: Platform, epoch: u64) -> Result<Option<Round>, EngineError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT market_id, open_at, lock_at, close_at, bull_amount, bear_amount,
                        total_amount, oracle_called, winner, resolved_at
                 FROM rounds WHERE platform = ?1 AND epoch = ?2",
                params![platform.as_str(), epoch as i64],
                |r| {
                    let bull: String = r.get(4)?;
                    let bear: String = r.get(5)?;
                    let total: String = r.get(6)?;
                    let winner: Option<String> = r.get(8)?;
                    Ok(Round {
                        market_id: r.get(0)?,
                        platform,
                        epoch,
                        open_at: from_ts(r.get(1)?),
                        lock_at: from_ts(r.get(2)?),
                        close_at: from_ts(r.get(3)?),
                        bull_amount: Amount(bull.parse().unwrap_or(0)),
                        bear_amount: Amount(bear.parse().unwrap_or(0)),
                        total_amount: Amount(total.parse().unwrap_or(0)),
                        resolution: RoundResolution {
                            oracle_called: r.get(7)?,
                            winner: winner.map(|w| {
                                if w == "bull" {
                                    Direction::Bull
                                } else {
                                    Direction::Bear
                                }
                            }),
                            resolved_at: r.get::<_, Option<i64>>(9)?.map(from_ts),
                        },
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_round() -> Round {
        Round {
            market_id: "1001".into(),
            platform: Platform::PancakeSwapPrediction,
            epoch: 1001,
            open_at: Utc::now(),
            lock_at: Utc::now(),
            close_at: Utc::now(),
            bull_amount: Amount::from_native_f64(1.0),
            bear_amount: Amount::from_native_f64(1.0),
            total_amount: Amount::from_native_f64(1.94),
            resolution: RoundResolution {
                oracle_called: false,
                winner: None,
                resolved_at: None,
            },
        }
    }

    #[test]
    fn upsert_is_idempotent_and_updates_on_resolution() {
        let store = Store::open_in_memory();
        store.upsert_round(&sample_round()).unwrap();

        let mut resolved = sample_round();
        resolved.resolution = RoundResolution {
            oracle_called: true,
            winner: Some(Direction::Bull),
            resolved_at: Some(Utc::now()),
        };
        store.upsert_round(&resolved).unwrap();

        let fetched = store
            .round(Platform::PancakeSwapPrediction, 1001)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.resolution.winner, Some(Direction::Bull));
        assert!(fetched.amounts_consistent());
    }
}
