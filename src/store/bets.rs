//! Bet ingestion and per-(trader, platform) stats rollup (spec.md §3, §8
//! duplicate-suppression scenario, invariant 3).

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::EngineError;
use crate::model::{Amount, Bet, Direction, Platform, UserStats};

use super::Store;

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// Adds `delta` to a decimal-string `Amount` column, doing the arithmetic in
/// `i128` rather than SQLite's native 64-bit `INTEGER` space (which would
/// silently truncate once a trader's cumulative volume exceeds `i64::MAX`).
fn add_to_decimal_string(current: &str, delta: i128) -> String {
    let current: i128 = current.parse().unwrap_or(0);
    (current + delta).to_string()
}

impl Store {
    /// Idempotent upsert keyed by `dedup_key()`. Returns `true` if this call
    /// inserted a new row, `false` if the bet was already known (spec.md §8:
    /// "ingesting the same bet event twice... yields exactly one stored Bet").
    pub fn upsert_bet(&self, bet: &Bet) -> Result<bool, EngineError> {
        let conn = self.conn.lock();
        let dedup_key = bet.dedup_key();

        let already: Option<String> = conn
            .query_row(
                "SELECT id FROM bets WHERE dedup_key = ?1",
                params![dedup_key],
                |r| r.get(0),
            )
            .optional()?;
        if already.is_some() {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO bets (id, dedup_key, trader, platform, market_id, direction, amount,
                timestamp, tx_hash, block_height, log_index, won, claimed_amount)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                bet.id,
                dedup_key,
                bet.trader.to_lowercase(),
                bet.platform.as_str(),
                bet.market_id,
                bet.direction.as_str(),
                bet.amount.0.to_string(),
                ts(bet.timestamp),
                bet.tx_hash,
                bet.block_height.map(|b| b as i64),
                bet.log_index.map(|l| l as i64),
                bet.won,
                bet.claimed_amount.map(|a| a.0.to_string()),
            ],
        )?;

        conn.execute(
            "INSERT INTO traders (address, first_seen, last_active) VALUES (?1, ?2, ?2)
             ON CONFLICT(address) DO UPDATE SET last_active = excluded.last_active
             WHERE excluded.last_active > traders.last_active",
            params![bet.trader.to_lowercase(), ts(bet.timestamp)],
        )?;

        drop(conn);
        self.bump_stats_for_new_bet(bet)?;
        Ok(true)
    }

    fn bump_stats_for_new_bet(&self, bet: &Bet) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        let address = bet.trader.to_lowercase();
        let platform = bet.platform.as_str();
        let ts_now = ts(bet.timestamp);

        let existing_volume: Option<String> = conn
            .query_row(
                "SELECT volume FROM user_platform_stats WHERE address = ?1 AND platform = ?2",
                params![address, platform],
                |r| r.get(0),
            )
            .optional()?;

        match existing_volume {
            Some(volume) => {
                let new_volume = add_to_decimal_string(&volume, bet.amount.0);
                conn.execute(
                    "UPDATE user_platform_stats SET
                        total_bets = total_bets + 1,
                        pending = pending + 1,
                        volume = ?3,
                        last_bet_at = ?4
                     WHERE address = ?1 AND platform = ?2",
                    params![address, platform, new_volume, ts_now],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO user_platform_stats
                        (address, platform, total_bets, wins, losses, pending, volume,
                         realized_pnl, first_bet_at, last_bet_at)
                     VALUES (?1, ?2, 1, 0, 0, 1, ?3, '0', ?4, ?4)",
                    params![address, platform, bet.amount.0.to_string(), ts_now],
                )?;
            }
        }
        Ok(())
    }

    /// Applies a round's resolved outcome to every stored bet in it,
    /// flipping `pending` into `wins`/`losses` exactly once per bet
    /// (invariant 3 is preserved: the transition only ever moves a bet from
    /// pending into wins xor losses, never both).
    pub fn resolve_bets_for_round(
        &self,
        platform: Platform,
        market_id: &str,
        epoch: u64,
        bull_wins: Option<bool>,
    ) -> Result<Vec<Bet>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, trader, market_id, direction, amount, timestamp, tx_hash,
                    block_height, log_index, won, claimed_amount
             FROM bets WHERE platform = ?1 AND market_id = ?2 AND won IS NULL",
        )?;
        let rows = stmt.query_map(params![platform.as_str(), market_id], |r| {
            let direction: String = r.get(3)?;
            let amount: String = r.get(4)?;
            Ok(Bet {
                id: r.get(0)?,
                trader: r.get(1)?,
                platform,
                market_id: r.get(2)?,
                direction: if direction == "bull" {
                    Direction::Bull
                } else {
                    Direction::Bear
                },
                amount: Amount(amount.parse().unwrap_or(0)),
                timestamp: from_ts(r.get(5)?),
                tx_hash: r.get(6)?,
                block_height: r.get::<_, Option<i64>>(7)?.map(|v| v as u64),
                log_index: r.get::<_, Option<i64>>(8)?.map(|v| v as u64),
                won: r.get(9)?,
                claimed_amount: r
                    .get::<_, Option<String>>(10)?
                    .and_then(|s| s.parse::<i128>().ok())
                    .map(Amount),
            })
        })?;

        let mut resolved = Vec::new();
        for row in rows {
            let mut bet = row?;
            bet.resolve(bull_wins);
            resolved.push(bet);
        }
        drop(stmt);

        for bet in &resolved {
            conn.execute(
                "UPDATE bets SET won = ?1 WHERE id = ?2",
                params![bet.won, bet.id],
            )?;
            if let Some(won) = bet.won {
                let address = bet.trader.to_lowercase();
                let current_pnl: Option<String> = conn
                    .query_row(
                        "SELECT realized_pnl FROM user_platform_stats WHERE address = ?1 AND platform = ?2",
                        params![address, bet.platform.as_str()],
                        |r| r.get(0),
                    )
                    .optional()?;
                let delta = if won { bet.amount.0 } else { -bet.amount.0 };
                let new_pnl = add_to_decimal_string(current_pnl.as_deref().unwrap_or("0"), delta);

                if won {
                    conn.execute(
                        "UPDATE user_platform_stats SET wins = wins + 1, pending = pending - 1,
                            realized_pnl = ?3
                         WHERE address = ?1 AND platform = ?2",
                        params![address, bet.platform.as_str(), new_pnl],
                    )?;
                } else {
                    conn.execute(
                        "UPDATE user_platform_stats SET losses = losses + 1, pending = pending - 1,
                            realized_pnl = ?3
                         WHERE address = ?1 AND platform = ?2",
                        params![address, bet.platform.as_str(), new_pnl],
                    )?;
                }
            }
        }
        let _ = epoch;
        Ok(resolved)
    }

    pub fn user_stats(&self, address: &str, platform: Platform) -> Result<UserStats, EngineError> {
        let conn = self.conn.lock();
        let address = address.to_lowercase();
        let row = conn
            .query_row(
                "SELECT total_bets, wins, losses, pending, volume, realized_pnl,
                        first_bet_at, last_bet_at
                 FROM user_platform_stats WHERE address = ?1 AND platform = ?2",
                params![address, platform.as_str()],
                |r| {
                    let volume: String = r.get(4)?;
                    let pnl: String = r.get(5)?;
                    Ok(UserStats {
                        address: address.clone(),
                        platform: Some(platform),
                        total_bets: r.get::<_, i64>(0)? as u64,
                        wins: r.get::<_, i64>(1)? as u64,
                        losses: r.get::<_, i64>(2)? as u64,
                        pending: r.get::<_, i64>(3)? as u64,
                        volume: Amount(volume.parse().unwrap_or(0)),
                        realized_pnl: Amount(pnl.parse().unwrap_or(0)),
                        first_bet_at: r.get::<_, Option<i64>>(6)?.map(from_ts),
                        last_bet_at: r.get::<_, Option<i64>>(7)?.map(from_ts),
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or(UserStats {
            address,
            platform: Some(platform),
            ..Default::default()
        }))
    }

    pub fn all_platform_stats_for(&self, address: &str) -> Result<Vec<UserStats>, EngineError> {
        let conn = self.conn.lock();
        let address = address.to_lowercase();
        let mut stmt = conn.prepare(
            "SELECT platform, total_bets, wins, losses, pending, volume, realized_pnl,
                    first_bet_at, last_bet_at
             FROM user_platform_stats WHERE address = ?1",
        )?;
        let rows = stmt.query_map(params![address], |r| {
            let platform: String = r.get(0)?;
            let volume: String = r.get(5)?;
            let pnl: String = r.get(6)?;
            Ok(UserStats {
                address: address.clone(),
                platform: Platform::from_str_opt(&platform),
                total_bets: r.get::<_, i64>(1)? as u64,
                wins: r.get::<_, i64>(2)? as u64,
                losses: r.get::<_, i64>(3)? as u64,
                pending: r.get::<_, i64>(4)? as u64,
                volume: Amount(volume.parse().unwrap_or(0)),
                realized_pnl: Amount(pnl.parse().unwrap_or(0)),
                first_bet_at: r.get::<_, Option<i64>>(7)?.map(from_ts),
                last_bet_at: r.get::<_, Option<i64>>(8)?.map(from_ts),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn recent_bets(
        &self,
        platform: Platform,
        market_id: &str,
        limit: usize,
    ) -> Result<Vec<Bet>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, trader, direction, amount, timestamp, tx_hash, block_height,
                    log_index, won, claimed_amount
             FROM bets WHERE platform = ?1 AND market_id = ?2
             ORDER BY timestamp DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![platform.as_str(), market_id, limit as i64], |r| {
            let direction: String = r.get(2)?;
            let amount: String = r.get(3)?;
            Ok(Bet {
                id: r.get(0)?,
                trader: r.get(1)?,
                platform,
                market_id: market_id.to_string(),
                direction: if direction == "bull" {
                    Direction::Bull
                } else {
                    Direction::Bear
                },
                amount: Amount(amount.parse().unwrap_or(0)),
                timestamp: from_ts(r.get(4)?),
                tx_hash: r.get(5)?,
                block_height: r.get::<_, Option<i64>>(6)?.map(|v| v as u64),
                log_index: r.get::<_, Option<i64>>(7)?.map(|v| v as u64),
                won: r.get(8)?,
                claimed_amount: r
                    .get::<_, Option<String>>(9)?
                    .and_then(|s| s.parse::<i128>().ok())
                    .map(Amount),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Every bet across every platform since `since`, oldest first — the
    /// working set the anti-gaming scan and the tracked-trader refresh pull
    /// from (spec.md §4.7 "periodic scan").
    pub fn bets_since(&self, since: DateTime<Utc>) -> Result<Vec<Bet>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, trader, platform, market_id, direction, amount, timestamp, tx_hash,
                    block_height, log_index, won, claimed_amount
             FROM bets WHERE timestamp >= ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![ts(since)], |r| {
            let platform: String = r.get(2)?;
            let direction: String = r.get(4)?;
            let amount: String = r.get(5)?;
            Ok(Bet {
                id: r.get(0)?,
                trader: r.get(1)?,
                platform: Platform::from_str_opt(&platform).unwrap_or(Platform::PancakeSwapPrediction),
                market_id: r.get(3)?,
                direction: if direction == "bull" {
                    Direction::Bull
                } else {
                    Direction::Bear
                },
                amount: Amount(amount.parse().unwrap_or(0)),
                timestamp: from_ts(r.get(6)?),
                tx_hash: r.get(7)?,
                block_height: r.get::<_, Option<i64>>(8)?.map(|v| v as u64),
                log_index: r.get::<_, Option<i64>>(9)?.map(|v| v as u64),
                won: r.get(10)?,
                claimed_amount: r
                    .get::<_, Option<String>>(11)?
                    .and_then(|s| s.parse::<i128>().ok())
                    .map(Amount),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// One trader's bets in `[start, end]`, oldest first — the replay input
    /// for the backtesting engine (spec.md §4.8 step 1).
    pub fn bets_for_trader_in_range(
        &self,
        trader: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bet>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, platform, market_id, direction, amount, timestamp, tx_hash,
                    block_height, log_index, won, claimed_amount
             FROM bets WHERE trader = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(
            params![trader.to_lowercase(), ts(start), ts(end)],
            |r| {
                let platform: String = r.get(1)?;
                let direction: String = r.get(3)?;
                let amount: String = r.get(4)?;
                Ok(Bet {
                    id: r.get(0)?,
                    trader: trader.to_lowercase(),
                    platform: Platform::from_str_opt(&platform).unwrap_or(Platform::PancakeSwapPrediction),
                    market_id: r.get(2)?,
                    direction: if direction == "bull" {
                        Direction::Bull
                    } else {
                        Direction::Bear
                    },
                    amount: Amount(amount.parse().unwrap_or(0)),
                    timestamp: from_ts(r.get(5)?),
                    tx_hash: r.get(6)?,
                    block_height: r.get::<_, Option<i64>>(7)?.map(|v| v as u64),
                    log_index: r.get::<_, Option<i64>>(8)?.map(|v| v as u64),
                    won: r.get(9)?,
                    claimed_amount: r
                        .get::<_, Option<String>>(10)?
                        .and_then(|s| s.parse::<i128>().ok())
                        .map(Amount),
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Every address the store has ever seen a bet from (spec.md §4.4 step
    /// 1 "working set of tracked traders" is drawn from this universe).
    pub fn distinct_traders(&self) -> Result<Vec<String>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT address FROM traders")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;

    fn sample_bet(id: &str, tx: &str) -> Bet {
        Bet {
            id: id.into(),
            trader: "0xAAA".into(),
            platform: Platform::PancakeSwapPrediction,
            market_id: "1001".into(),
            direction: Direction::Bull,
            amount: Amount::from_native_f64(0.1),
            timestamp: Utc::now(),
            tx_hash: Some(tx.into()),
            block_height: Some(100),
            log_index: Some(0),
            won: None,
            claimed_amount: None,
        }
    }

    #[test]
    fn duplicate_ingestion_is_idempotent() {
        let store = Store::open_in_memory();
        let bet = sample_bet("b1", "0xabc");
        assert!(store.upsert_bet(&bet).unwrap());
        assert!(!store.upsert_bet(&bet).unwrap());

        let stats = store.user_stats("0xaaa", Platform::PancakeSwapPrediction).unwrap();
        assert_eq!(stats.total_bets, 1);
        assert_eq!(stats.pending, 1);
    }

    #[test]
    fn resolution_preserves_total_bets_invariant() {
        let store = Store::open_in_memory();
        store.upsert_bet(&sample_bet("b1", "0xabc")).unwrap();
        store
            .upsert_bet(&{
                let mut b = sample_bet("b2", "0xdef");
                b.direction = Direction::Bear;
                b
            })
            .unwrap();

        store
            .resolve_bets_for_round(Platform::PancakeSwapPrediction, "1001", 1001, Some(true))
            .unwrap();

        let stats = store.user_stats("0xaaa", Platform::PancakeSwapPrediction).unwrap();
        assert_eq!(stats.total_bets, stats.wins + stats.losses + stats.pending);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn bets_since_and_distinct_traders_see_new_ingests() {
        let store = Store::open_in_memory();
        store.upsert_bet(&sample_bet("b1", "0xabc")).unwrap();
        store
            .upsert_bet(&{
                let mut b = sample_bet("b2", "0xdef");
                b.trader = "0xBBB".into();
                b
            })
            .unwrap();

        let all = store.bets_since(Utc::now() - chrono::Duration::hours(1)).unwrap();
        assert_eq!(all.len(), 2);

        let traders = store.distinct_traders().unwrap();
        assert_eq!(traders.len(), 2);
        assert!(traders.contains(&"0xaaa".to_string()));
        assert!(traders.contains(&"0xbbb".to_string()));
    }

    #[test]
    fn bets_for_trader_in_range_excludes_other_traders_and_out_of_range() {
        let store = Store::open_in_memory();
        store.upsert_bet(&sample_bet("b1", "0xabc")).unwrap();
        store
            .upsert_bet(&{
                let mut b = sample_bet("b2", "0xdef");
                b.trader = "0xBBB".into();
                b
            })
            .unwrap();

        let now = Utc::now();
        let in_range = store
            .bets_for_trader_in_range("0xAAA", now - chrono::Duration::hours(1), now + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].trader, "0xaaa");

        let out_of_range = store
            .bets_for_trader_in_range("0xAAA", now - chrono::Duration::hours(3), now - chrono::Duration::hours(2))
            .unwrap();
        assert!(out_of_range.is_empty());
    }

    /// `volume`/`realized_pnl` accumulate as full-precision `i128` decimal
    /// strings, not SQLite's native 64-bit `INTEGER`, so a whale trader's
    /// cumulative stake well past `i64::MAX` smallest-units still lands
    /// exactly rather than wrapping/truncating.
    #[test]
    fn stats_accumulate_past_i64_max_without_truncating() {
        let store = Store::open_in_memory();
        let huge = Amount(i128::from(i64::MAX) * 10);

        let mut bet = sample_bet("b1", "0xabc");
        bet.amount = huge;
        store.upsert_bet(&bet).unwrap();

        let mut bet2 = sample_bet("b2", "0xdef");
        bet2.amount = huge;
        store.upsert_bet(&bet2).unwrap();

        let stats = store.user_stats("0xaaa", Platform::PancakeSwapPrediction).unwrap();
        assert_eq!(stats.volume.0, huge.0 * 2);

        store
            .resolve_bets_for_round(Platform::PancakeSwapPrediction, "1001", 1001, Some(true))
            .unwrap();
        let stats = store.user_stats("0xaaa", Platform::PancakeSwapPrediction).unwrap();
        assert_eq!(stats.realized_pnl.0, huge.0 * 2);
    }
}
