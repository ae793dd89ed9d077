//! Persistent store facade (spec.md §6 "Persisted state layout").
//!
//! One `rusqlite::Connection` behind a `parking_lot::Mutex`, matching
//! `signals::db_storage::DbSignalStorage` in the teacher. The store is the
//! only shared mutable state besides the bus history ring (spec.md §5); all
//! writes are upserts keyed by the natural identifiers spec.md §3 names, so
//! concurrent idempotent writers never conflict.

mod alerts;
mod backtest_cache;
mod bets;
mod rounds;
mod schema;
mod signals;
mod topics;

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::Connection;

pub use alerts::*;
pub use backtest_cache::*;
pub use bets::*;
pub use rounds::*;
pub use signals::*;
pub use topics::*;

pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Arc<Store>> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {path}"))?;
        conn.execute_batch(schema::SCHEMA_SQL)
            .context("failed to initialize store schema")?;
        Ok(Arc::new(Store {
            conn: Mutex::new(conn),
        }))
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Arc<Store> {
        let conn = Connection::open_in_memory().expect("in-memory sqlite");
        conn.execute_batch(schema::SCHEMA_SQL)
            .expect("schema init");
        Arc::new(Store {
            conn: Mutex::new(conn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_initializes_schema() {
        let store = Store::open_in_memory();
        let conn = store.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='bets'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
