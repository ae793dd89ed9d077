//! Retry/backoff, chunked backfill, and bounded-dedup polling subscription —
//! the resilience primitives shared by every adapter (spec.md §4.1
//! "Resilience requirements").
//!
//! Grounded in `PolymarketScraper::execute_with_retry` in the teacher
//! (attempt loop, exponential backoff, per-attempt timeout) generalized to
//! an arbitrary async operation instead of one GET-with-query-params shape.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::AdapterSettings;
use crate::error::EngineError;
use crate::model::{Bet, Platform};

/// Retries `op` up to `settings.max_retries` times with exponential backoff
/// (base `settings.base_backoff`, doubling each attempt), each attempt
/// bounded by `settings.request_timeout`. Returns the last error if every
/// attempt fails.
pub async fn execute_with_retry<T, F, Fut>(
    settings: &AdapterSettings,
    op_name: &str,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut backoff = settings.base_backoff;
    let mut last_err = None;

    for attempt in 0..settings.max_retries {
        match tokio::time::timeout(settings.request_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                warn!(op = op_name, attempt = attempt + 1, error = %err, "transient failure");
                last_err = Some(err.to_string());
            }
            Err(_) => {
                warn!(op = op_name, attempt = attempt + 1, "request timed out");
                last_err = Some(format!("{op_name} timed out after {:?}", settings.request_timeout));
            }
        }

        if attempt + 1 < settings.max_retries {
            sleep(backoff).await;
            backoff *= 2;
        }
    }

    Err(EngineError::Transient(last_err.unwrap_or_else(|| {
        format!("{op_name} failed after {} attempts", settings.max_retries)
    })))
}

/// Runs a ranged query in chunks of `chunk_size` cursor units, invoking
/// `fetch_chunk` for each `[from, to]` sub-range and calling `on_bet` for
/// every returned bet. On a chunk error, sleeps 10x the inter-chunk delay
/// before continuing — the whole backfill never aborts (spec.md §4.1).
pub async fn chunked_backfill<F, Fut>(
    platform: Platform,
    from_cursor: u64,
    to_cursor: u64,
    chunk_size: u64,
    inter_chunk_delay: Duration,
    mut fetch_chunk: F,
    on_bet: &(dyn Fn(Bet) + Send + Sync),
) -> Result<(), EngineError>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<Bet>>>,
{
    if from_cursor > to_cursor {
        return Ok(());
    }
    let mut cursor = from_cursor;
    while cursor <= to_cursor {
        let chunk_end = (cursor + chunk_size - 1).min(to_cursor);
        match fetch_chunk(cursor, chunk_end).await {
            Ok(bets) => {
                let found = bets.len();
                for bet in bets {
                    on_bet(bet);
                }
                debug!(
                    platform = %platform,
                    chunk_range = format!("{cursor}-{chunk_end}"),
                    found,
                    "backfill chunk"
                );
                cursor = chunk_end + 1;
                if cursor <= to_cursor && !inter_chunk_delay.is_zero() {
                    sleep(inter_chunk_delay).await;
                }
            }
            Err(err) => {
                warn!(
                    platform = %platform,
                    chunk_range = format!("{cursor}-{chunk_end}"),
                    error = %err,
                    "backfill chunk failed, backing off and retrying"
                );
                sleep(inter_chunk_delay * 10).await;
                // Retry the same chunk rather than skipping it, so backfill
                // is restartable from any cursor without gaps.
            }
        }
    }
    Ok(())
}

/// Bounded, FIFO-evicted set of recently-seen bet ids, used by venues with
/// no push feed to turn periodic `getRecentBets` polling into a dedup'd
/// subscription (spec.md §4.1 "polling subscription").
pub struct SeenIdSet {
    order: VecDeque<String>,
    members: HashSet<String>,
    cap: usize,
}

impl SeenIdSet {
    pub fn new(cap: usize) -> Self {
        SeenIdSet {
            order: VecDeque::with_capacity(cap),
            members: HashSet::with_capacity(cap),
            cap,
        }
    }

    /// Returns `true` if `id` had not been seen before (and records it).
    pub fn observe(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }
        if self.order.len() >= self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        self.order.push_back(id.to_string());
        self.members.insert(id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_gives_up_after_n_attempts() {
        let settings = AdapterSettings {
            max_retries: 3,
            base_backoff: Duration::from_millis(1),
            request_timeout: Duration::from_millis(50),
            ..AdapterSettings::default()
        };
        let attempts = AtomicU32::new(0);
        let result: Result<(), EngineError> = execute_with_retry(&settings, "test_op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { anyhow::bail!("boom") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_succeeds_on_a_later_attempt() {
        let settings = AdapterSettings {
            max_retries: 3,
            base_backoff: Duration::from_millis(1),
            request_timeout: Duration::from_millis(50),
            ..AdapterSettings::default()
        };
        let attempts = AtomicU32::new(0);
        let result = execute_with_retry(&settings, "test_op", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    anyhow::bail!("still failing")
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn seen_id_set_evicts_fifo_at_capacity() {
        let mut seen = SeenIdSet::new(2);
        assert!(seen.observe("a"));
        assert!(seen.observe("b"));
        assert!(!seen.observe("a"));
        assert!(seen.observe("c")); // evicts "a"
        assert!(seen.observe("a")); // "a" was evicted, so it's new again
    }
}
