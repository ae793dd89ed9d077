//! In-process typed pub/sub (spec.md §4.3).
//!
//! Grounded in the teacher's `broadcast::channel::<WsServerEvent>(1000)` in
//! `main.rs` plus its `parking_lot` usage for short critical sections. The
//! publish path is synchronous (`emit`); delivery fan-out to subscribers is
//! `tokio::sync::broadcast`, which preserves per-subscriber publication
//! order (spec.md §4.3 "Ordering guarantee").

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::model::{
    Bet, CrossPlatformSignal, GamingAlert, Round, SmartMoneySignal, TrendingTopic,
};

const HISTORY_CAPACITY: usize = 1_000;
const CHANNEL_CAPACITY: usize = 1_000;

/// The closed event-type set (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    BetDetected(Bet),
    SignalGenerated(SmartMoneySignal),
    AlertCreated(GamingAlert),
    CopyTradeExecuted(CopyTradeExecuted),
    RoundStarted(Round),
    RoundLocked(Round),
    RoundEnded(Round),
    TrendDetected(TrendingTopic),
    TrendUpdated(TrendingTopic),
    CrossSignal(CrossPlatformSignal),
    SmartMoneyMove(SmartMoneySignal),
    Error(EngineErrorEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyTradeExecuted {
    pub leader: String,
    pub follower: String,
    pub market_id: String,
    pub amount: crate::model::Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineErrorEvent {
    pub component: String,
    pub message: String,
}

impl Event {
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::BetDetected(_) => "BET_DETECTED",
            Event::SignalGenerated(_) => "SIGNAL_GENERATED",
            Event::AlertCreated(_) => "ALERT_CREATED",
            Event::CopyTradeExecuted(_) => "COPY_TRADE_EXECUTED",
            Event::RoundStarted(_) => "ROUND_STARTED",
            Event::RoundLocked(_) => "ROUND_LOCKED",
            Event::RoundEnded(_) => "ROUND_ENDED",
            Event::TrendDetected(_) => "TREND_DETECTED",
            Event::TrendUpdated(_) => "TREND_UPDATED",
            Event::CrossSignal(_) => "CROSS_SIGNAL",
            Event::SmartMoneyMove(_) => "SMART_MONEY_MOVE",
            Event::Error(_) => "ERROR",
        }
    }
}

/// A delivered envelope, as projected onto the WebSocket surface too
/// (spec.md §6 "server pushes `{type, data, timestamp}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub data: Event,
    pub timestamp: DateTime<Utc>,
}

/// The bus: synchronous `emit`, bounded history ring, broadcast fan-out.
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
    history: Mutex<VecDeque<Envelope>>,
}

impl EventBus {
    pub fn new() -> Arc<EventBus> {
        let (sender, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(EventBus {
            sender,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        })
    }

    /// Publish an event. Delivery to subscribers happens synchronously on
    /// this call's execution context (spec.md §4.3 "Model").
    pub fn emit(&self, event: Event) {
        let envelope = Envelope {
            event_type: event.type_name(),
            timestamp: Utc::now(),
            data: event,
        };

        {
            let mut history = self.history.lock();
            if history.len() >= HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(envelope.clone());
        }

        // A lagging/absent receiver must never block the publisher; a
        // closed channel (no subscribers) is not an error.
        let _ = self.sender.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    pub fn recent(&self, limit: usize) -> Vec<Envelope> {
        let history = self.history.lock();
        history.iter().rev().take(limit).cloned().collect()
    }

    /// One-shot wait for the next event of `type_name` matching `predicate`,
    /// bounded by `timeout_dur` (spec.md §4.3 `waitFor`).
    pub async fn wait_for<F>(
        &self,
        type_name: &'static str,
        timeout_dur: Duration,
        predicate: F,
    ) -> Option<Envelope>
    where
        F: Fn(&Envelope) -> bool,
    {
        let mut rx = self.subscribe();
        let fut = async {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if envelope.event_type == type_name && predicate(&envelope) {
                            return Some(envelope);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        };
        timeout(timeout_dur, fut).await.unwrap_or(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Platform};

    fn sample_bet() -> Bet {
        Bet {
            id: "b1".into(),
            trader: "0xa".into(),
            platform: Platform::Polymarket,
            market_id: "m1".into(),
            direction: crate::model::Direction::Bull,
            amount: Amount::from_native_f64(1.0),
            timestamp: Utc::now(),
            tx_hash: None,
            block_height: None,
            log_index: None,
            won: None,
            claimed_amount: None,
        }
    }

    #[tokio::test]
    async fn subscribers_see_publication_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(Event::BetDetected(sample_bet()));
        bus.emit(Event::Error(EngineErrorEvent {
            component: "test".into(),
            message: "boom".into(),
        }));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event_type, "BET_DETECTED");
        assert_eq!(second.event_type, "ERROR");
    }

    #[tokio::test]
    async fn history_is_bounded_and_fifo() {
        let bus = EventBus::new();
        for _ in 0..(HISTORY_CAPACITY + 10) {
            bus.emit(Event::BetDetected(sample_bet()));
        }
        assert_eq!(bus.recent(usize::MAX).len(), HISTORY_CAPACITY);
    }

    #[tokio::test]
    async fn wait_for_times_out_when_nothing_matches() {
        let bus = EventBus::new();
        let result = bus
            .wait_for("SIGNAL_GENERATED", Duration::from_millis(20), |_| true)
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.emit(Event::BetDetected(sample_bet()));
    }
}
