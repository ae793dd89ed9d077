//! Background analyzer bots (spec.md §4.4-§4.8): each owns a slice of
//! derived state computed from the raw `bets`/`rounds` tables, refreshed
//! either on bus events or on a fixed cadence.
//!
//! Grounded in the teacher's `signals::engine` task-per-concern layout: one
//! struct per bot holding its own `Arc<Store>`/`Arc<EventBus>`, spawned as
//! independent `tokio::spawn` loops rather than one monolithic scheduler.

pub mod anti_gaming;
pub mod backtest;
pub mod cross_signals;
pub mod scoring_support;
pub mod smart_money;
pub mod trends;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::adapters::PlatformAdapter;
use crate::bus::EventBus;
use crate::config::AnalyzerSettings;
use crate::model::Platform;
use crate::store::Store;

/// Every live adapter, keyed by the venue it serves — what the trend
/// detector and cross-platform fuser fan out over (spec.md §4.5 step 1,
/// §4.6 step 2).
pub type AdapterRegistry = HashMap<Platform, Arc<dyn PlatformAdapter>>;

/// Join handles for every spawned analyzer task, kept so `main` can await
/// or abort them together on shutdown.
pub struct AnalyzerHandles {
    pub handles: Vec<JoinHandle<()>>,
}

impl AnalyzerHandles {
    pub fn abort_all(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Wires up every enabled analyzer and starts its background task(s).
pub fn spawn_all(
    store: Arc<Store>,
    bus: Arc<EventBus>,
    settings: AnalyzerSettings,
    adapters: Arc<AdapterRegistry>,
) -> AnalyzerHandles {
    let mut handles = Vec::new();

    if settings.smart_money_enabled {
        let aggregator = Arc::new(smart_money::SmartMoneyAggregator::new(
            store.clone(),
            bus.clone(),
            settings.clone(),
        ));
        handles.extend(smart_money::SmartMoneyAggregator::spawn(aggregator));
    }

    if settings.trend_detector_enabled {
        handles.push(trends::spawn(store.clone(), bus.clone(), settings.clone(), adapters.clone()));
    }

    if settings.cross_signals_enabled {
        handles.push(cross_signals::spawn(store.clone(), bus.clone(), settings.clone(), adapters.clone()));
    }

    if settings.anti_gaming_enabled {
        handles.extend(anti_gaming::spawn(store.clone(), bus.clone(), settings.clone()));
    }

    AnalyzerHandles { handles }
}
