//! REST + WebSocket surface (spec.md §4.9, §6): a thin axum layer over the
//! store/bus/analyzer-settings the rest of the engine already owns, not a
//! second source of truth.
//!
//! Grounded in the teacher's `api::routes`/`api::simple_routes` handler
//! shape (`Query`/`Json` extractors, `AxumState<AppState>`, `{success,
//! data}` envelopes) and its `main.rs` websocket upgrade handler.

pub mod auth;
pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::analyzers::AdapterRegistry;
use crate::bus::EventBus;
use crate::config::{AnalyzerSettings, Settings};
use crate::store::Store;

/// Shared application state handed to every handler (spec.md §5 "Shared
/// state"): the store, the bus, the live analyzer settings, and the
/// adapter registry the wallet/market-facing endpoints read through.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub analyzers: Arc<AnalyzerSettings>,
    pub api_shared_secret: Option<String>,
    pub adapters: Arc<AdapterRegistry>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        bus: Arc<EventBus>,
        settings: &Settings,
        adapters: Arc<AdapterRegistry>,
    ) -> AppState {
        AppState {
            store,
            bus,
            analyzers: Arc::new(settings.analyzers.clone()),
            api_shared_secret: settings.api_shared_secret.clone(),
            adapters,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let headers: Vec<axum::http::HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(headers).allow_methods(tower_http::cors::Any)
}

/// Builds the full router: `/health` is the only path the auth middleware
/// bypasses (spec.md §6 "Auth ... bypassed only for /health").
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/signals/current/:platform", get(routes::signal_current))
        .route("/api/signals/history", get(routes::signal_history))
        .route("/api/signals/subscribe", get(ws::subscribe))
        .route("/api/backtest", post(routes::run_backtest))
        .route("/api/alerts/pending", get(routes::pending_alerts))
        .route("/api/alerts/:id/dismiss", post(routes::dismiss_alert))
        .route("/api/alerts/:id/confirm", post(routes::confirm_alert))
        .route("/api/wallet/:address/analyze", get(routes::wallet_analyze))
        .route("/api/trends", get(routes::trends))
        .route("/api/cross-signals/strongest", get(routes::cross_signals_strongest))
        .route("/api/leaderboard/unified", get(routes::leaderboard_unified))
        .route("/api/trader/:address", get(routes::trader_profile))
        .route_layer(from_fn_with_state(state.clone(), auth::require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}
