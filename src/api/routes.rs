//! Request handlers for the exact path table in spec.md §6.
//!
//! Every success response is wrapped `{success: true, data: ...}`, matching
//! the teacher's `SignalResponse`/`BacktestResponse` envelopes; failures
//! fall through `EngineError`'s `IntoResponse` impl to `{success: false,
//! error: ...}` with the matching status code.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzers::backtest;
use crate::error::EngineError;
use crate::model::{BacktestSettings, GamingAlert, Platform, UnifiedTrader, PLATFORMS};
use crate::scoring;

use super::AppState;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { success: true, data })
}

#[derive(Serialize)]
struct Pagination {
    limit: usize,
    returned: usize,
}

#[derive(Serialize)]
struct PaginatedEnvelope<T: Serialize> {
    success: bool,
    data: Vec<T>,
    pagination: Pagination,
}

fn paginated<T: Serialize>(data: Vec<T>, limit: usize) -> Json<PaginatedEnvelope<T>> {
    let returned = data.len();
    Json(PaginatedEnvelope { success: true, data, pagination: Pagination { limit, returned } })
}

#[derive(Serialize)]
struct SuccessOnly {
    success: bool,
}

fn success() -> Json<SuccessOnly> {
    Json(SuccessOnly { success: true })
}

fn default_limit() -> usize {
    50
}

// ---------------------------------------------------------------- /health

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    bots: std::collections::HashMap<String, BotHealth>,
}

#[derive(Serialize)]
struct BotHealth {
    enabled: bool,
    reachable: bool,
}

/// Never errors (spec.md §6 `/health`: "never"); adapter reachability is
/// probed with a short timeout and folded into `bots`, but an unreachable
/// venue never turns the whole response into a failure.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut bots = std::collections::HashMap::new();
    for info in PLATFORMS {
        let reachable = match state.adapters.get(&info.platform) {
            Some(adapter) => tokio::time::timeout(Duration::from_secs(2), adapter.initialize())
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false),
            None => false,
        };
        bots.insert(
            info.platform.as_str().to_string(),
            BotHealth { enabled: state.adapters.contains_key(&info.platform), reachable },
        );
    }

    Json(HealthResponse { status: "ok", timestamp: Utc::now(), bots })
}

// ------------------------------------------------------- /api/signals/*

pub async fn signal_current(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<Envelope<Option<crate::model::SmartMoneySignal>>>, EngineError> {
    let platform = Platform::from_str_opt(&platform)
        .ok_or_else(|| EngineError::ClientInput(format!("unknown platform '{platform}'")))?;
    let signal = state.store.current_signal(platform)?;
    Ok(ok(signal))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

/// History across every platform, newest first — no platform is named in
/// the path, so every venue's signal stream is merged (spec.md §6
/// `/api/signals/history`).
pub async fn signal_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<PaginatedEnvelope<crate::model::SmartMoneySignal>>, EngineError> {
    let mut merged = Vec::new();
    for info in PLATFORMS {
        merged.extend(state.store.signal_history(info.platform, q.limit)?);
    }
    merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    merged.truncate(q.limit);
    Ok(paginated(merged, q.limit))
}

// ---------------------------------------------------------- /api/backtest

#[derive(Deserialize)]
pub struct BacktestRequest {
    leader: Option<String>,
    #[serde(rename = "startDate")]
    start_date: String,
    #[serde(rename = "endDate")]
    end_date: String,
    #[serde(rename = "initialCapital")]
    initial_capital: Option<f64>,
    #[serde(rename = "allocationPercent")]
    allocation_percent: Option<f64>,
    #[serde(rename = "maxBetSize")]
    max_bet_size: Option<f64>,
    #[serde(default)]
    compounding: Option<bool>,
}

pub async fn run_backtest(
    State(state): State<AppState>,
    Json(request): Json<BacktestRequest>,
) -> Result<Json<Envelope<crate::model::BacktestResult>>, EngineError> {
    let leader = request
        .leader
        .filter(|l| !l.is_empty())
        .ok_or_else(|| EngineError::ClientInput("missing leader".into()))?;

    let start = DateTime::parse_from_rfc3339(&request.start_date)
        .map_err(|e| EngineError::ClientInput(format!("invalid startDate: {e}")))?
        .with_timezone(&Utc);
    let end = DateTime::parse_from_rfc3339(&request.end_date)
        .map_err(|e| EngineError::ClientInput(format!("invalid endDate: {e}")))?
        .with_timezone(&Utc);

    let settings = BacktestSettings {
        leader,
        start,
        end,
        initial_capital: request.initial_capital.unwrap_or(1_000.0),
        allocation_percent: request.allocation_percent.unwrap_or(10.0),
        max_bet_size: request.max_bet_size.unwrap_or(100.0),
        compounding: request.compounding.unwrap_or(false),
        stop_loss_percent: None,
    };

    let result = backtest::run(&state.store, &settings, state.analyzers.backtest_cache_ttl)?;
    Ok(ok(result))
}

// ------------------------------------------------------------ /api/alerts

#[derive(Deserialize)]
pub struct AlertActionQuery {
    limit: Option<usize>,
}

pub async fn pending_alerts(
    State(state): State<AppState>,
    Query(q): Query<AlertActionQuery>,
) -> Result<Json<Envelope<Vec<GamingAlert>>>, EngineError> {
    let alerts = state.store.pending_alerts(q.limit.unwrap_or(200))?;
    Ok(ok(alerts))
}

#[derive(Deserialize, Default)]
pub struct AlertReviewRequest {
    #[serde(rename = "reviewedBy")]
    reviewed_by: Option<String>,
    notes: Option<String>,
}

pub async fn dismiss_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AlertReviewRequest>,
) -> Result<Json<SuccessOnly>, EngineError> {
    state.store.dismiss_alert(
        &id,
        body.reviewed_by.as_deref().unwrap_or("unknown"),
        body.notes.as_deref(),
    )?;
    Ok(success())
}

pub async fn confirm_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AlertReviewRequest>,
) -> Result<Json<SuccessOnly>, EngineError> {
    state.store.confirm_alert(
        &id,
        body.reviewed_by.as_deref().unwrap_or("unknown"),
        body.notes.as_deref(),
    )?;
    Ok(success())
}

// -------------------------------------------------------- /api/wallet/*

#[derive(Serialize)]
pub struct WalletAnalysis {
    address: String,
    truth_score: crate::model::TruthScore,
    stats: Vec<crate::model::UserStats>,
    recent_alerts: Vec<GamingAlert>,
}

pub async fn wallet_analyze(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Envelope<WalletAnalysis>>, EngineError> {
    let stats = state.store.all_platform_stats_for(&address)?;
    let now = Utc::now();
    let truth_score = unified_trader_score(&stats, &address, now, &state.analyzers);
    let recent_alerts = state.store.alerts_for_wallet(&address, 50)?;

    Ok(ok(WalletAnalysis {
        address: address.to_lowercase(),
        truth_score,
        stats,
        recent_alerts,
    }))
}

// --------------------------------------------------------- /api/trends

#[derive(Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

pub async fn trends(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Envelope<Vec<crate::model::TrendingTopic>>>, EngineError> {
    Ok(ok(state.store.top_trending_topics(q.limit)?))
}

pub async fn cross_signals_strongest(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Envelope<Vec<crate::model::CrossPlatformSignal>>>, EngineError> {
    Ok(ok(state.store.strongest_cross_signals(Utc::now(), q.limit)?))
}

// ----------------------------------------------------- /api/leaderboard

fn unified_trader_score(
    stats: &[crate::model::UserStats],
    address: &str,
    now: DateTime<Utc>,
    analyzers: &crate::config::AnalyzerSettings,
) -> crate::model::TruthScore {
    let per_platform: Vec<(Platform, crate::model::UserStats)> = stats
        .iter()
        .filter_map(|s| s.platform.map(|p| (p, s.clone())))
        .collect();
    let recency_window = chrono::Duration::from_std(analyzers.recency_window)
        .unwrap_or(chrono::Duration::days(90));
    // Every venue counts equally toward the unified score (spec.md §4.2
    // Open Question, resolved in DESIGN.md): no platform is weighted above
    // another.
    scoring::unified_score(
        address,
        &per_platform,
        |_| 1.0,
        now,
        analyzers.min_bets_for_full_score,
        recency_window,
    )
}

fn to_unified_trader(score: crate::model::TruthScore) -> UnifiedTrader {
    let active_platforms = score.breakdown.len();
    UnifiedTrader {
        address: score.address,
        total_score: score.total_score,
        tier: score.tier,
        active_platforms,
        breakdown: score.breakdown,
    }
}

pub async fn leaderboard_unified(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Envelope<Vec<UnifiedTrader>>>, EngineError> {
    let now = Utc::now();
    let mut scores = Vec::new();
    for address in state.store.distinct_traders()? {
        let stats = state.store.all_platform_stats_for(&address)?;
        scores.push(unified_trader_score(&stats, &address, now, &state.analyzers));
    }
    scores.sort_by(scoring::leaderboard_order);
    scores.truncate(q.limit);
    Ok(ok(scores.into_iter().map(to_unified_trader).collect()))
}

pub async fn trader_profile(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Envelope<UnifiedTrader>>, EngineError> {
    let stats = state.store.all_platform_stats_for(&address)?;
    if stats.is_empty() {
        return Err(EngineError::NotFound(format!("trader '{address}'")));
    }
    let score = unified_trader_score(&stats, &address, Utc::now(), &state.analyzers);
    Ok(ok(to_unified_trader(score)))
}
