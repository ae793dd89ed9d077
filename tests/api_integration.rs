//! End-to-end API integration test (spec.md §6, §8): seeds real bets into a
//! real store, drives the actual router through a full backtest request,
//! and checks the response envelope rather than any internal function.
//!
//! Grounded in the teacher's own top-level `tests/` convention of keeping
//! integration-level coverage separate from the unit tests colocated with
//! each module.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use truthscore_engine::api::{self, AppState};
use truthscore_engine::bus::EventBus;
use truthscore_engine::config::Settings;
use truthscore_engine::model::{Amount, Bet, Direction, Platform};
use truthscore_engine::store::Store;

fn seed_bet(store: &Store, trader: &str, won: bool, amount: f64, when: DateTime<Utc>) {
    let bet = Bet {
        id: uuid::Uuid::new_v4().to_string(),
        trader: trader.to_string(),
        platform: Platform::Polymarket,
        market_id: "market-1".into(),
        direction: Direction::Bull,
        amount: Amount::from_native_f64(amount),
        timestamp: when,
        tx_hash: None,
        block_height: None,
        log_index: None,
        won: Some(won),
        claimed_amount: None,
    };
    store.upsert_bet(&bet).expect("seed bet");
}

fn test_settings() -> Settings {
    let mut settings = Settings::from_env().unwrap_or_else(|_| panic!("Settings::from_env"));
    settings.database_path = ":memory:".into();
    settings.api_shared_secret = None;
    settings
}

#[tokio::test]
async fn backtest_endpoint_replays_seeded_bets() {
    let store = Store::open_in_memory();
    let now = Utc::now();
    for i in 0..6 {
        seed_bet(&store, "0xleader", true, 0.1, now - ChronoDuration::days(10 - i));
    }
    for i in 0..4 {
        seed_bet(&store, "0xleader", false, 0.1, now - ChronoDuration::days(20 - i));
    }

    let settings = test_settings();
    let state = AppState::new(
        store,
        EventBus::new(),
        &settings,
        Arc::new(HashMap::new()),
    );
    let app = api::router(state, &settings.cors_origins);

    let body = json!({
        "leader": "0xleader",
        "startDate": (now - ChronoDuration::days(30)).to_rfc3339(),
        "endDate": now.to_rfc3339(),
        "initialCapital": 1.0,
        "allocationPercent": 10.0,
        "compounding": false,
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/backtest")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["data"]["total_trades"], 10);
}

#[tokio::test]
async fn health_endpoint_is_reachable_without_an_api_key() {
    let mut settings = test_settings();
    settings.api_shared_secret = Some("configured-secret".into());
    let state = AppState::new(
        Store::open_in_memory(),
        EventBus::new(),
        &settings,
        Arc::new(HashMap::new()),
    );
    let app = api::router(state, &settings.cors_origins);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
