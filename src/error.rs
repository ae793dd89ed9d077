//! Error taxonomy (spec.md §7).
//!
//! Adapters and analyzers work in `anyhow::Result` internally (teacher
//! convention throughout `scrapers/` and `signals/`); this enum is the
//! boundary type the API layer converts internal failures into.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Transient network/rate-limit failure. Never fatal; adapters retry
    /// internally and only surface this after exhausting retries.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Malformed upstream payload; the offending record is skipped and a
    /// counter incremented, never an aborted batch.
    #[error("malformed payload from {source}: {detail}")]
    MalformedPayload { source: String, detail: String },

    /// A store write failed for a reason other than the expected
    /// idempotence violation (`unique_violation`, silently treated as
    /// success by the store facade itself).
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// Invalid configuration, detected at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Programmer error / invariant violation. Logged at `error`, bus emits
    /// `ERROR`, owning task restarts if supervised.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Invalid client input; always a REST 400, never a 500.
    #[error("invalid request: {0}")]
    ClientInput(String),

    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A venue is currently unreachable; callers should fall back to cache.
    #[error("{0} unavailable")]
    Unavailable(String),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::ClientInput(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Transient(_)
            | EngineError::MalformedPayload { .. }
            | EngineError::StoreConflict(_)
            | EngineError::Config(_)
            | EngineError::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::StoreConflict(e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // Idempotence violations on natural-key upserts are not errors.
                EngineError::StoreConflict(format!("ignored constraint violation: {err}"))
            }
            other => EngineError::StoreConflict(other.to_string()),
        }
    }
}
