//! `GamingAlert` (spec.md §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    WashTrading,
    SybilCluster,
    StatisticalAnomaly,
    Collusion,
    TimingManipulation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Investigating,
    Confirmed,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamingAlert {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    /// Non-empty (invariant 5).
    pub wallets: Vec<String>,
    /// Free-form JSON evidence payload.
    pub evidence: serde_json::Value,
    pub recommended_action: String,
    pub status: AlertStatus,
    pub reviewer: Option<String>,
    pub notes: Option<String>,
    /// Immutable once set (invariant 5).
    pub created_at: DateTime<Utc>,
}

impl GamingAlert {
    pub fn check_invariants(&self) -> bool {
        !self.wallets.is_empty()
    }
}
