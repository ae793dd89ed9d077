//! `GamingAlert` storage (spec.md §4.7): insert, list pending, and the
//! per-(type, wallet) dedup-window lookup used before raising a duplicate.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::EngineError;
use crate::model::{AlertStatus, AlertType, GamingAlert, Severity};

use super::Store;

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn status_str(s: AlertStatus) -> &'static str {
    match s {
        AlertStatus::Pending => "pending",
        AlertStatus::Investigating => "investigating",
        AlertStatus::Confirmed => "confirmed",
        AlertStatus::Dismissed => "dismissed",
    }
}

fn alert_type_str(t: AlertType) -> &'static str {
    match t {
        AlertType::WashTrading => "WASH_TRADING",
        AlertType::SybilCluster => "SYBIL_CLUSTER",
        AlertType::StatisticalAnomaly => "STATISTICAL_ANOMALY",
        AlertType::Collusion => "COLLUSION",
        AlertType::TimingManipulation => "TIMING_MANIPULATION",
    }
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Critical => "CRITICAL",
        Severity::Warning => "WARNING",
        Severity::Info => "INFO",
    }
}

impl Store {
    pub fn insert_alert(&self, alert: &GamingAlert) -> Result<(), EngineError> {
        let wallets_json = serde_json::to_string(&alert.wallets)
            .map_err(|e| EngineError::Invariant(format!("wallets serialize: {e}")))?;
        let payload = serde_json::to_string(alert)
            .map_err(|e| EngineError::Invariant(format!("alert serialize: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO gaming_alerts (id, alert_type, severity, wallets_json, payload_json,
                status, reviewer, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                alert.id,
                alert_type_str(alert.alert_type),
                severity_str(alert.severity),
                wallets_json,
                payload,
                status_str(alert.status),
                alert.reviewer,
                alert.notes,
                ts(alert.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn pending_alerts(&self, limit: usize) -> Result<Vec<GamingAlert>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM gaming_alerts WHERE status = 'pending'
             ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row?;
            out.push(
                serde_json::from_str(&payload)
                    .map_err(|e| EngineError::Invariant(format!("alert deserialize: {e}")))?,
            );
        }
        Ok(out)
    }

    fn set_status(
        &self,
        id: &str,
        status: AlertStatus,
        reviewer: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Option<GamingAlert>, EngineError> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM gaming_alerts WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .ok();
        let Some(payload) = payload else { return Ok(None) };
        let mut alert: GamingAlert = serde_json::from_str(&payload)
            .map_err(|e| EngineError::Invariant(format!("alert deserialize: {e}")))?;
        alert.status = status;
        alert.reviewer = reviewer.map(str::to_string).or(alert.reviewer);
        alert.notes = notes.map(str::to_string).or(alert.notes);
        let payload = serde_json::to_string(&alert)
            .map_err(|e| EngineError::Invariant(format!("alert serialize: {e}")))?;

        conn.execute(
            "UPDATE gaming_alerts SET status = ?1, reviewer = ?2, notes = ?3, payload_json = ?4
             WHERE id = ?5",
            params![status_str(status), alert.reviewer, alert.notes, payload, id],
        )?;
        Ok(Some(alert))
    }

    pub fn dismiss_alert(
        &self,
        id: &str,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<Option<GamingAlert>, EngineError> {
        self.set_status(id, AlertStatus::Dismissed, Some(reviewer), notes)
    }

    pub fn confirm_alert(
        &self,
        id: &str,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<Option<GamingAlert>, EngineError> {
        self.set_status(id, AlertStatus::Confirmed, Some(reviewer), notes)
    }

    /// Every alert (any status) implicating `wallet`, newest first — the
    /// evidence trail behind `/api/wallet/:address/analyze`.
    pub fn alerts_for_wallet(&self, wallet: &str, limit: usize) -> Result<Vec<GamingAlert>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT payload_json, wallets_json FROM gaming_alerts ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (payload, wallets_json) = row?;
            let wallets: Vec<String> = serde_json::from_str(&wallets_json)
                .map_err(|e| EngineError::Invariant(format!("wallets deserialize: {e}")))?;
            if !wallets.iter().any(|w| w.eq_ignore_ascii_case(wallet)) {
                continue;
            }
            out.push(
                serde_json::from_str(&payload)
                    .map_err(|e| EngineError::Invariant(format!("alert deserialize: {e}")))?,
            );
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// True if a non-dismissed alert of this `(alert_type, wallet)` pair was
    /// already raised within the dedup window (spec.md §4.7 "no duplicate
    /// alert for the same evidence within the window").
    pub fn has_recent_alert(
        &self,
        alert_type: AlertType,
        wallet: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT wallets_json FROM gaming_alerts
             WHERE alert_type = ?1 AND status != 'dismissed' AND created_at >= ?2",
        )?;
        let rows = stmt.query_map(
            params![alert_type_str(alert_type), ts(since)],
            |r| r.get::<_, String>(0),
        )?;
        for row in rows {
            let wallets: Vec<String> = serde_json::from_str(&row?)
                .map_err(|e| EngineError::Invariant(format!("wallets deserialize: {e}")))?;
            if wallets.iter().any(|w| w.eq_ignore_ascii_case(wallet)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_alert(id: &str) -> GamingAlert {
        GamingAlert {
            id: id.into(),
            alert_type: AlertType::WashTrading,
            severity: Severity::Warning,
            wallets: vec!["0xaaa".into(), "0xbbb".into()],
            evidence: json!({"co_occurring_rounds": 25}),
            recommended_action: "flag wallets for manual review".into(),
            status: AlertStatus::Pending,
            reviewer: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_list_dismiss_roundtrip() {
        let store = Store::open_in_memory();
        store.insert_alert(&sample_alert("a1")).unwrap();
        assert_eq!(store.pending_alerts(10).unwrap().len(), 1);

        let dismissed = store.dismiss_alert("a1", "ops", Some("false positive")).unwrap().unwrap();
        assert_eq!(dismissed.status, AlertStatus::Dismissed);
        assert!(store.pending_alerts(10).unwrap().is_empty());
    }

    #[test]
    fn dedup_window_detects_recent_overlap() {
        let store = Store::open_in_memory();
        store.insert_alert(&sample_alert("a1")).unwrap();
        assert!(store
            .has_recent_alert(AlertType::WashTrading, "0xAAA", Utc::now() - chrono::Duration::hours(1))
            .unwrap());
        assert!(!store
            .has_recent_alert(AlertType::Collusion, "0xaaa", Utc::now() - chrono::Duration::hours(1))
            .unwrap());
    }
}
