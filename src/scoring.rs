//! TruthScore computation (spec.md §4.2): a pure, deterministic function of
//! `UserStats`. No I/O, no clock reads beyond what callers pass in — calling
//! it twice with identical inputs yields byte-identical output, per spec.md
//! §4.2 "Constraints".

use chrono::{DateTime, Utc};

use crate::model::{Platform, ScoreBreakdown, ScoreFormula, Tier, TruthScore, UserStats};

const Z_95: f64 = 1.96;

/// `platformScore` before the binary/odds-venue adjustment (spec.md §4.2
/// "Per-platform score").
fn base_platform_score(stats: &UserStats) -> f64 {
    let win_rate_pct = stats.win_rate() * 100.0;
    let win_points = stats.wins as f64 * 100.0;
    let win_rate_bonus = if win_rate_pct > 55.0 {
        (win_rate_pct - 55.0) * 10.0
    } else {
        0.0
    };
    let volume_bonus = (stats.volume.as_native_f64() * 10.0).floor().min(500.0);
    let consistency = if stats.total_bets >= 100 {
        300.0
    } else if stats.total_bets >= 50 {
        200.0
    } else if stats.total_bets >= 20 {
        100.0
    } else {
        0.0
    };
    (win_points + win_rate_bonus + volume_bonus + consistency).floor()
}

/// Wilson score interval lower bound at `z`, standard closed form. Damps
/// small-sample win rates toward 50% (spec.md §4.2 "Binary-market venues").
fn wilson_lower_bound(wins: u64, trials: u64, z: f64) -> f64 {
    if trials == 0 {
        return 0.5;
    }
    let n = trials as f64;
    let p = wins as f64 / n;
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = p + z2 / (2.0 * n);
    let spread = z * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt();
    (center - spread) / denom
}

/// Binary-market venue adjustment: skill-vs-baseline damping via the Wilson
/// lower bound, ramped in by sample size (spec.md §4.2).
fn binary_market_score(stats: &UserStats, min_bets_for_full_score: u64) -> f64 {
    let raw = base_platform_score(stats);
    let decided = stats.wins + stats.losses;
    let skill = wilson_lower_bound(stats.wins, decided, Z_95);
    let damp = (skill - 0.5).max(0.0) * 2.0 + 0.5; // 0.5 (no skill) .. 1.0 (full skill)
    let sample_ramp = (stats.total_bets as f64 / min_bets_for_full_score as f64).min(1.0);
    raw * damp * sample_ramp
}

/// Odds-market venue adjustment: ROI/trade-count weighting with a recency
/// bonus (spec.md §4.2).
fn odds_market_score(stats: &UserStats, now: DateTime<Utc>, recency_window: chrono::Duration) -> f64 {
    let raw = base_platform_score(stats);
    let invested = stats.volume.as_native_f64();
    let roi = if invested > 0.0 {
        stats.realized_pnl.as_native_f64() / invested
    } else {
        0.0
    };
    let roi_multiplier = (1.0 + roi).max(0.0);
    let trade_count_factor = ((stats.total_bets as f64).ln_1p() / 10f64.ln_1p()).min(1.5);
    let recency_bonus = match stats.last_bet_at {
        Some(last) if now - last <= recency_window => 25.0,
        _ => 0.0,
    };
    raw * roi_multiplier.max(0.1) * trade_count_factor.max(0.1) + recency_bonus
}

/// Per-platform contribution to a trader's unified score, dispatching on
/// the venue's `ScoreFormula` (spec.md §4.2 Open Question, resolved per
/// venue in `model::platform::PLATFORMS` — see DESIGN.md).
pub fn platform_score(
    stats: &UserStats,
    formula: ScoreFormula,
    now: DateTime<Utc>,
    min_bets_for_full_score: u64,
    recency_window: chrono::Duration,
) -> f64 {
    match formula {
        ScoreFormula::BinaryMarket => binary_market_score(stats, min_bets_for_full_score),
        ScoreFormula::OddsMarket => odds_market_score(stats, now, recency_window),
    }
}

/// Unified `TruthScore` across every platform the trader has stats on.
/// Platforms the trader has never touched contribute nothing (treated as
/// score 0, not an error — spec.md §4.2 "Constraints").
pub fn unified_score(
    address: &str,
    per_platform: &[(Platform, UserStats)],
    platform_weight: impl Fn(Platform) -> f64,
    now: DateTime<Utc>,
    min_bets_for_full_score: u64,
    recency_window: chrono::Duration,
) -> TruthScore {
    let mut breakdown = Vec::with_capacity(per_platform.len());
    let mut total = 0.0;
    for (platform, stats) in per_platform {
        let formula = platform.info().formula;
        let score = platform_score(stats, formula, now, min_bets_for_full_score, recency_window);
        let weight = platform_weight(*platform);
        total += score * weight;
        breakdown.push(ScoreBreakdown {
            platform: *platform,
            score,
            weight,
        });
    }

    TruthScore {
        address: address.to_lowercase(),
        total_score: total,
        tier: Tier::for_score(total),
        breakdown,
        last_updated: now,
    }
}

/// Leaderboard ordering (spec.md §4.2): `totalScore` desc, tie-break by
/// active-platform count desc.
pub fn leaderboard_order(a: &TruthScore, b: &TruthScore) -> std::cmp::Ordering {
    b.total_score
        .partial_cmp(&a.total_score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.breakdown.len().cmp(&a.breakdown.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;

    /// spec.md §8 scenario 1: trader=0xA, PancakeSwap, one bull bet of 0.1
    /// native, epoch 1001 resolves bull win. `platformScore = 551`.
    #[test]
    fn scenario_1_ingest_and_score() {
        let stats = UserStats {
            address: "0xa".into(),
            platform: Some(Platform::PancakeSwapPrediction),
            total_bets: 1,
            wins: 1,
            losses: 0,
            pending: 0,
            volume: Amount::from_native_f64(0.1),
            realized_pnl: Amount::from_native_f64(0.09),
            first_bet_at: Some(Utc::now()),
            last_bet_at: Some(Utc::now()),
        };
        assert_eq!(stats.win_rate(), 1.0);
        assert_eq!(base_platform_score(&stats), 551.0);
    }

    /// spec.md §8 scenario 1 states the end result as `tier=PLATINUM`, but
    /// that's inconsistent with the general §4.2 rule: `PancakeSwapPrediction`
    /// is a `BinaryMarket` venue, so the pre-damping 551 still goes through
    /// the Wilson-lower-bound skill damp and the sample-size ramp before
    /// `Tier::for_score` ever sees it. At `min_bets_for_full_score=50` a
    /// single decided bet ramps in at `1/50`, so the real pipeline lands on
    /// `Bronze`, not `Platinum` — and undamped, 551 is `Gold` by the
    /// threshold table, not `Platinum` either. The damped pipeline is
    /// authoritative here (see DESIGN.md); this asserts the actual produced
    /// tier rather than letting the contradiction hide behind a pre-damping
    /// or `> 0.0` assertion.
    #[test]
    fn scenario_1_end_to_end_tier_is_damped_not_platinum() {
        let now = Utc::now();
        let stats = UserStats {
            address: "0xa".into(),
            platform: Some(Platform::PancakeSwapPrediction),
            total_bets: 1,
            wins: 1,
            losses: 0,
            pending: 0,
            volume: Amount::from_native_f64(0.1),
            realized_pnl: Amount::from_native_f64(0.09),
            first_bet_at: Some(now),
            last_bet_at: Some(now),
        };
        let score = unified_score(
            "0xA",
            &[(Platform::PancakeSwapPrediction, stats)],
            |_| 1.0,
            now,
            50,
            chrono::Duration::days(90),
        );
        assert!((score.total_score - 5.51).abs() < 0.01);
        assert_eq!(score.tier, Tier::Bronze);
    }

    #[test]
    fn tier_thresholds_drive_unified_score() {
        let now = Utc::now();
        let stats = UserStats {
            total_bets: 120,
            wins: 90,
            losses: 30,
            volume: Amount::from_native_f64(50.0),
            last_bet_at: Some(now),
            ..Default::default()
        };
        let per_platform = vec![(Platform::PancakeSwapPrediction, stats)];
        let score = unified_score(
            "0xA",
            &per_platform,
            |_| 1.0,
            now,
            50,
            chrono::Duration::days(90),
        );
        assert_eq!(score.address, "0xa");
        assert!(score.total_score > 0.0);
    }

    #[test]
    fn missing_platform_stats_contribute_zero_not_error() {
        let now = Utc::now();
        let score = unified_score("0xb", &[], |_| 1.0, now, 50, chrono::Duration::days(90));
        assert_eq!(score.total_score, 0.0);
        assert_eq!(score.tier, Tier::Bronze);
    }

    #[test]
    fn deterministic_recompute() {
        let now = Utc::now();
        let stats = UserStats {
            total_bets: 10,
            wins: 7,
            losses: 3,
            volume: Amount::from_native_f64(3.0),
            last_bet_at: Some(now),
            ..Default::default()
        };
        let per_platform = vec![(Platform::Polymarket, stats)];
        let a = unified_score("0xc", &per_platform, |_| 1.0, now, 50, chrono::Duration::days(90));
        let b = unified_score("0xc", &per_platform, |_| 1.0, now, 50, chrono::Duration::days(90));
        assert_eq!(a.total_score, b.total_score);
        assert_eq!(a.tier, b.tier);
    }
}
