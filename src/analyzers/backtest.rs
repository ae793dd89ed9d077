//! Backtesting engine (spec.md §4.8): replays a leader's historical bets
//! against a hypothetical copy-trading portfolio and reports risk-adjusted
//! performance, cached by `(leader, range, settings)`.
//!
//! Unlike the other analyzers this isn't a background loop — it's invoked
//! on demand from the API surface, mirroring the teacher's own
//! `backtest`/`backtest_v2` request-response modules rather than a
//! `tokio::spawn` task.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::model::{
    BacktestResult, BacktestSettings, BacktestTrade, Bet, MonthlyReturn, Platform, RiskMetrics,
};
use crate::store::Store;

/// Fee-adjusted payout multiplier applied to the copy amount on a win
/// (spec.md §4.8 step 4, calibrated against spec.md §8 scenario 5: `6 wins *
/// 0.09 - 4 losses * 0.1 = 0.14` for a 0.1-native bet).
const WIN_PAYOUT_FACTOR: f64 = 0.9;

/// Rounds-per-year used to annualize Sharpe/Sortino (spec.md §4.8 step 6).
/// Fixed-round binary venues lock every 5 minutes; odds/CLOB venues have no
/// native round cadence, so one trading day stands in for one "round".
fn rounds_per_year(platform: Platform) -> f64 {
    match platform {
        Platform::PancakeSwapPrediction | Platform::AuroraPredict => 288.0 * 365.0,
        _ => 365.0,
    }
}

/// Copy amount for one trade (spec.md §4.8 step 3), clamped to the
/// configured max bet size and to the portfolio actually available.
fn copy_amount(settings: &BacktestSettings, portfolio: f64) -> f64 {
    let base = if settings.compounding {
        portfolio * (settings.allocation_percent / 100.0)
    } else {
        settings.initial_capital * (settings.allocation_percent / 100.0)
    };
    base.min(settings.max_bet_size).min(portfolio.max(0.0)).max(0.0)
}

fn month_key(ts: DateTime<Utc>) -> String {
    format!("{}", ts.format("%Y-%m"))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stddev(values: &[f64], avg: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Runs the replay over already-fetched, time-ordered bets (spec.md §4.8
/// steps 2-6). Bets without a resolved `won` are skipped (step 2 "skip
/// unresolved").
pub fn simulate(settings: &BacktestSettings, bets: &[Bet]) -> BacktestResult {
    let mut portfolio = settings.initial_capital;
    let mut peak = settings.initial_capital;
    let mut trades = Vec::new();
    let mut per_trade_returns = Vec::new();
    let mut max_drawdown_percent = 0.0;
    let mut max_drawdown_at = None;
    let mut venue = bets.first().map(|b| b.platform).unwrap_or(Platform::PancakeSwapPrediction);

    for bet in bets {
        let Some(won) = bet.won else { continue };
        venue = bet.platform;
        let amount = copy_amount(settings, portfolio);
        if amount <= 0.0 {
            break;
        }

        let pnl = if won { amount * WIN_PAYOUT_FACTOR } else { -amount };
        portfolio += pnl;
        peak = peak.max(portfolio);

        let drawdown_percent = if peak > 0.0 { (peak - portfolio) / peak * 100.0 } else { 0.0 };
        if drawdown_percent > max_drawdown_percent {
            max_drawdown_percent = drawdown_percent;
            max_drawdown_at = Some(bet.timestamp);
        }

        per_trade_returns.push(pnl / settings.initial_capital.max(f64::EPSILON));
        trades.push(BacktestTrade {
            bet_id: bet.id.clone(),
            market_id: bet.market_id.clone(),
            timestamp: bet.timestamp,
            copy_amount: amount,
            won,
            pnl,
            portfolio_after: portfolio,
        });

        if let Some(stop_loss) = settings.stop_loss_percent {
            if drawdown_percent >= stop_loss {
                break;
            }
        }
    }

    let total_trades = trades.len();
    let wins = trades.iter().filter(|t| t.won).count();
    let win_rate = if total_trades > 0 { wins as f64 / total_trades as f64 } else { 0.0 };
    let total_return_percent =
        (portfolio - settings.initial_capital) / settings.initial_capital.max(f64::EPSILON) * 100.0;

    let annualized_return_percent = if total_trades > 0 {
        let growth = 1.0 + total_return_percent / 100.0;
        if growth > 0.0 {
            (growth.powf(rounds_per_year(venue) / total_trades as f64) - 1.0) * 100.0
        } else {
            -100.0
        }
    } else {
        0.0
    };

    let avg_return = mean(&per_trade_returns);
    let return_stddev = stddev(&per_trade_returns, avg_return);
    let downside: Vec<f64> = per_trade_returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_stddev = stddev(&downside, mean(&downside));
    let annualization = rounds_per_year(venue).sqrt();

    let sharpe_ratio = if return_stddev > 0.0 { avg_return / return_stddev * annualization } else { 0.0 };
    let sortino_ratio = if downside_stddev > 0.0 { avg_return / downside_stddev * annualization } else { 0.0 };
    let calmar_ratio = if max_drawdown_percent > 0.0 {
        annualized_return_percent / max_drawdown_percent
    } else {
        0.0
    };

    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| -t.pnl).sum();
    let profit_factor = if gross_loss > 0.0 { gross_profit / gross_loss } else { 0.0 };
    let expectancy = if total_trades > 0 {
        trades.iter().map(|t| t.pnl).sum::<f64>() / total_trades as f64
    } else {
        0.0
    };

    let mut by_month: std::collections::BTreeMap<String, f64> = std::collections::BTreeMap::new();
    for trade in &trades {
        *by_month.entry(month_key(trade.timestamp)).or_insert(0.0) +=
            trade.pnl / settings.initial_capital.max(f64::EPSILON) * 100.0;
    }
    let monthly_returns: Vec<MonthlyReturn> = by_month
        .into_iter()
        .map(|(month, return_percent)| MonthlyReturn { month, return_percent })
        .collect();
    let best_month = monthly_returns
        .iter()
        .cloned()
        .max_by(|a, b| a.return_percent.partial_cmp(&b.return_percent).unwrap_or(std::cmp::Ordering::Equal));
    let worst_month = monthly_returns
        .iter()
        .cloned()
        .min_by(|a, b| a.return_percent.partial_cmp(&b.return_percent).unwrap_or(std::cmp::Ordering::Equal));

    BacktestResult {
        settings: settings.clone(),
        trades,
        metrics: RiskMetrics {
            total_return_percent,
            annualized_return_percent,
            max_drawdown_percent,
            max_drawdown_at,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            profit_factor,
            expectancy,
        },
        monthly_returns,
        best_month,
        worst_month,
        win_rate,
        total_trades,
        computed_at: Utc::now(),
    }
}

/// Runs (or returns a cached) backtest for `settings` (spec.md §4.8 step 7).
pub fn run(
    store: &Store,
    settings: &BacktestSettings,
    cache_ttl: Duration,
) -> Result<BacktestResult, EngineError> {
    let now = Utc::now();
    if let Some(cached) = store.cached_backtest(settings, cache_ttl, now)? {
        return Ok(cached);
    }

    let bets = store.bets_for_trader_in_range(&settings.leader, settings.start, settings.end)?;
    let result = simulate(settings, &bets);
    store.put_backtest(settings, &result, now)?;
    Ok(result)
}
