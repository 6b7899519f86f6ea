//! Challenge summary: trade statistics plus distance to each rule threshold.

use pfc_schemas::{Challenge, Trade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::PERCENT;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeStatistics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Winning trades as a percentage of all trades (0 when there are none).
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub average_win: Decimal,
    /// Negative (or zero) by construction.
    pub average_loss: Decimal,
}

/// Amount the balance still has to move before a rule triggers.
///
/// Each value is clamped at zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingDistance {
    pub to_profit_target: Decimal,
    pub before_daily_failure: Decimal,
    pub before_total_failure: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSummary {
    pub challenge: Challenge,
    pub trade_statistics: TradeStatistics,
    pub remaining: RemainingDistance,
}

/// Summarize a challenge and the trades recorded against it.
///
/// Open trades count towards `total_trades` but carry no P&L yet.
pub fn summarize(challenge: &Challenge, trades: &[Trade]) -> ChallengeSummary {
    ChallengeSummary {
        challenge: challenge.clone(),
        trade_statistics: trade_statistics(trades),
        remaining: remaining_distance(challenge),
    }
}

fn trade_statistics(trades: &[Trade]) -> TradeStatistics {
    let pnls: Vec<Decimal> = trades.iter().map(|t| t.pnl.unwrap_or_default()).collect();

    let wins: Vec<Decimal> = pnls.iter().copied().filter(|p| *p > Decimal::ZERO).collect();
    let losses: Vec<Decimal> = pnls.iter().copied().filter(|p| *p < Decimal::ZERO).collect();

    let win_rate = if trades.is_empty() {
        Decimal::ZERO
    } else {
        Decimal::from(wins.len()) / Decimal::from(trades.len()) * PERCENT
    };

    TradeStatistics {
        total_trades: trades.len(),
        winning_trades: wins.len(),
        losing_trades: losses.len(),
        win_rate,
        total_pnl: pnls.iter().copied().sum(),
        average_win: mean(&wins),
        average_loss: mean(&losses),
    }
}

fn remaining_distance(challenge: &Challenge) -> RemainingDistance {
    let capital = challenge.initial_capital;
    let balance = challenge.current_balance;
    let limits = &challenge.limits;

    let target_balance = capital * (Decimal::ONE + limits.profit_target_percent / PERCENT);
    let daily_floor = capital * (Decimal::ONE - limits.max_daily_loss_percent / PERCENT);
    let total_floor = capital * (Decimal::ONE - limits.max_total_loss_percent / PERCENT);

    RemainingDistance {
        to_profit_target: (target_balance - balance).max(Decimal::ZERO),
        before_daily_failure: (daily_floor - balance).max(Decimal::ZERO),
        before_total_failure: (total_floor - balance).max(Decimal::ZERO),
    }
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().copied().sum::<Decimal>() / Decimal::from(values.len())
}
