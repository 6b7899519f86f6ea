use pfc_schemas::Challenge;
use rust_decimal::Decimal;

use crate::{Metrics, RuleError, PERCENT};

/// Compute profit and loss percentages relative to `initial_capital`.
///
/// The daily figure uses `daily_pnl` as-is rather than a recorded
/// start-of-day balance.
pub fn compute_metrics(
    initial_capital: Decimal,
    current_balance: Decimal,
    daily_pnl: Decimal,
) -> Result<Metrics, RuleError> {
    if initial_capital <= Decimal::ZERO {
        return Err(RuleError::NonPositiveCapital { initial_capital });
    }

    let absolute_pnl = current_balance - initial_capital;
    let profit_percentage = absolute_pnl / initial_capital * PERCENT;
    let daily_change = daily_pnl / initial_capital * PERCENT;

    Ok(Metrics {
        absolute_pnl,
        profit_percentage,
        daily_loss_percentage: loss_magnitude(daily_change),
        total_loss_percentage: loss_magnitude(profit_percentage),
    })
}

/// [`compute_metrics`] over one consistently-read challenge record.
pub fn metrics_for(challenge: &Challenge) -> Result<Metrics, RuleError> {
    compute_metrics(
        challenge.initial_capital,
        challenge.current_balance,
        challenge.daily_pnl,
    )
}

/// `|min(x, 0)|`
fn loss_magnitude(change: Decimal) -> Decimal {
    change.min(Decimal::ZERO).abs()
}
