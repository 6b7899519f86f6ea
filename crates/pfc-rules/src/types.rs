use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Percentage scale used by every metric (1% == 1).
pub const PERCENT: Decimal = Decimal::ONE_HUNDRED;

/// Metrics derived from one challenge snapshot.
///
/// Loss percentages are reported as non-negative magnitudes: a gain yields
/// `0`, never a negative loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// `current_balance - initial_capital`.
    pub absolute_pnl: Decimal,
    /// Signed gain relative to initial capital.
    pub profit_percentage: Decimal,
    /// Loss since the last daily reset, from `daily_pnl` alone.
    pub daily_loss_percentage: Decimal,
    /// Loss since start, from the current balance.
    pub total_loss_percentage: Decimal,
}

/// Precondition failures of the pure rule functions.
///
/// These indicate corrupt input (a programming or data-integrity error), not a
/// condition the caller can recover from by retrying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleError {
    /// Every percentage is relative to initial capital, which must be > 0.
    NonPositiveCapital { initial_capital: Decimal },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::NonPositiveCapital { initial_capital } => {
                write!(f, "initial capital must be positive, got {initial_capital}")
            }
        }
    }
}

impl std::error::Error for RuleError {}
