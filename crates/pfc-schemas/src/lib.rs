//! pfc-schemas
//!
//! Plain records shared by every crate: challenges, trades and the inputs
//! used to create or settle them. No IO and no business rules live here.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod status;

pub use status::{ChallengeStatus, FailureReason, StatusKind, SuccessReason};

// ---------------------------------------------------------------------------
// SchemaError
// ---------------------------------------------------------------------------

/// A persisted value that does not map onto the domain types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidValue { field: &'static str, value: String },
    MissingField(&'static str),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::InvalidValue { field, value } => {
                write!(f, "invalid {field}: {value:?}")
            }
            SchemaError::MissingField(field) => write!(f, "missing {field}"),
        }
    }
}

impl std::error::Error for SchemaError {}

// ---------------------------------------------------------------------------
// Rule limits
// ---------------------------------------------------------------------------

/// Thresholds stamped onto a challenge when it is created.
///
/// All values are percentages of initial capital. They never change after
/// creation, so a later policy change does not affect challenges in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLimits {
    pub profit_target_percent: Decimal,
    pub max_daily_loss_percent: Decimal,
    pub max_total_loss_percent: Decimal,
}

// ---------------------------------------------------------------------------
// Challenge
// ---------------------------------------------------------------------------

/// One evaluation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub initial_capital: Decimal,
    pub current_balance: Decimal,
    /// Cumulative since start.
    pub total_pnl: Decimal,
    /// Cumulative since the last daily reset.
    pub daily_pnl: Decimal,
    pub status: ChallengeStatus,
    pub started_at: DateTime<Utc>,
    /// Set exactly once, when the status becomes terminal.
    pub ended_at: Option<DateTime<Utc>>,
    pub daily_reset_at: DateTime<Utc>,
    pub limits: RuleLimits,
}

impl Challenge {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `current_balance == initial_capital + total_pnl`.
    pub fn balance_is_consistent(&self) -> bool {
        self.current_balance == self.initial_capital + self.total_pnl
    }
}

/// Input for creating a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChallenge {
    pub owner_id: Uuid,
    pub initial_capital: Decimal,
    pub limits: RuleLimits,
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        match s {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(SchemaError::InvalidValue {
                field: "direction",
                value: other.to_string(),
            }),
        }
    }
}

/// A position belonging to exactly one challenge.
///
/// `exit_price`, `pnl` and `closed_at` are `None` while the trade is open and
/// are written once, by settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub challenge_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    /// Notional amount.
    pub amount: Decimal,
    pub leverage: Decimal,
    pub pnl: Option<Decimal>,
    pub is_open: bool,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Input for opening a trade against an active challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrade {
    pub owner_id: Uuid,
    pub challenge_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub amount: Decimal,
    pub leverage: Decimal,
}

/// Result of closing a trade, produced by the settlement workflow.
///
/// `pnl` is already computed; the store applies it to the owning challenge's
/// balance, total P&L and daily P&L in the same step that closes the trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSettlement {
    pub trade_id: Uuid,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
