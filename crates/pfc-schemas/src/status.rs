//! Challenge status as a closed tagged variant.
//!
//! Terminal variants carry the rule that ended the challenge, so "already
//! terminal" checks and reason lookups are exhaustive matches rather than
//! string comparisons. The flat `status` / `*_reason` columns used by the
//! store are produced by [`ChallengeStatus::kind`] and
//! [`ChallengeStatus::failure_reason`] / [`ChallengeStatus::success_reason`],
//! and parsed back with [`ChallengeStatus::from_columns`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SchemaError;

// ---------------------------------------------------------------------------
// Reasons
// ---------------------------------------------------------------------------

/// Loss rule that failed a challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    DailyLossLimitExceeded,
    TotalLossLimitExceeded,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::DailyLossLimitExceeded => "daily_loss_limit_exceeded",
            FailureReason::TotalLossLimitExceeded => "total_loss_limit_exceeded",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        match s {
            "daily_loss_limit_exceeded" => Ok(FailureReason::DailyLossLimitExceeded),
            "total_loss_limit_exceeded" => Ok(FailureReason::TotalLossLimitExceeded),
            other => Err(SchemaError::InvalidValue {
                field: "failure_reason",
                value: other.to_string(),
            }),
        }
    }
}

/// Rule that passed a challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessReason {
    ProfitTargetReached,
}

impl SuccessReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuccessReason::ProfitTargetReached => "profit_target_reached",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        match s {
            "profit_target_reached" => Ok(SuccessReason::ProfitTargetReached),
            other => Err(SchemaError::InvalidValue {
                field: "success_reason",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// StatusKind: flat discriminant used for filters and CAS
// ---------------------------------------------------------------------------

/// Status without its reason payload.
///
/// This is what the store compares against in a compare-and-swap and what
/// list filters select on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Active,
    Success,
    Failed,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Active => "active",
            StatusKind::Success => "success",
            StatusKind::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        match s {
            "active" => Ok(StatusKind::Active),
            "success" => Ok(StatusKind::Success),
            "failed" => Ok(StatusKind::Failed),
            other => Err(SchemaError::InvalidValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusKind::Active)
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ChallengeStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a challenge.
///
/// Only `Active -> Success` and `Active -> Failed` are legal transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ChallengeStatus {
    Active,
    Success(SuccessReason),
    Failed(FailureReason),
}

impl ChallengeStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            ChallengeStatus::Active => StatusKind::Active,
            ChallengeStatus::Success(_) => StatusKind::Success,
            ChallengeStatus::Failed(_) => StatusKind::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Identifier of the rule that produced this status, if any.
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            ChallengeStatus::Active => None,
            ChallengeStatus::Success(r) => Some(r.as_str()),
            ChallengeStatus::Failed(r) => Some(r.as_str()),
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            ChallengeStatus::Failed(r) => Some(*r),
            _ => None,
        }
    }

    pub fn success_reason(&self) -> Option<SuccessReason> {
        match self {
            ChallengeStatus::Success(r) => Some(*r),
            _ => None,
        }
    }

    /// Rebuild a status from its persisted columns.
    ///
    /// A terminal status without its matching reason column is rejected: the
    /// record would not say which rule ended it.
    pub fn from_columns(
        status: &str,
        failure_reason: Option<&str>,
        success_reason: Option<&str>,
    ) -> Result<Self, SchemaError> {
        match StatusKind::parse(status)? {
            StatusKind::Active => Ok(ChallengeStatus::Active),
            StatusKind::Success => {
                let raw = success_reason.ok_or(SchemaError::MissingField("success_reason"))?;
                Ok(ChallengeStatus::Success(SuccessReason::parse(raw)?))
            }
            StatusKind::Failed => {
                let raw = failure_reason.ok_or(SchemaError::MissingField("failure_reason"))?;
                Ok(ChallengeStatus::Failed(FailureReason::parse(raw)?))
            }
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason_code() {
            Some(reason) => write!(f, "{}({})", self.kind(), reason),
            None => write!(f, "{}", self.kind()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
