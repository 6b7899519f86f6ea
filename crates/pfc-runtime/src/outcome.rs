use std::fmt;

use chrono::{DateTime, Utc};
use pfc_rules::{Metrics, RuleError};
use pfc_schemas::ChallengeStatus;
use pfc_store::{Entity, StoreError};
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EvaluationResult
// ---------------------------------------------------------------------------

/// Outcome of one evaluation call. Built fresh each call, never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub challenge_id: Uuid,
    pub status: ChallengeStatus,
    /// `None` only for a terminal record whose stored figures cannot yield
    /// metrics (e.g. non-positive capital).
    pub metrics: Option<Metrics>,
    pub ended_at: Option<DateTime<Utc>>,
    /// `true` only for the call whose write committed the transition.
    pub transitioned: bool,
}

impl EvaluationResult {
    /// Rule identifier behind a terminal status.
    pub fn triggered_rule(&self) -> Option<&'static str> {
        self.status.reason_code()
    }
}

// ---------------------------------------------------------------------------
// Batch / reset summaries
// ---------------------------------------------------------------------------

/// Counts from one `evaluate_all` pass.
///
/// `successes` and `failures` count transitions committed by this pass;
/// a challenge resolved concurrently by another caller is `unchanged`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub evaluated: usize,
    pub successes: usize,
    pub failures: usize,
    pub unchanged: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub reset_count: usize,
    pub failed_ids: Vec<Uuid>,
    pub total_processed: usize,
}

// ---------------------------------------------------------------------------
// EvalError
// ---------------------------------------------------------------------------

/// Errors surfaced by the evaluation core. A lost compare-and-swap race is
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    NotFound { entity: Entity, id: Uuid },
    /// The request is invalid for the stored data (open trade, non-positive
    /// capital, closed trade settled twice).
    Precondition(String),
    Store(StoreError),
}

impl EvalError {
    /// Status code an HTTP layer would map this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            EvalError::NotFound { .. } => 404,
            EvalError::Precondition(_) => 400,
            EvalError::Store(_) => 500,
        }
    }
}

impl From<StoreError> for EvalError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => EvalError::NotFound { entity, id },
            StoreError::Conflict(msg) => EvalError::Precondition(msg),
            other => EvalError::Store(other),
        }
    }
}

impl From<RuleError> for EvalError {
    fn from(e: RuleError) -> Self {
        EvalError::Precondition(e.to_string())
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::NotFound { entity, id } => write!(f, "{} {id} not found", entity.as_str()),
            EvalError::Precondition(msg) => write!(f, "precondition violated: {msg}"),
            EvalError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvalError::Store(e) => Some(e),
            _ => None,
        }
    }
}
