//! Challenge repository boundary.
//!
//! This crate defines the store contract the evaluation core consumes and an
//! in-memory implementation of it. The Postgres implementation lives in
//! `pfc-db`.
//!
//! # Contract
//!
//! - Every read returns one whole record; callers never combine fields from
//!   separate round trips.
//! - [`ChallengeRepository::compare_and_update_status`] is the only
//!   synchronization primitive: it writes only when the stored status still
//!   equals `expected`, and reports whether it did.
//! - Implementations bound every call with a timeout and report an expired
//!   call as [`StoreError::Timeout`]. A timed-out write is treated as not
//!   having happened.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pfc_schemas::{
    Challenge, ChallengeStatus, NewChallenge, NewTrade, StatusKind, Trade, TradeSettlement,
};
use uuid::Uuid;

mod memory;

pub use memory::InMemoryStore;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Record kinds, for not-found reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Challenge,
    Trade,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Challenge => "challenge",
            Entity::Trade => "trade",
        }
    }
}

/// Errors a [`ChallengeRepository`] implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The id does not resolve to a record (or not to a record in the
    /// required state, e.g. a closed trade).
    NotFound { entity: Entity, id: Uuid },
    /// The request contradicts the stored data: settling a closed trade,
    /// opening a trade on a terminal challenge, non-positive capital.
    Conflict(String),
    /// The call did not complete within the store's bound.
    Timeout { op: &'static str, after: Duration },
    /// Transport, driver or decode failure.
    Backend(String),
}

impl StoreError {
    /// `true` for failures talking to the store, as opposed to answers
    /// about the data.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout { .. } | StoreError::Backend(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { entity, id } => write!(f, "{} {id} not found", entity.as_str()),
            StoreError::Conflict(msg) => write!(f, "store conflict: {msg}"),
            StoreError::Timeout { op, after } => {
                write!(f, "store call {op} timed out after {}ms", after.as_millis())
            }
            StoreError::Backend(msg) => write!(f, "store backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Status update
// ---------------------------------------------------------------------------

/// Fields written by a status transition.
///
/// The reason columns are derived from `status`, so a transition can never
/// store a reason that disagrees with its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ChallengeStatus,
    pub ended_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Repository trait
// ---------------------------------------------------------------------------

/// Store contract consumed by the evaluation core.
///
/// Object-safe and `Send + Sync` so one `Arc<dyn ChallengeRepository>` can be
/// shared by the scheduler's tasks and synchronous callers.
#[async_trait::async_trait]
pub trait ChallengeRepository: Send + Sync {
    /// Human-readable backend name (e.g. `"postgres"`, `"memory"`).
    fn backend_name(&self) -> &'static str;

    async fn get_challenge(&self, id: Uuid) -> Result<Challenge, StoreError>;

    /// Write `update` only if the stored status kind still equals `expected`.
    ///
    /// Returns `Ok(true)` when the row was written and `Ok(false)` when the
    /// stored status had already moved on (a lost race).
    async fn compare_and_update_status(
        &self,
        id: Uuid,
        expected: StatusKind,
        update: &StatusUpdate,
    ) -> Result<bool, StoreError>;

    /// All challenges whose status kind is in `statuses`.
    async fn list_challenges(&self, statuses: &[StatusKind]) -> Result<Vec<Challenge>, StoreError>;

    /// Set `daily_pnl = 0` and `daily_reset_at = reset_at`. Status, balance
    /// and total P&L are untouched.
    async fn reset_daily_fields(&self, id: Uuid, reset_at: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Bulk variant of [`reset_daily_fields`](Self::reset_daily_fields).
    ///
    /// Each id succeeds or fails on its own; one failure never prevents the
    /// rest from being attempted. Results are returned in input order.
    async fn reset_daily_fields_bulk(
        &self,
        ids: &[Uuid],
        reset_at: DateTime<Utc>,
    ) -> Vec<(Uuid, Result<(), StoreError>)> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push((*id, self.reset_daily_fields(*id, reset_at).await));
        }
        out
    }

    /// A trade that has been closed. An open trade is reported as
    /// [`StoreError::Conflict`].
    async fn get_closed_trade(&self, id: Uuid) -> Result<Trade, StoreError>;

    async fn create_challenge(
        &self,
        new: &NewChallenge,
        now: DateTime<Utc>,
    ) -> Result<Challenge, StoreError>;

    async fn insert_trade(&self, new: &NewTrade, now: DateTime<Utc>) -> Result<Trade, StoreError>;

    /// Close an open trade and apply its P&L to the owning challenge's
    /// balance, total P&L and daily P&L as one atomic step.
    async fn settle_trade(&self, settlement: &TradeSettlement) -> Result<Trade, StoreError>;

    async fn list_trades(&self, challenge_id: Uuid) -> Result<Vec<Trade>, StoreError>;
}

/// UTC midnight of the day containing `now`.
pub fn start_of_day_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
