//! In-memory challenge store.
//!
//! Holds every record behind one async mutex, so each call observes and
//! mutates a consistent state: compare-and-swap is exact, and a settlement
//! moves balance, total P&L and daily P&L together.
//!
//! Fault injection hooks (`fail_*`) let tests drive the store-error paths of
//! the evaluation core without a database. Faults stay armed until
//! [`InMemoryStore::clear_faults`] is called.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use pfc_schemas::{
    Challenge, ChallengeStatus, NewChallenge, NewTrade, StatusKind, Trade, TradeSettlement,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{start_of_day_utc, ChallengeRepository, Entity, StatusUpdate, StoreError};

#[derive(Default)]
struct Faults {
    reads: HashSet<Uuid>,
    status_writes: HashSet<Uuid>,
    resets: HashSet<Uuid>,
    listing: bool,
}

#[derive(Default)]
struct Inner {
    challenges: HashMap<Uuid, Challenge>,
    trades: HashMap<Uuid, Trade>,
    faults: Faults,
    status_writes_applied: u64,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a challenge record as-is.
    pub async fn seed_challenge(&self, challenge: Challenge) {
        let mut g = self.inner.lock().await;
        g.challenges.insert(challenge.id, challenge);
    }

    /// Insert or replace a trade record as-is.
    pub async fn seed_trade(&self, trade: Trade) {
        let mut g = self.inner.lock().await;
        g.trades.insert(trade.id, trade);
    }

    /// Number of compare-and-swap status writes that were applied.
    pub async fn status_writes_applied(&self) -> u64 {
        self.inner.lock().await.status_writes_applied
    }

    /// Make `get_challenge(id)` fail with a backend error.
    pub async fn fail_reads_for(&self, id: Uuid) {
        self.inner.lock().await.faults.reads.insert(id);
    }

    /// Make `compare_and_update_status(id, ..)` fail with a backend error.
    pub async fn fail_status_writes_for(&self, id: Uuid) {
        self.inner.lock().await.faults.status_writes.insert(id);
    }

    /// Make `reset_daily_fields(id, ..)` fail with a backend error.
    pub async fn fail_resets_for(&self, id: Uuid) {
        self.inner.lock().await.faults.resets.insert(id);
    }

    /// Make `list_challenges` fail with a backend error.
    pub async fn fail_listing(&self) {
        self.inner.lock().await.faults.listing = true;
    }

    pub async fn clear_faults(&self) {
        self.inner.lock().await.faults = Faults::default();
    }
}

fn injected(op: &str, id: Uuid) -> StoreError {
    StoreError::Backend(format!("injected failure: {op} {id}"))
}

fn challenge_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: Entity::Challenge,
        id,
    }
}

fn trade_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: Entity::Trade,
        id,
    }
}

#[async_trait::async_trait]
impl ChallengeRepository for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_challenge(&self, id: Uuid) -> Result<Challenge, StoreError> {
        let g = self.inner.lock().await;
        if g.faults.reads.contains(&id) {
            return Err(injected("get_challenge", id));
        }
        g.challenges.get(&id).cloned().ok_or_else(|| challenge_not_found(id))
    }

    async fn compare_and_update_status(
        &self,
        id: Uuid,
        expected: StatusKind,
        update: &StatusUpdate,
    ) -> Result<bool, StoreError> {
        let mut g = self.inner.lock().await;
        if g.faults.status_writes.contains(&id) {
            return Err(injected("compare_and_update_status", id));
        }

        let ch = g.challenges.get_mut(&id).ok_or_else(|| challenge_not_found(id))?;
        if ch.status.kind() != expected {
            return Ok(false);
        }

        ch.status = update.status;
        ch.ended_at = update.ended_at;
        g.status_writes_applied += 1;
        Ok(true)
    }

    async fn list_challenges(&self, statuses: &[StatusKind]) -> Result<Vec<Challenge>, StoreError> {
        let g = self.inner.lock().await;
        if g.faults.listing {
            return Err(StoreError::Backend(
                "injected failure: list_challenges".to_string(),
            ));
        }

        let mut out: Vec<Challenge> = g
            .challenges
            .values()
            .filter(|c| statuses.contains(&c.status.kind()))
            .cloned()
            .collect();
        out.sort_by_key(|c| (c.started_at, c.id));
        Ok(out)
    }

    async fn reset_daily_fields(
        &self,
        id: Uuid,
        reset_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut g = self.inner.lock().await;
        if g.faults.resets.contains(&id) {
            return Err(injected("reset_daily_fields", id));
        }

        let ch = g.challenges.get_mut(&id).ok_or_else(|| challenge_not_found(id))?;
        ch.daily_pnl = Decimal::ZERO;
        ch.daily_reset_at = reset_at;
        Ok(())
    }

    async fn get_closed_trade(&self, id: Uuid) -> Result<Trade, StoreError> {
        let g = self.inner.lock().await;
        let trade = g.trades.get(&id).ok_or_else(|| trade_not_found(id))?;
        if trade.is_open {
            return Err(StoreError::Conflict(format!("trade {id} is still open")));
        }
        Ok(trade.clone())
    }

    async fn create_challenge(
        &self,
        new: &NewChallenge,
        now: DateTime<Utc>,
    ) -> Result<Challenge, StoreError> {
        if new.initial_capital <= Decimal::ZERO {
            return Err(StoreError::Conflict(format!(
                "initial capital must be positive, got {}",
                new.initial_capital
            )));
        }

        let challenge = Challenge {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            initial_capital: new.initial_capital,
            current_balance: new.initial_capital,
            total_pnl: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            status: ChallengeStatus::Active,
            started_at: now,
            ended_at: None,
            daily_reset_at: start_of_day_utc(now),
            limits: new.limits,
        };

        let mut g = self.inner.lock().await;
        g.challenges.insert(challenge.id, challenge.clone());
        Ok(challenge)
    }

    async fn insert_trade(&self, new: &NewTrade, now: DateTime<Utc>) -> Result<Trade, StoreError> {
        let mut g = self.inner.lock().await;

        let ch = g
            .challenges
            .get(&new.challenge_id)
            .ok_or_else(|| challenge_not_found(new.challenge_id))?;
        if ch.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "challenge {} is {}",
                ch.id, ch.status
            )));
        }

        let trade = Trade {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            challenge_id: new.challenge_id,
            symbol: new.symbol.clone(),
            direction: new.direction,
            entry_price: new.entry_price,
            exit_price: None,
            amount: new.amount,
            leverage: new.leverage,
            pnl: None,
            is_open: true,
            opened_at: now,
            closed_at: None,
        };
        g.trades.insert(trade.id, trade.clone());
        Ok(trade)
    }

    async fn settle_trade(&self, settlement: &TradeSettlement) -> Result<Trade, StoreError> {
        let mut g = self.inner.lock().await;
        let trade_id = settlement.trade_id;

        let challenge_id = {
            let trade = g.trades.get(&trade_id).ok_or_else(|| trade_not_found(trade_id))?;
            if !trade.is_open {
                return Err(StoreError::Conflict(format!(
                    "trade {trade_id} is already closed"
                )));
            }
            trade.challenge_id
        };

        // Check the challenge before touching the trade so a failure leaves
        // both records as they were.
        let ch = g
            .challenges
            .get_mut(&challenge_id)
            .ok_or_else(|| challenge_not_found(challenge_id))?;
        ch.current_balance += settlement.pnl;
        ch.total_pnl += settlement.pnl;
        ch.daily_pnl += settlement.pnl;

        let trade = g.trades.get_mut(&trade_id).ok_or_else(|| trade_not_found(trade_id))?;
        trade.exit_price = Some(settlement.exit_price);
        trade.pnl = Some(settlement.pnl);
        trade.is_open = false;
        trade.closed_at = Some(settlement.closed_at);
        Ok(trade.clone())
    }

    async fn list_trades(&self, challenge_id: Uuid) -> Result<Vec<Trade>, StoreError> {
        let g = self.inner.lock().await;
        if !g.challenges.contains_key(&challenge_id) {
            return Err(challenge_not_found(challenge_id));
        }

        let mut out: Vec<Trade> = g
            .trades
            .values()
            .filter(|t| t.challenge_id == challenge_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| (t.opened_at, t.id));
        Ok(out)
    }
}
