//! Postgres-backed [`ChallengeRepository`].
//!
//! Every call runs under `query_timeout`; an expired call surfaces as
//! [`StoreError::Timeout`] and any open transaction is rolled back when its
//! future is dropped.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pfc_schemas::{
    Challenge, ChallengeStatus, Direction, NewChallenge, NewTrade, RuleLimits, StatusKind, Trade,
    TradeSettlement,
};
use pfc_store::{start_of_day_utc, ChallengeRepository, Entity, StatusUpdate, StoreError};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const CHALLENGE_COLUMNS: &str = "id, owner_id, initial_capital, current_balance, total_pnl, \
     daily_pnl, status, failure_reason, success_reason, started_at, ended_at, daily_reset_at, \
     profit_target_percent, max_daily_loss_percent, max_total_loss_percent";

const TRADE_COLUMNS: &str = "id, owner_id, challenge_id, symbol, direction, entry_price, \
     exit_price, amount, leverage, pnl, is_open, opened_at, closed_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "store call timed out"
                );
                Err(StoreError::Timeout {
                    op,
                    after: self.query_timeout,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error + row mapping
// ---------------------------------------------------------------------------

fn backend(op: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::Backend(format!("{op} failed: {e}"))
}

fn decode(e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("row decode failed: {e}"))
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

fn challenge_from_row(row: &PgRow) -> Result<Challenge, StoreError> {
    let status: String = row.try_get("status").map_err(decode)?;
    let failure_reason: Option<String> = row.try_get("failure_reason").map_err(decode)?;
    let success_reason: Option<String> = row.try_get("success_reason").map_err(decode)?;
    let status = ChallengeStatus::from_columns(
        &status,
        failure_reason.as_deref(),
        success_reason.as_deref(),
    )
    .map_err(|e| StoreError::Backend(format!("row decode failed: {e}")))?;

    Ok(Challenge {
        id: row.try_get("id").map_err(decode)?,
        owner_id: row.try_get("owner_id").map_err(decode)?,
        initial_capital: row.try_get("initial_capital").map_err(decode)?,
        current_balance: row.try_get("current_balance").map_err(decode)?,
        total_pnl: row.try_get("total_pnl").map_err(decode)?,
        daily_pnl: row.try_get("daily_pnl").map_err(decode)?,
        status,
        started_at: row.try_get("started_at").map_err(decode)?,
        ended_at: row.try_get("ended_at").map_err(decode)?,
        daily_reset_at: row.try_get("daily_reset_at").map_err(decode)?,
        limits: RuleLimits {
            profit_target_percent: row.try_get("profit_target_percent").map_err(decode)?,
            max_daily_loss_percent: row.try_get("max_daily_loss_percent").map_err(decode)?,
            max_total_loss_percent: row.try_get("max_total_loss_percent").map_err(decode)?,
        },
    })
}

fn trade_from_row(row: &PgRow) -> Result<Trade, StoreError> {
    let direction: String = row.try_get("direction").map_err(decode)?;
    let direction = Direction::parse(&direction)
        .map_err(|e| StoreError::Backend(format!("row decode failed: {e}")))?;

    Ok(Trade {
        id: row.try_get("id").map_err(decode)?,
        owner_id: row.try_get("owner_id").map_err(decode)?,
        challenge_id: row.try_get("challenge_id").map_err(decode)?,
        symbol: row.try_get("symbol").map_err(decode)?,
        direction,
        entry_price: row.try_get("entry_price").map_err(decode)?,
        exit_price: row.try_get("exit_price").map_err(decode)?,
        amount: row.try_get("amount").map_err(decode)?,
        leverage: row.try_get("leverage").map_err(decode)?,
        pnl: row.try_get("pnl").map_err(decode)?,
        is_open: row.try_get("is_open").map_err(decode)?,
        opened_at: row.try_get("opened_at").map_err(decode)?,
        closed_at: row.try_get("closed_at").map_err(decode)?,
    })
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

async fn fetch_challenge(pool: &PgPool, id: Uuid) -> Result<Challenge, StoreError> {
    let sql = format!("select {CHALLENGE_COLUMNS} from challenges where id = $1");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(backend("get_challenge"))?
        .ok_or_else(|| challenge_not_found(id))?;
    challenge_from_row(&row)
}

async fn challenge_exists(pool: &PgPool, op: &'static str, id: Uuid) -> Result<bool, StoreError> {
    let (exists,): (bool,) =
        sqlx::query_as::<_, (bool,)>("select exists (select 1 from challenges where id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(backend(op))?;
    Ok(exists)
}

async fn cas_status(
    pool: &PgPool,
    id: Uuid,
    expected: StatusKind,
    update: &StatusUpdate,
) -> Result<bool, StoreError> {
    const OP: &str = "compare_and_update_status";

    let res = sqlx::query(
        r#"
        update challenges
        set status = $3,
            failure_reason = $4,
            success_reason = $5,
            ended_at = $6
        where id = $1
          and status = $2
        "#,
    )
    .bind(id)
    .bind(expected.as_str())
    .bind(update.status.kind().as_str())
    .bind(update.status.failure_reason().map(|r| r.as_str()))
    .bind(update.status.success_reason().map(|r| r.as_str()))
    .bind(update.ended_at)
    .execute(pool)
    .await
    .map_err(backend(OP))?;

    if res.rows_affected() == 1 {
        return Ok(true);
    }

    // Zero rows: either the status moved on or the id is unknown.
    if challenge_exists(pool, OP, id).await? {
        Ok(false)
    } else {
        Err(challenge_not_found(id))
    }
}

async fn fetch_by_status(
    pool: &PgPool,
    statuses: &[StatusKind],
) -> Result<Vec<Challenge>, StoreError> {
    let wanted: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    let sql = format!(
        "select {CHALLENGE_COLUMNS} from challenges where status = any($1) order by started_at, id"
    );
    let rows = sqlx::query(&sql)
        .bind(wanted)
        .fetch_all(pool)
        .await
        .map_err(backend("list_challenges"))?;
    rows.iter().map(challenge_from_row).collect()
}

async fn reset_daily(pool: &PgPool, id: Uuid, reset_at: DateTime<Utc>) -> Result<(), StoreError> {
    let res = sqlx::query(
        r#"
        update challenges
        set daily_pnl = 0,
            daily_reset_at = $2
        where id = $1
        "#,
    )
    .bind(id)
    .bind(reset_at)
    .execute(pool)
    .await
    .map_err(backend("reset_daily_fields"))?;

    if res.rows_affected() == 0 {
        return Err(challenge_not_found(id));
    }
    Ok(())
}

async fn fetch_trade(pool: &PgPool, id: Uuid) -> Result<Trade, StoreError> {
    let sql = format!("select {TRADE_COLUMNS} from trades where id = $1");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(backend("get_closed_trade"))?
        .ok_or_else(|| trade_not_found(id))?;
    trade_from_row(&row)
}

async fn insert_challenge(pool: &PgPool, ch: &Challenge) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        insert into challenges (
          id, owner_id, initial_capital, current_balance, total_pnl, daily_pnl, status,
          started_at, daily_reset_at,
          profit_target_percent, max_daily_loss_percent, max_total_loss_percent
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
        )
        "#,
    )
    .bind(ch.id)
    .bind(ch.owner_id)
    .bind(ch.initial_capital)
    .bind(ch.current_balance)
    .bind(ch.total_pnl)
    .bind(ch.daily_pnl)
    .bind(ch.status.kind().as_str())
    .bind(ch.started_at)
    .bind(ch.daily_reset_at)
    .bind(ch.limits.profit_target_percent)
    .bind(ch.limits.max_daily_loss_percent)
    .bind(ch.limits.max_total_loss_percent)
    .execute(pool)
    .await
    .map_err(backend("create_challenge"))?;
    Ok(())
}

async fn open_trade_tx(pool: &PgPool, trade: &Trade) -> Result<(), StoreError> {
    const OP: &str = "insert_trade";

    let mut tx = pool.begin().await.map_err(backend(OP))?;

    // Lock the owning challenge so a concurrent transition cannot slip in
    // between the status check and the insert.
    let status: Option<(String,)> =
        sqlx::query_as::<_, (String,)>("select status from challenges where id = $1 for share")
            .bind(trade.challenge_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend(OP))?;
    let (status,) = status.ok_or_else(|| challenge_not_found(trade.challenge_id))?;
    let kind = StatusKind::parse(&status)
        .map_err(|e| StoreError::Backend(format!("row decode failed: {e}")))?;
    if kind.is_terminal() {
        return Err(StoreError::Conflict(format!(
            "challenge {} is {kind}",
            trade.challenge_id
        )));
    }

    sqlx::query(
        r#"
        insert into trades (
          id, owner_id, challenge_id, symbol, direction, entry_price, amount, leverage,
          is_open, opened_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, true, $9
        )
        "#,
    )
    .bind(trade.id)
    .bind(trade.owner_id)
    .bind(trade.challenge_id)
    .bind(&trade.symbol)
    .bind(trade.direction.as_str())
    .bind(trade.entry_price)
    .bind(trade.amount)
    .bind(trade.leverage)
    .bind(trade.opened_at)
    .execute(&mut *tx)
    .await
    .map_err(backend(OP))?;

    tx.commit().await.map_err(backend(OP))?;
    Ok(())
}

async fn settle_trade_tx(pool: &PgPool, s: &TradeSettlement) -> Result<Trade, StoreError> {
    const OP: &str = "settle_trade";

    let mut tx = pool.begin().await.map_err(backend(OP))?;

    let sql = format!("select {TRADE_COLUMNS} from trades where id = $1 for update");
    let row = sqlx::query(&sql)
        .bind(s.trade_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend(OP))?
        .ok_or_else(|| trade_not_found(s.trade_id))?;
    let mut trade = trade_from_row(&row)?;
    if !trade.is_open {
        return Err(StoreError::Conflict(format!(
            "trade {} is already closed",
            s.trade_id
        )));
    }

    sqlx::query(
        r#"
        update trades
        set exit_price = $2,
            pnl = $3,
            is_open = false,
            closed_at = $4
        where id = $1
        "#,
    )
    .bind(s.trade_id)
    .bind(s.exit_price)
    .bind(s.pnl)
    .bind(s.closed_at)
    .execute(&mut *tx)
    .await
    .map_err(backend(OP))?;

    let res = sqlx::query(
        r#"
        update challenges
        set current_balance = current_balance + $2,
            total_pnl = total_pnl + $2,
            daily_pnl = daily_pnl + $2
        where id = $1
        "#,
    )
    .bind(trade.challenge_id)
    .bind(s.pnl)
    .execute(&mut *tx)
    .await
    .map_err(backend(OP))?;
    if res.rows_affected() == 0 {
        return Err(challenge_not_found(trade.challenge_id));
    }

    tx.commit().await.map_err(backend(OP))?;

    trade.exit_price = Some(s.exit_price);
    trade.pnl = Some(s.pnl);
    trade.is_open = false;
    trade.closed_at = Some(s.closed_at);
    Ok(trade)
}

async fn fetch_trades(pool: &PgPool, challenge_id: Uuid) -> Result<Vec<Trade>, StoreError> {
    const OP: &str = "list_trades";

    if !challenge_exists(pool, OP, challenge_id).await? {
        return Err(challenge_not_found(challenge_id));
    }

    let sql = format!(
        "select {TRADE_COLUMNS} from trades where challenge_id = $1 order by opened_at, id"
    );
    let rows = sqlx::query(&sql)
        .bind(challenge_id)
        .fetch_all(pool)
        .await
        .map_err(backend(OP))?;
    rows.iter().map(trade_from_row).collect()
}

// ---------------------------------------------------------------------------
// Trait impl
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl ChallengeRepository for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn get_challenge(&self, id: Uuid) -> Result<Challenge, StoreError> {
        self.bounded("get_challenge", fetch_challenge(&self.pool, id))
            .await
    }

    async fn compare_and_update_status(
        &self,
        id: Uuid,
        expected: StatusKind,
        update: &StatusUpdate,
    ) -> Result<bool, StoreError> {
        self.bounded(
            "compare_and_update_status",
            cas_status(&self.pool, id, expected, update),
        )
        .await
    }

    async fn list_challenges(&self, statuses: &[StatusKind]) -> Result<Vec<Challenge>, StoreError> {
        self.bounded("list_challenges", fetch_by_status(&self.pool, statuses))
            .await
    }

    async fn reset_daily_fields(
        &self,
        id: Uuid,
        reset_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.bounded("reset_daily_fields", reset_daily(&self.pool, id, reset_at))
            .await
    }

    async fn get_closed_trade(&self, id: Uuid) -> Result<Trade, StoreError> {
        let trade = self
            .bounded("get_closed_trade", fetch_trade(&self.pool, id))
            .await?;
        if trade.is_open {
            return Err(StoreError::Conflict(format!("trade {id} is still open")));
        }
        Ok(trade)
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

        self.bounded("create_challenge", insert_challenge(&self.pool, &challenge))
            .await?;
        Ok(challenge)
    }

    async fn insert_trade(&self, new: &NewTrade, now: DateTime<Utc>) -> Result<Trade, StoreError> {
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

        self.bounded("insert_trade", open_trade_tx(&self.pool, &trade))
            .await?;
        Ok(trade)
    }

    async fn settle_trade(&self, settlement: &TradeSettlement) -> Result<Trade, StoreError> {
        self.bounded("settle_trade", settle_trade_tx(&self.pool, settlement))
            .await
    }

    async fn list_trades(&self, challenge_id: Uuid) -> Result<Vec<Trade>, StoreError> {
        self.bounded("list_trades", fetch_trades(&self.pool, challenge_id))
            .await
    }
}
