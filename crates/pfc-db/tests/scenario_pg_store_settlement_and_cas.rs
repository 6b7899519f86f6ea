//! Scenario: Postgres store round trip, settlement and status CAS
//!
//! # Invariants under test
//!
//! - A created challenge reads back with its stamped limits.
//! - Settlement closes the trade and moves balance, total P&L and daily P&L
//!   together; a second settlement is a conflict.
//! - The status CAS writes once; a stale expectation returns `false`.
//! - Unknown ids are `NotFound`.
//!
//! DB-backed test. Skips if PFC_DATABASE_URL is not set.

use std::time::Duration;

use chrono::Utc;
use pfc_db::PgStore;
use pfc_schemas::{
    ChallengeStatus, Direction, FailureReason, NewChallenge, NewTrade, RuleLimits, StatusKind,
    TradeSettlement,
};
use pfc_store::{ChallengeRepository, StatusUpdate, StoreError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn store_or_skip() -> anyhow::Result<Option<PgStore>> {
    let url = match std::env::var(pfc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: PFC_DATABASE_URL not set");
            return Ok(None);
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    pfc_db::migrate(&pool).await?;

    Ok(Some(PgStore::new(pool, Duration::from_secs(5))))
}

fn limits() -> RuleLimits {
    RuleLimits {
        profit_target_percent: dec!(10),
        max_daily_loss_percent: dec!(5),
        max_total_loss_percent: dec!(10),
    }
}

#[tokio::test]
async fn settlement_and_cas_against_postgres() -> anyhow::Result<()> {
    let Some(store) = store_or_skip().await? else {
        return Ok(());
    };

    let owner = Uuid::new_v4();
    let now = Utc::now();
    let ch = store
        .create_challenge(
            &NewChallenge {
                owner_id: owner,
                initial_capital: dec!(5000),
                limits: limits(),
            },
            now,
        )
        .await?;

    let fetched = store.get_challenge(ch.id).await?;
    assert_eq!(fetched.limits, limits());
    assert_eq!(fetched.current_balance, dec!(5000));
    assert_eq!(fetched.status, ChallengeStatus::Active);

    let trade = store
        .insert_trade(
            &NewTrade {
                owner_id: owner,
                challenge_id: ch.id,
                symbol: "BTCUSDT".to_string(),
                direction: Direction::Long,
                entry_price: dec!(60000),
                amount: dec!(1000),
                leverage: Decimal::ONE,
            },
            now,
        )
        .await?;

    let err = store.get_closed_trade(trade.id).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let settlement = TradeSettlement {
        trade_id: trade.id,
        exit_price: dec!(45000),
        pnl: dec!(-250),
        closed_at: now,
    };
    store.settle_trade(&settlement).await?;
    let err = store.settle_trade(&settlement).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let after = store.get_challenge(ch.id).await?;
    assert_eq!(after.current_balance, dec!(4750));
    assert_eq!(after.total_pnl, dec!(-250));
    assert_eq!(after.daily_pnl, dec!(-250));

    let closed = store.get_closed_trade(trade.id).await?;
    assert_eq!(closed.pnl, Some(dec!(-250)));

    let update = StatusUpdate {
        status: ChallengeStatus::Failed(FailureReason::DailyLossLimitExceeded),
        ended_at: Some(now),
    };
    assert!(
        store
            .compare_and_update_status(ch.id, StatusKind::Active, &update)
            .await?
    );
    assert!(
        !store
            .compare_and_update_status(ch.id, StatusKind::Active, &update)
            .await?
    );

    let terminal = store.get_challenge(ch.id).await?;
    assert_eq!(terminal.status, update.status);
    assert!(terminal.ended_at.is_some());

    Ok(())
}

#[tokio::test]
async fn unknown_ids_are_not_found() -> anyhow::Result<()> {
    let Some(store) = store_or_skip().await? else {
        return Ok(());
    };

    let missing = Uuid::new_v4();
    assert!(matches!(
        store.get_challenge(missing).await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.get_closed_trade(missing).await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store
            .compare_and_update_status(
                missing,
                StatusKind::Active,
                &StatusUpdate {
                    status: ChallengeStatus::Active,
                    ended_at: None,
                },
            )
            .await,
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.reset_daily_fields(missing, Utc::now()).await,
        Err(StoreError::NotFound { .. })
    ));

    Ok(())
}
