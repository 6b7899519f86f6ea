//! Scenario: Settlements drive evaluation end to end
//!
//! # Invariants under test
//!
//! - A challenge created with defaults starts at $5,000 with the default
//!   limits stamped on it.
//! - Settling the sequence [+250, -150, +300, -400, +100, -300] moves the
//!   balance through [5250, 5100, 5400, 5000, 5100, 4800] and the challenge
//!   stays active after every step.
//! - The summary reflects the settled trades and remaining distances.
//! - A further settlement that breaches the daily limit fails the
//!   challenge with `daily_loss_limit_exceeded`, and re-processing the same
//!   trade does not write again.

mod support;

use std::sync::Arc;

use chrono::Utc;
use pfc_schemas::{ChallengeStatus, Direction, FailureReason, NewTrade, TradeSettlement};
use pfc_store::{ChallengeRepository, InMemoryStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn settlement_sequence_then_daily_breach() {
    let store = Arc::new(InMemoryStore::new());
    let eval = support::evaluator(Arc::clone(&store));
    let owner = Uuid::new_v4();

    let ch = eval.create_challenge(owner, None).await.unwrap();
    assert_eq!(ch.initial_capital, dec!(5000));
    assert_eq!(ch.limits, support::limits());

    let deltas = [
        dec!(250),
        dec!(-150),
        dec!(300),
        dec!(-400),
        dec!(100),
        dec!(-300),
    ];
    let balances = [
        dec!(5250),
        dec!(5100),
        dec!(5400),
        dec!(5000),
        dec!(5100),
        dec!(4800),
    ];

    let open = |symbol: &str| NewTrade {
        owner_id: owner,
        challenge_id: ch.id,
        symbol: symbol.to_string(),
        direction: Direction::Long,
        entry_price: dec!(100),
        amount: dec!(1000),
        leverage: Decimal::ONE,
    };

    for (pnl, balance) in deltas.iter().zip(balances.iter()) {
        let trade = store.insert_trade(&open("BTCUSDT"), Utc::now()).await.unwrap();
        let res = eval
            .settle_trade(&TradeSettlement {
                trade_id: trade.id,
                exit_price: dec!(101),
                pnl: *pnl,
                closed_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(res.status, ChallengeStatus::Active, "after pnl {pnl}");
        assert!(!res.transitioned);

        let stored = store.get_challenge(ch.id).await.unwrap();
        assert_eq!(stored.current_balance, *balance);
        assert!(stored.balance_is_consistent());
    }

    let summary = eval.challenge_summary(ch.id).await.unwrap();
    assert_eq!(summary.trade_statistics.total_trades, 6);
    assert_eq!(summary.trade_statistics.winning_trades, 3);
    assert_eq!(summary.trade_statistics.losing_trades, 3);
    assert_eq!(summary.trade_statistics.total_pnl, dec!(-200));
    assert_eq!(summary.remaining.to_profit_target, dec!(700));

    // Daily P&L is now -200; another -50 brings it to -250 (5%).
    let trade = store.insert_trade(&open("ETHUSDT"), Utc::now()).await.unwrap();
    let res = eval
        .settle_trade(&TradeSettlement {
            trade_id: trade.id,
            exit_price: dec!(95),
            pnl: dec!(-50),
            closed_at: Utc::now(),
        })
        .await
        .unwrap();
    assert!(res.transitioned);
    assert_eq!(
        res.status,
        ChallengeStatus::Failed(FailureReason::DailyLossLimitExceeded)
    );

    let again = eval.process_trade_completion(trade.id).await.unwrap();
    assert!(!again.transitioned);
    assert_eq!(again.status, res.status);
    assert_eq!(again.ended_at, res.ended_at);
    assert_eq!(store.status_writes_applied().await, 1);
}
