//! `pfc trade` handlers.

use anyhow::Result;
use chrono::Utc;
use pfc_runtime::{EvalError, Evaluator};
use pfc_schemas::{Direction, NewTrade, TradeSettlement};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{eval_context, print_result};

pub struct OpenArgs {
    pub challenge_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub amount: Decimal,
    pub leverage: Decimal,
}

pub async fn open(evaluator: &Evaluator, args: OpenArgs) -> Result<()> {
    let repo = evaluator.repository();
    let challenge = repo
        .get_challenge(args.challenge_id)
        .await
        .map_err(|e| eval_context(EvalError::from(e)))?;

    let trade = repo
        .insert_trade(
            &NewTrade {
                owner_id: challenge.owner_id,
                challenge_id: challenge.id,
                symbol: args.symbol,
                direction: args.direction,
                entry_price: args.entry_price,
                amount: args.amount,
                leverage: args.leverage,
            },
            Utc::now(),
        )
        .await
        .map_err(|e| eval_context(EvalError::from(e)))?;

    println!("trade_id={}", trade.id);
    println!("challenge_id={}", trade.challenge_id);
    println!("direction={}", trade.direction.as_str());
    println!("opened_at={}", trade.opened_at.to_rfc3339());
    Ok(())
}

pub async fn settle(
    evaluator: &Evaluator,
    trade_id: Uuid,
    exit_price: Decimal,
    pnl: Decimal,
) -> Result<()> {
    let r = evaluator
        .settle_trade(&TradeSettlement {
            trade_id,
            exit_price,
            pnl,
            closed_at: Utc::now(),
        })
        .await
        .map_err(eval_context)?;
    println!("trade_id={trade_id}");
    print_result(&r);
    Ok(())
}

pub async fn complete(evaluator: &Evaluator, trade_id: Uuid) -> Result<()> {
    let r = evaluator
        .process_trade_completion(trade_id)
        .await
        .map_err(eval_context)?;
    println!("trade_id={trade_id}");
    print_result(&r);
    Ok(())
}
