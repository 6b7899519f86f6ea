//! `pfc challenge` handlers.

use anyhow::Result;
use pfc_runtime::Evaluator;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{eval_context, print_json, print_result};

pub async fn create(evaluator: &Evaluator, owner_id: Uuid, capital: Option<Decimal>) -> Result<()> {
    let ch = evaluator
        .create_challenge(owner_id, capital)
        .await
        .map_err(eval_context)?;
    println!("challenge_id={}", ch.id);
    println!("owner_id={}", ch.owner_id);
    println!("initial_capital={}", ch.initial_capital);
    println!("profit_target_percent={}", ch.limits.profit_target_percent);
    println!("max_daily_loss_percent={}", ch.limits.max_daily_loss_percent);
    println!("max_total_loss_percent={}", ch.limits.max_total_loss_percent);
    println!("daily_reset_at={}", ch.daily_reset_at.to_rfc3339());
    Ok(())
}

pub async fn evaluate(evaluator: &Evaluator, id: Uuid) -> Result<()> {
    let r = evaluator.evaluate(id).await.map_err(eval_context)?;
    print_result(&r);
    Ok(())
}

pub async fn summary(evaluator: &Evaluator, id: Uuid) -> Result<()> {
    let s = evaluator.challenge_summary(id).await.map_err(eval_context)?;
    print_json(&s)
}

pub async fn reset_daily(evaluator: &Evaluator, id: Option<Uuid>) -> Result<()> {
    let s = evaluator.reset_daily_metrics(id).await.map_err(eval_context)?;
    println!("reset_count={}", s.reset_count);
    println!("total_processed={}", s.total_processed);
    for failed in &s.failed_ids {
        println!("failed_id={failed}");
    }
    Ok(())
}

pub async fn evaluate_all(evaluator: &Evaluator) -> Result<()> {
    let s = evaluator.evaluate_all().await.map_err(eval_context)?;
    println!("evaluated={}", s.evaluated);
    println!("successes={}", s.successes);
    println!("failures={}", s.failures);
    println!("unchanged={}", s.unchanged);
    println!("errors={}", s.errors);
    Ok(())
}
