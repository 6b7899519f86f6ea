//! Command handler modules for pfc-cli.
//!
//! Shared wiring and output helpers live here; command-specific logic lives
//! in the submodules.

pub mod challenge;
pub mod trade;

use std::sync::Arc;

use anyhow::{Context, Result};
use pfc_config::{report_unused_keys, UnusedKeyPolicy};
use pfc_db::PgStore;
use pfc_runtime::{ChallengeDefaults, EvalError, EvaluationResult, Evaluator};
use pfc_store::ChallengeRepository;
use serde::Serialize;
use tracing::warn;

/// Build an evaluator over the Postgres store named by PFC_DATABASE_URL.
pub async fn evaluator_from_env(config_paths: &[String]) -> Result<Evaluator> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = pfc_config::load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &report.unused_leaf_pointers {
        warn!(key = %key, "unused config key");
    }
    let cfg = loaded.engine_config()?;

    let pool = pfc_db::connect_from_env().await?;
    let repo: Arc<dyn ChallengeRepository> =
        Arc::new(PgStore::new(pool, cfg.store.query_timeout()));

    Ok(Evaluator::new(
        repo,
        ChallengeDefaults {
            starting_balance: cfg.rules.starting_balance,
            limits: cfg.rules.limits(),
        },
        cfg.scheduler.batch_concurrency,
    ))
}

/// Attach the HTTP-equivalent status to an evaluation error so operators
/// can tell not-found from bad input from store trouble.
pub fn eval_context(e: EvalError) -> anyhow::Error {
    let status = e.http_status();
    anyhow::Error::new(e).context(format!("request failed (status {status})"))
}

pub fn print_result(r: &EvaluationResult) {
    println!("challenge_id={}", r.challenge_id);
    println!("status={}", r.status.kind());
    println!("rule={}", r.triggered_rule().unwrap_or("none"));
    println!("transitioned={}", r.transitioned);
    println!(
        "ended_at={}",
        r.ended_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "null".to_string())
    );
    match &r.metrics {
        Some(m) => {
            println!("absolute_pnl={}", m.absolute_pnl);
            println!("profit_percentage={}", m.profit_percentage);
            println!("daily_loss_percentage={}", m.daily_loss_percentage);
            println!("total_loss_percentage={}", m.total_loss_percentage);
        }
        None => println!("metrics=unavailable"),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).context("json serialize failed")?;
    println!("{s}");
    Ok(())
}
