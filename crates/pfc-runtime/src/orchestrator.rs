//! Evaluation orchestrator.
//!
//! Owns the read-modify-write sequence: one whole-record read, pure metrics
//! and rules, then at most one conditional status write. The store's
//! compare-and-swap is the only synchronization; two callers racing on the
//! same challenge produce exactly one committed transition.

use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use pfc_rules::{evaluate_rules, metrics_for, summarize, ChallengeSummary};
use pfc_schemas::{Challenge, NewChallenge, RuleLimits, StatusKind, TradeSettlement};
use pfc_store::{ChallengeRepository, StatusUpdate, StoreError};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::outcome::{BatchSummary, EvalError, EvaluationResult, ResetSummary};

/// Values stamped onto challenges created without explicit terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeDefaults {
    pub starting_balance: Decimal,
    pub limits: RuleLimits,
}

pub struct Evaluator {
    repo: Arc<dyn ChallengeRepository>,
    defaults: ChallengeDefaults,
    batch_concurrency: usize,
}

impl Evaluator {
    /// `batch_concurrency` is clamped to at least 1.
    pub fn new(
        repo: Arc<dyn ChallengeRepository>,
        defaults: ChallengeDefaults,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            repo,
            defaults,
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    pub fn repository(&self) -> &Arc<dyn ChallengeRepository> {
        &self.repo
    }

    pub fn defaults(&self) -> &ChallengeDefaults {
        &self.defaults
    }

    // -----------------------------------------------------------------------
    // Single-record evaluation
    // -----------------------------------------------------------------------

    /// Re-derive a challenge's status from its current snapshot and commit a
    /// transition if the rules call for one.
    ///
    /// Terminal challenges are returned as stored, before any metric is
    /// computed, and never written. If another caller commits a transition
    /// first, the now-current record is returned with `transitioned == false`.
    pub async fn evaluate(&self, challenge_id: Uuid) -> Result<EvaluationResult, EvalError> {
        let snapshot = self
            .repo
            .get_challenge(challenge_id)
            .await
            .map_err(|e| store_failure("get_challenge", challenge_id, e))?;

        if snapshot.is_terminal() {
            return Ok(observed(&snapshot));
        }

        let metrics = metrics_for(&snapshot)?;
        debug!(
            %challenge_id,
            profit_pct = %metrics.profit_percentage,
            daily_loss_pct = %metrics.daily_loss_percentage,
            total_loss_pct = %metrics.total_loss_percentage,
            "challenge metrics"
        );

        let derived = evaluate_rules(&metrics, &snapshot.limits);
        if derived == snapshot.status {
            return Ok(EvaluationResult {
                challenge_id,
                status: snapshot.status,
                metrics: Some(metrics),
                ended_at: snapshot.ended_at,
                transitioned: false,
            });
        }

        let update = StatusUpdate {
            status: derived,
            ended_at: derived.is_terminal().then(Utc::now),
        };
        let committed = self
            .repo
            .compare_and_update_status(challenge_id, snapshot.status.kind(), &update)
            .await
            .map_err(|e| store_failure("compare_and_update_status", challenge_id, e))?;

        if committed {
            info!(
                %challenge_id,
                status = update.status.kind().as_str(),
                rule = update.status.reason_code().unwrap_or("none"),
                "challenge status transition committed"
            );
            return Ok(EvaluationResult {
                challenge_id,
                status: update.status,
                metrics: Some(metrics),
                ended_at: update.ended_at,
                transitioned: true,
            });
        }

        warn!(
            %challenge_id,
            derived = %update.status,
            "lost status race; returning current record"
        );
        let current = self
            .repo
            .get_challenge(challenge_id)
            .await
            .map_err(|e| store_failure("get_challenge", challenge_id, e))?;
        Ok(observed(&current))
    }

    /// Evaluate the challenge owning a closed trade.
    pub async fn process_trade_completion(
        &self,
        trade_id: Uuid,
    ) -> Result<EvaluationResult, EvalError> {
        let trade = self
            .repo
            .get_closed_trade(trade_id)
            .await
            .map_err(|e| store_failure("get_closed_trade", trade_id, e))?;
        self.evaluate(trade.challenge_id).await
    }

    /// Apply a settlement, then evaluate the owning challenge.
    pub async fn settle_trade(
        &self,
        settlement: &TradeSettlement,
    ) -> Result<EvaluationResult, EvalError> {
        let trade = self
            .repo
            .settle_trade(settlement)
            .await
            .map_err(|e| store_failure("settle_trade", settlement.trade_id, e))?;
        debug!(trade_id = %trade.id, pnl = %settlement.pnl, "trade settled");
        self.evaluate(trade.challenge_id).await
    }

    // -----------------------------------------------------------------------
    // Daily reset
    // -----------------------------------------------------------------------

    /// Zero `daily_pnl` and refresh `daily_reset_at`.
    ///
    /// With an id, resets that challenge whatever its status (an unknown id
    /// is `NotFound`). Without, resets every active challenge. Per-record
    /// failures are collected in the summary rather than raised.
    pub async fn reset_daily_metrics(
        &self,
        challenge_id: Option<Uuid>,
    ) -> Result<ResetSummary, EvalError> {
        let ids: Vec<Uuid> = match challenge_id {
            Some(id) => {
                self.repo
                    .get_challenge(id)
                    .await
                    .map_err(|e| store_failure("get_challenge", id, e))?;
                vec![id]
            }
            None => self
                .repo
                .list_challenges(&[StatusKind::Active])
                .await
                .map_err(|e| listing_failure("list_challenges", e))?
                .into_iter()
                .map(|c| c.id)
                .collect(),
        };

        let reset_at = Utc::now();
        let results = self.repo.reset_daily_fields_bulk(&ids, reset_at).await;

        let mut summary = ResetSummary {
            total_processed: results.len(),
            ..ResetSummary::default()
        };
        for (id, res) in results {
            match res {
                Ok(()) => summary.reset_count += 1,
                Err(e) => {
                    error!(challenge_id = %id, error = %e, "daily reset failed");
                    summary.failed_ids.push(id);
                }
            }
        }

        info!(
            reset_count = summary.reset_count,
            failed = summary.failed_ids.len(),
            total = summary.total_processed,
            "daily metrics reset"
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Batch evaluation
    // -----------------------------------------------------------------------

    /// Evaluate every active challenge with bounded concurrency. One
    /// record's error is counted and never stops the batch.
    pub async fn evaluate_all(&self) -> Result<BatchSummary, EvalError> {
        let active = self
            .repo
            .list_challenges(&[StatusKind::Active])
            .await
            .map_err(|e| listing_failure("list_challenges", e))?;

        let results: Vec<(Uuid, Result<EvaluationResult, EvalError>)> =
            stream::iter(active.into_iter().map(|c| c.id))
                .map(|id| async move { (id, self.evaluate(id).await) })
                .buffer_unordered(self.batch_concurrency)
                .collect()
                .await;

        let mut summary = BatchSummary {
            evaluated: results.len(),
            ..BatchSummary::default()
        };
        for (id, res) in results {
            match res {
                Ok(r) if r.transitioned => match r.status.kind() {
                    StatusKind::Success => summary.successes += 1,
                    StatusKind::Failed => summary.failures += 1,
                    StatusKind::Active => summary.unchanged += 1,
                },
                Ok(_) => summary.unchanged += 1,
                Err(e) => {
                    warn!(challenge_id = %id, error = %e, "batch evaluation error");
                    summary.errors += 1;
                }
            }
        }
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Creation + summary
    // -----------------------------------------------------------------------

    /// Create a challenge with the configured limits. `initial_capital`
    /// falls back to the configured starting balance.
    pub async fn create_challenge(
        &self,
        owner_id: Uuid,
        initial_capital: Option<Decimal>,
    ) -> Result<Challenge, EvalError> {
        let new = NewChallenge {
            owner_id,
            initial_capital: initial_capital.unwrap_or(self.defaults.starting_balance),
            limits: self.defaults.limits,
        };
        let ch = self
            .repo
            .create_challenge(&new, Utc::now())
            .await
            .map_err(|e| store_failure("create_challenge", owner_id, e))?;
        info!(challenge_id = %ch.id, %owner_id, capital = %ch.initial_capital, "challenge created");
        Ok(ch)
    }

    pub async fn challenge_summary(&self, challenge_id: Uuid) -> Result<ChallengeSummary, EvalError> {
        let challenge = self
            .repo
            .get_challenge(challenge_id)
            .await
            .map_err(|e| store_failure("get_challenge", challenge_id, e))?;
        let trades = self
            .repo
            .list_trades(challenge_id)
            .await
            .map_err(|e| store_failure("list_trades", challenge_id, e))?;
        Ok(summarize(&challenge, &trades))
    }
}

/// A stored record returned as-is. Metrics are best effort here: a terminal
/// record is reported even when its figures no longer satisfy the metric
/// preconditions.
fn observed(ch: &Challenge) -> EvaluationResult {
    EvaluationResult {
        challenge_id: ch.id,
        status: ch.status,
        metrics: metrics_for(ch).ok(),
        ended_at: ch.ended_at,
        transitioned: false,
    }
}

fn store_failure(op: &'static str, id: Uuid, e: StoreError) -> EvalError {
    if e.is_transient() {
        error!(op, %id, error = %e, "store call failed");
    }
    EvalError::from(e)
}

fn listing_failure(op: &'static str, e: StoreError) -> EvalError {
    error!(op, error = %e, "store call failed");
    EvalError::from(e)
}
