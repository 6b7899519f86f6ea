//! Fixtures shared by the runtime scenario tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pfc_runtime::{ChallengeDefaults, Evaluator};
use pfc_schemas::{Challenge, ChallengeStatus, RuleLimits};
use pfc_store::{ChallengeRepository, InMemoryStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

pub fn limits() -> RuleLimits {
    RuleLimits {
        profit_target_percent: dec!(10),
        max_daily_loss_percent: dec!(5),
        max_total_loss_percent: dec!(10),
    }
}

pub fn defaults() -> ChallengeDefaults {
    ChallengeDefaults {
        starting_balance: dec!(5000),
        limits: limits(),
    }
}

/// A $5,000 challenge whose balance and P&L fields agree.
pub fn challenge(total_pnl: Decimal, daily_pnl: Decimal) -> Challenge {
    let now = Utc::now();
    Challenge {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        initial_capital: dec!(5000),
        current_balance: dec!(5000) + total_pnl,
        total_pnl,
        daily_pnl,
        status: ChallengeStatus::Active,
        started_at: now,
        ended_at: None,
        daily_reset_at: now,
        limits: limits(),
    }
}

pub fn terminal(mut ch: Challenge, status: ChallengeStatus, ended_at: DateTime<Utc>) -> Challenge {
    ch.status = status;
    ch.ended_at = Some(ended_at);
    ch
}

pub fn evaluator(store: Arc<InMemoryStore>) -> Evaluator {
    let repo: Arc<dyn ChallengeRepository> = store;
    Evaluator::new(repo, defaults(), 4)
}
