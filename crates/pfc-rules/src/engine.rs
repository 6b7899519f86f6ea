use pfc_schemas::{ChallengeStatus, FailureReason, RuleLimits, SuccessReason};

use crate::Metrics;

/// Derive a challenge's status from its metrics.
///
/// Priority order, first match wins:
/// 1. daily loss  >= max daily loss  -> failed (daily_loss_limit_exceeded)
/// 2. total loss  >= max total loss  -> failed (total_loss_limit_exceeded)
/// 3. profit      >= profit target   -> success (profit_target_reached)
/// 4. otherwise                      -> active
///
/// Loss limits are checked before the profit target, so a snapshot that
/// breaches a loss limit fails even if it also clears the target. All
/// thresholds are inclusive.
pub fn evaluate_rules(metrics: &Metrics, limits: &RuleLimits) -> ChallengeStatus {
    // 1) Daily loss limit.
    if metrics.daily_loss_percentage >= limits.max_daily_loss_percent {
        return ChallengeStatus::Failed(FailureReason::DailyLossLimitExceeded);
    }

    // 2) Total loss limit.
    if metrics.total_loss_percentage >= limits.max_total_loss_percent {
        return ChallengeStatus::Failed(FailureReason::TotalLossLimitExceeded);
    }

    // 3) Profit target.
    if metrics.profit_percentage >= limits.profit_target_percent {
        return ChallengeStatus::Success(SuccessReason::ProfitTargetReached);
    }

    ChallengeStatus::Active
}
