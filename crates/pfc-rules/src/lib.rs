//! pfc-rules
//!
//! Challenge rule engine:
//! - Metrics calculator (profit %, daily-loss %, total-loss %)
//! - Rule evaluator with a fixed priority order (daily loss, total loss, profit target)
//! - Challenge summary statistics over a challenge's trades
//!
//! Deterministic, pure logic. No IO, no clock, no store calls.

mod engine;
mod metrics;
mod summary;
mod types;

pub use engine::evaluate_rules;
pub use metrics::{compute_metrics, metrics_for};
pub use summary::{summarize, ChallengeSummary, RemainingDistance, TradeStatistics};
pub use types::*;
