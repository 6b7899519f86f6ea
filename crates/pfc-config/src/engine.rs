use std::time::Duration;

use anyhow::{bail, Result};
use pfc_schemas::RuleLimits;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Typed engine configuration. Every section and key is optional in YAML.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub rules: RulesConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub evaluation_interval_secs: u64,
    /// Hour of day (UTC, 0-23) at which daily P&L is reset.
    pub daily_reset_hour_utc: u32,
    pub heartbeat_interval_secs: u64,
    /// Upper bound on challenges evaluated concurrently in one batch.
    pub batch_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: 300,
            daily_reset_hour_utc: 0,
            heartbeat_interval_secs: 1800,
            batch_concurrency: 4,
        }
    }
}

impl SchedulerConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Defaults stamped onto newly created challenges. Existing challenges keep
/// the limits they were created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub starting_balance: Decimal,
    pub profit_target_percent: Decimal,
    pub max_daily_loss_percent: Decimal,
    pub max_total_loss_percent: Decimal,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::from(5000),
            profit_target_percent: Decimal::from(10),
            max_daily_loss_percent: Decimal::from(5),
            max_total_loss_percent: Decimal::from(10),
        }
    }
}

impl RulesConfig {
    pub fn limits(&self) -> RuleLimits {
        RuleLimits {
            profit_target_percent: self.profit_target_percent,
            max_daily_loss_percent: self.max_daily_loss_percent,
            max_total_loss_percent: self.max_total_loss_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub query_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.evaluation_interval_secs == 0 {
            bail!("CONFIG_INVALID scheduler.evaluation_interval_secs must be > 0");
        }
        if s.heartbeat_interval_secs == 0 {
            bail!("CONFIG_INVALID scheduler.heartbeat_interval_secs must be > 0");
        }
        if s.daily_reset_hour_utc > 23 {
            bail!(
                "CONFIG_INVALID scheduler.daily_reset_hour_utc must be 0-23, got {}",
                s.daily_reset_hour_utc
            );
        }
        if s.batch_concurrency == 0 {
            bail!("CONFIG_INVALID scheduler.batch_concurrency must be >= 1");
        }

        let r = &self.rules;
        for (key, value) in [
            ("starting_balance", r.starting_balance),
            ("profit_target_percent", r.profit_target_percent),
            ("max_daily_loss_percent", r.max_daily_loss_percent),
            ("max_total_loss_percent", r.max_total_loss_percent),
        ] {
            if value <= Decimal::ZERO {
                bail!("CONFIG_INVALID rules.{key} must be > 0, got {value}");
            }
        }

        if self.store.query_timeout_ms == 0 {
            bail!("CONFIG_INVALID store.query_timeout_ms must be > 0");
        }
        Ok(())
    }
}
