//! pfc-daemon library target.
//!
//! Boot wiring shared by the binary and the integration tests: config
//! loading and the [`Engine`] that owns the evaluator and scheduler.

use std::sync::Arc;

use anyhow::Result;
use pfc_config::{load_layered_yaml, report_unused_keys, EngineConfig, UnusedKeyPolicy};
use pfc_runtime::{ChallengeDefaults, Evaluator, Scheduler, SchedulerSettings};
use pfc_store::ChallengeRepository;
use tracing::{info, warn};

/// Comma-separated list of YAML layer paths, base first.
pub const ENV_CONFIG_PATHS: &str = "PFC_CONFIG";

#[derive(Debug, Clone)]
pub struct BootConfig {
    pub config: EngineConfig,
    pub config_hash: String,
}

/// Load layered config from `paths`. No paths means all defaults. Unknown
/// keys are logged, not fatal.
pub fn load_config(paths: &[&str]) -> Result<BootConfig> {
    let loaded = load_layered_yaml(paths)?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &report.unused_leaf_pointers {
        warn!(key = %key, "unused config key");
    }

    let config = loaded.engine_config()?;
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");
    Ok(BootConfig {
        config,
        config_hash: loaded.config_hash,
    })
}

/// [`load_config`] over the paths named by PFC_CONFIG (if set).
pub fn load_config_from_env() -> Result<BootConfig> {
    let raw = std::env::var(ENV_CONFIG_PATHS).unwrap_or_default();
    let paths: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    load_config(&paths)
}

/// The process's evaluation core: one evaluator, one scheduler.
pub struct Engine {
    pub evaluator: Arc<Evaluator>,
    pub scheduler: Scheduler,
}

impl Engine {
    pub fn new(cfg: &EngineConfig, repo: Arc<dyn ChallengeRepository>) -> Self {
        info!(backend = repo.backend_name(), "building engine");

        let defaults = ChallengeDefaults {
            starting_balance: cfg.rules.starting_balance,
            limits: cfg.rules.limits(),
        };
        let evaluator = Arc::new(Evaluator::new(
            repo,
            defaults,
            cfg.scheduler.batch_concurrency,
        ));

        let scheduler = Scheduler::new(
            Arc::clone(&evaluator),
            SchedulerSettings {
                evaluation_interval: cfg.scheduler.evaluation_interval(),
                heartbeat_interval: cfg.scheduler.heartbeat_interval(),
                daily_reset_hour_utc: cfg.scheduler.daily_reset_hour_utc,
            },
        );

        Self {
            evaluator,
            scheduler,
        }
    }
}
