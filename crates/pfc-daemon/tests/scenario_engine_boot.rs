//! Scenario: Engine boots from layered config over the in-memory store
//!
//! # Invariants under test
//!
//! - Config layers reach the engine: new challenges carry the configured
//!   starting balance and limits.
//! - Starting the scheduler runs an initial batch that resolves a
//!   breaching challenge; stopping it reports `running == false`.
//! - Invalid config is rejected at boot, before any engine is built.
//!
//! Pure in-process; no DB required.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use pfc_daemon::{load_config, Engine};
use pfc_schemas::{ChallengeStatus, FailureReason, RuleLimits, TradeSettlement};
use pfc_store::{ChallengeRepository, InMemoryStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

const OVERLAY: &str = r#"
scheduler:
  evaluation_interval_secs: 60
  batch_concurrency: 2
rules:
  starting_balance: 10000
  max_daily_loss_percent: 4
"#;

fn overlay_file(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(body.as_bytes()).unwrap();
    f
}

#[tokio::test(start_paused = true)]
async fn configured_engine_creates_and_resolves_challenges() {
    let file = overlay_file(OVERLAY);
    let boot = load_config(&[file.path().to_str().unwrap()]).unwrap();
    assert_eq!(boot.config.scheduler.evaluation_interval_secs, 60);
    assert_eq!(boot.config_hash.len(), 64);

    let store = Arc::new(InMemoryStore::new());
    let repo: Arc<dyn ChallengeRepository> = Arc::clone(&store) as Arc<dyn ChallengeRepository>;
    let engine = Engine::new(&boot.config, repo);

    let ch = engine
        .evaluator
        .create_challenge(Uuid::new_v4(), None)
        .await
        .unwrap();
    assert_eq!(ch.initial_capital, dec!(10000));
    assert_eq!(
        ch.limits,
        RuleLimits {
            profit_target_percent: dec!(10),
            max_daily_loss_percent: dec!(4),
            max_total_loss_percent: dec!(10),
        }
    );

    // A 4% daily loss under the configured limit, settled out of band.
    let trade = store
        .insert_trade(
            &pfc_schemas::NewTrade {
                owner_id: ch.owner_id,
                challenge_id: ch.id,
                symbol: "BTCUSDT".to_string(),
                direction: pfc_schemas::Direction::Short,
                entry_price: dec!(60000),
                amount: dec!(5000),
                leverage: Decimal::ONE,
            },
            chrono::Utc::now(),
        )
        .await
        .unwrap();
    store
        .settle_trade(&TradeSettlement {
            trade_id: trade.id,
            exit_price: dec!(65000),
            pnl: dec!(-400),
            closed_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    assert!(engine.scheduler.start().await);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        store.get_challenge(ch.id).await.unwrap().status,
        ChallengeStatus::Failed(FailureReason::DailyLossLimitExceeded)
    );

    assert!(engine.scheduler.stop().await);
    assert!(!engine.scheduler.status().await.running);
}

#[test]
fn no_layers_boots_with_defaults() {
    let boot = load_config(&[]).unwrap();
    assert_eq!(boot.config.rules.starting_balance, dec!(5000));
    assert_eq!(boot.config.scheduler.daily_reset_hour_utc, 0);
}

#[test]
fn invalid_config_is_rejected_at_boot() {
    let file = overlay_file("scheduler:\n  daily_reset_hour_utc: 25\n");
    let err = load_config(&[file.path().to_str().unwrap()]).unwrap_err();
    assert!(err.to_string().contains("daily_reset_hour_utc"));
}
