//! Scenario: Scheduler start, ticks and stop
//!
//! # Invariants under test
//!
//! - Start runs one batch evaluation and one heartbeat immediately.
//! - A second start while running is a no-op returning `false`.
//! - The batch repeats every evaluation interval; the heartbeat keeps its
//!   own cadence.
//! - The daily reset fires within a day, and exactly once per day after.
//! - Stop halts all ticks; a stopped scheduler can be started again.
//! - While stop is draining an in-flight batch the scheduler reports
//!   `stopping`, refuses to start, and never runs two batch loops at once.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pfc_runtime::{Evaluator, Scheduler, SchedulerSettings};
use pfc_schemas::{
    Challenge, ChallengeStatus, FailureReason, NewChallenge, NewTrade, StatusKind, Trade,
    TradeSettlement,
};
use pfc_store::{ChallengeRepository, InMemoryStore, StatusUpdate, StoreError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn settings() -> SchedulerSettings {
    SchedulerSettings {
        evaluation_interval: Duration::from_secs(300),
        heartbeat_interval: Duration::from_secs(1800),
        daily_reset_hour_utc: 0,
    }
}

#[tokio::test(start_paused = true)]
async fn start_runs_initial_batch_and_heartbeat() {
    let store = Arc::new(InMemoryStore::new());
    let breaching = support::challenge(dec!(-600), Decimal::ZERO);
    store.seed_challenge(breaching.clone()).await;

    let scheduler = Scheduler::new(Arc::new(support::evaluator(Arc::clone(&store))), settings());
    assert!(!scheduler.status().await.running);

    assert!(scheduler.start().await);
    assert!(!scheduler.start().await);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let st = scheduler.status().await;
    assert!(st.running);
    assert!(st.started_at.is_some());
    assert_eq!(st.batches_run, 1);
    assert_eq!(st.heartbeats, 1);

    assert_eq!(
        store.get_challenge(breaching.id).await.unwrap().status,
        ChallengeStatus::Failed(FailureReason::TotalLossLimitExceeded)
    );

    // Two more evaluation intervals, still inside the first heartbeat period.
    tokio::time::sleep(Duration::from_secs(600)).await;
    let st = scheduler.status().await;
    assert_eq!(st.batches_run, 3);
    assert_eq!(st.heartbeats, 1);

    assert!(scheduler.stop().await);
    assert!(!scheduler.stop().await);
}

#[tokio::test(start_paused = true)]
async fn daily_reset_fires_within_a_day() {
    let store = Arc::new(InMemoryStore::new());
    let ch = support::challenge(dec!(-100), dec!(-100));
    store.seed_challenge(ch.clone()).await;

    let scheduler = Scheduler::new(Arc::new(support::evaluator(Arc::clone(&store))), settings());
    scheduler.start().await;

    tokio::time::sleep(Duration::from_secs(24 * 60 * 60 + 1)).await;
    let st = scheduler.status().await;
    assert!(st.resets_run >= 1);
    assert_eq!(
        store.get_challenge(ch.id).await.unwrap().daily_pnl,
        Decimal::ZERO
    );

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_halts_ticks_and_restart_works() {
    let store = Arc::new(InMemoryStore::new());
    let scheduler = Scheduler::new(Arc::new(support::evaluator(store)), settings());

    scheduler.start().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(scheduler.stop().await);

    let stopped = scheduler.status().await;
    assert!(!stopped.running);
    assert!(stopped.started_at.is_none());

    tokio::time::sleep(Duration::from_secs(3600)).await;
    let later = scheduler.status().await;
    assert_eq!(later.batches_run, stopped.batches_run);
    assert_eq!(later.heartbeats, stopped.heartbeats);

    assert!(scheduler.start().await);
    tokio::time::sleep(Duration::from_secs(1)).await;
    let restarted = scheduler.status().await;
    assert!(restarted.running);
    assert_eq!(restarted.batches_run, stopped.batches_run + 1);
    assert_eq!(restarted.heartbeats, stopped.heartbeats + 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn resets_once_per_day() {
    let store = Arc::new(InMemoryStore::new());
    let scheduler = Scheduler::new(Arc::new(support::evaluator(store)), settings());
    scheduler.start().await;

    // The first reset is due within 24h, then one every 24h.
    tokio::time::sleep(Duration::from_secs(3 * 24 * 60 * 60)).await;
    assert_eq!(scheduler.status().await.resets_run, 3);

    scheduler.stop().await;
}

/// Holds every `list_challenges` call for `delay` and records how many were
/// in flight at once.
struct SlowListing {
    inner: Arc<InMemoryStore>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait::async_trait]
impl ChallengeRepository for SlowListing {
    fn backend_name(&self) -> &'static str {
        "slow-listing"
    }

    async fn get_challenge(&self, id: Uuid) -> Result<Challenge, StoreError> {
        self.inner.get_challenge(id).await
    }

    async fn compare_and_update_status(
        &self,
        id: Uuid,
        expected: StatusKind,
        update: &StatusUpdate,
    ) -> Result<bool, StoreError> {
        self.inner
            .compare_and_update_status(id, expected, update)
            .await
    }

    async fn list_challenges(&self, statuses: &[StatusKind]) -> Result<Vec<Challenge>, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let out = self.inner.list_challenges(statuses).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }

    async fn reset_daily_fields(
        &self,
        id: Uuid,
        reset_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.reset_daily_fields(id, reset_at).await
    }

    async fn get_closed_trade(&self, id: Uuid) -> Result<Trade, StoreError> {
        self.inner.get_closed_trade(id).await
    }

    async fn create_challenge(
        &self,
        new: &NewChallenge,
        now: DateTime<Utc>,
    ) -> Result<Challenge, StoreError> {
        self.inner.create_challenge(new, now).await
    }

    async fn insert_trade(&self, new: &NewTrade, now: DateTime<Utc>) -> Result<Trade, StoreError> {
        self.inner.insert_trade(new, now).await
    }

    async fn settle_trade(&self, settlement: &TradeSettlement) -> Result<Trade, StoreError> {
        self.inner.settle_trade(settlement).await
    }

    async fn list_trades(&self, challenge_id: Uuid) -> Result<Vec<Trade>, StoreError> {
        self.inner.list_trades(challenge_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn start_is_refused_while_stop_drains_a_batch() {
    let store = Arc::new(InMemoryStore::new());
    store
        .seed_challenge(support::challenge(dec!(100), Decimal::ZERO))
        .await;
    let slow = Arc::new(SlowListing {
        inner: store,
        delay: Duration::from_secs(60),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let repo: Arc<dyn ChallengeRepository> = slow.clone();
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(Evaluator::new(repo, support::defaults(), 4)),
        settings(),
    ));

    assert!(scheduler.start().await);
    // The initial batch is now parked inside list_challenges.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let stopper = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.stop().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    let draining = scheduler.status().await;
    assert!(draining.running);
    assert!(draining.stopping);
    assert!(!scheduler.start().await);
    assert!(!scheduler.stop().await);

    assert!(stopper.await.unwrap());
    let stopped = scheduler.status().await;
    assert!(!stopped.running);
    assert!(!stopped.stopping);
    assert_eq!(stopped.batches_run, 1);
    assert_eq!(slow.max_in_flight.load(Ordering::SeqCst), 1);

    assert!(scheduler.start().await);
    scheduler.stop().await;
}
