// ============================================
// Bulk User Generation
// ============================================
//
// One logical generation task per deployment. Its status record lives in the
// shared store under {prefix}TASK_GENERATE_USERS; inside this process every
// read-modify-write of that record happens under `ledger`.
//
// Workflow per worker:
// 1. Under the lock: stop unless the run is still ours and RUNNING, then
//    reserve a creation slot (in-flight creations never exceed remainingUsers)
// 2. Outside the lock: synthesise a profile and create it
// 3. Under the lock: decrement remainingUsers (DONE at 0), or mark ERROR
//
// Two processes calling start() at the same moment can both see "not RUNNING"
// and both begin a run; the lock is process-local.

use crate::error::{AppError, Result};
use crate::models::{Profile, TaskState, TaskStatus};
use crate::services::ProfileCreator;
use crate::store::Store;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Key suffix of the status record.
pub const GENERATION_TASK_KEY: &str = "TASK_GENERATE_USERS";

const FIELD_STATUS: &str = "status";
const FIELD_COMPLETED_PERCENT: &str = "completedPercent";
const FIELD_CONCURRENCY: &str = "concurrency";
const FIELD_STARTED_AT: &str = "startedAt";
const FIELD_REMAINING_USERS: &str = "remainingUsers";

const COUNTRIES: [&str; 7] = ["TR", "US", "GB", "CN", "JP", "AU", "NZ"];
const MAX_SYNTHETIC_SCORE: f64 = 100_000.0;

/// In-process bookkeeping for the current run.
#[derive(Debug, Default)]
struct RunLedger {
    /// Bumped by every successful start(); workers of older runs exit
    run_id: u64,
    total: u64,
    in_flight: u64,
}

pub struct BulkGenerationCoordinator {
    store: Arc<dyn Store>,
    creator: Arc<dyn ProfileCreator>,
    status_key: String,
    max_concurrency: u64,
    ledger: Mutex<RunLedger>,
    seq: AtomicU64,
}

impl BulkGenerationCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        creator: Arc<dyn ProfileCreator>,
        key_prefix: &str,
        max_concurrency: u64,
    ) -> Self {
        Self {
            store,
            creator,
            status_key: format!("{}{}", key_prefix, GENERATION_TASK_KEY),
            max_concurrency,
            ledger: Mutex::new(RunLedger::default()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn status_key(&self) -> &str {
        &self.status_key
    }

    /// Begin a run of `users` creations over `concurrency` workers and return
    /// without waiting for it. While a run is RUNNING this is a no-op that
    /// returns the current status; from any other state the record is fully
    /// reinitialised.
    pub async fn start(self: &Arc<Self>, users: u64, concurrency: u64) -> Result<TaskStatus> {
        if users == 0 {
            return Err(AppError::Validation(
                "number of users must be positive".to_string(),
            ));
        }
        if concurrency == 0 || concurrency > self.max_concurrency {
            return Err(AppError::Validation(format!(
                "concurrency must be between 1 and {}, got {}",
                self.max_concurrency, concurrency
            )));
        }

        let mut ledger = self.ledger.lock().await;

        let current = self.read_status().await?;
        if current.status == TaskState::Running {
            info!(
                remaining_users = current.remaining_users,
                concurrency = current.concurrency,
                "Generation already running, start ignored"
            );
            return Ok(current);
        }

        let status = TaskStatus {
            status: TaskState::Running,
            completed_percent: 0.0,
            concurrency,
            started_at: Some(Utc::now().to_rfc3339()),
            remaining_users: users,
        };
        self.write_status(&status).await?;

        ledger.run_id += 1;
        ledger.total = users;
        ledger.in_flight = 0;
        let run_id = ledger.run_id;

        for worker_id in 0..concurrency {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                coordinator.run_worker(run_id, worker_id).await;
            });
        }

        info!(
            run_id = run_id,
            users = users,
            concurrency = concurrency,
            previous = %current.status,
            "Generation started"
        );
        Ok(status)
    }

    /// Mark the task CANCELLED whatever its state. Workers notice on their next
    /// check; creations already in flight finish but are not counted.
    pub async fn stop(&self) -> Result<()> {
        let _ledger = self.ledger.lock().await;
        self.store
            .hash_set(
                &self.status_key,
                &[(FIELD_STATUS, TaskState::Cancelled.to_string())],
            )
            .await?;

        info!("Generation stop requested");
        Ok(())
    }

    /// Persisted status; IDLE when no record exists. Blank or unreadable
    /// fields fall back individually.
    pub async fn status(&self) -> Result<TaskStatus> {
        self.read_status().await
    }

    async fn run_worker(self: Arc<Self>, run_id: u64, worker_id: u64) {
        debug!(run_id = run_id, worker_id = worker_id, "Generation worker started");

        loop {
            let seq = match self.reserve_slot(run_id).await {
                Ok(Some(seq)) => seq,
                Ok(None) => break,
                Err(e) => {
                    error!(run_id = run_id, worker_id = worker_id, error = %e, "Failed to read generation status");
                    self.fail(run_id, false).await;
                    break;
                }
            };

            let profile = synthesize_profile(seq);
            match self.creator.create(profile).await {
                Ok(user_id) => {
                    debug!(run_id = run_id, worker_id = worker_id, user_id = %user_id, "Generated user");
                    if let Err(e) = self.complete_one(run_id).await {
                        error!(run_id = run_id, worker_id = worker_id, error = %e, "Failed to record generated user");
                        self.fail(run_id, false).await;
                        break;
                    }
                }
                Err(e) => {
                    error!(run_id = run_id, worker_id = worker_id, error = %e, "User generation failed");
                    self.fail(run_id, true).await;
                    break;
                }
            }
        }

        debug!(run_id = run_id, worker_id = worker_id, "Generation worker stopped");
    }

    /// Sequence number for the next creation, or `None` when this worker
    /// should exit.
    async fn reserve_slot(&self, run_id: u64) -> Result<Option<u64>> {
        let mut ledger = self.ledger.lock().await;
        if ledger.run_id != run_id {
            return Ok(None);
        }

        let status = self.read_status().await?;
        if status.status != TaskState::Running || ledger.in_flight >= status.remaining_users {
            return Ok(None);
        }

        ledger.in_flight += 1;
        Ok(Some(self.seq.fetch_add(1, Ordering::Relaxed)))
    }

    async fn complete_one(&self, run_id: u64) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        if ledger.run_id != run_id {
            return Ok(());
        }
        ledger.in_flight = ledger.in_flight.saturating_sub(1);

        let status = self.read_status().await?;
        if status.status != TaskState::Running {
            return Ok(());
        }

        let remaining = status.remaining_users.min(ledger.total).saturating_sub(1);
        let completed = completed_percent(ledger.total, remaining);
        let mut fields = vec![
            (FIELD_REMAINING_USERS, remaining.to_string()),
            (FIELD_COMPLETED_PERCENT, format!("{:.2}", completed)),
        ];
        if remaining == 0 {
            fields.push((FIELD_STATUS, TaskState::Done.to_string()));
        }
        self.store.hash_set(&self.status_key, &fields).await?;

        if remaining == 0 {
            info!(run_id = run_id, users = ledger.total, "Generation finished");
        }
        Ok(())
    }

    /// Marks a RUNNING run as ERROR; a run already CANCELLED stays CANCELLED.
    /// `holds_slot` is set when the failing worker still owns a reservation.
    async fn fail(&self, run_id: u64, holds_slot: bool) {
        let mut ledger = self.ledger.lock().await;
        if ledger.run_id != run_id {
            return;
        }
        if holds_slot {
            ledger.in_flight = ledger.in_flight.saturating_sub(1);
        }

        match self.read_status().await {
            Ok(status) if status.status != TaskState::Running => {
                debug!(run_id = run_id, status = %status.status, "Run no longer active, failure not recorded");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(run_id = run_id, error = %e, "Could not read generation status before marking error");
            }
        }

        if let Err(e) = self
            .store
            .hash_set(
                &self.status_key,
                &[(FIELD_STATUS, TaskState::Error.to_string())],
            )
            .await
        {
            warn!(run_id = run_id, error = %e, "Could not persist generation error state");
        }
    }

    async fn read_status(&self) -> Result<TaskStatus> {
        let record = self.store.hash_get_all(&self.status_key).await?;
        if record.is_empty() {
            return Ok(TaskStatus::idle());
        }
        Ok(parse_status(&record))
    }

    async fn write_status(&self, status: &TaskStatus) -> Result<()> {
        let fields = [
            (FIELD_STATUS, status.status.to_string()),
            (
                FIELD_COMPLETED_PERCENT,
                format!("{:.2}", status.completed_percent),
            ),
            (FIELD_CONCURRENCY, status.concurrency.to_string()),
            (
                FIELD_STARTED_AT,
                status.started_at.clone().unwrap_or_default(),
            ),
            (FIELD_REMAINING_USERS, status.remaining_users.to_string()),
        ];
        self.store.hash_set(&self.status_key, &fields).await
    }
}

fn parse_status(record: &HashMap<String, String>) -> TaskStatus {
    let field = |name: &str| {
        record
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    TaskStatus {
        status: field(FIELD_STATUS)
            .and_then(|v| v.parse().ok())
            .unwrap_or(TaskState::Idle),
        completed_percent: field(FIELD_COMPLETED_PERCENT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0),
        concurrency: field(FIELD_CONCURRENCY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        started_at: field(FIELD_STARTED_AT).map(str::to_string),
        remaining_users: field(FIELD_REMAINING_USERS)
            .and_then(|v| v.parse().ok())
            .unwrap_or(TaskStatus::UNKNOWN_REMAINING),
    }
}

fn completed_percent(total: u64, remaining: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let done = total.saturating_sub(remaining) as f64;
    (done * 100.0 / total as f64 * 100.0).round() / 100.0
}

fn synthesize_profile(seq: u64) -> Profile {
    let mut rng = rand::thread_rng();
    let country = COUNTRIES[rng.gen_range(0..COUNTRIES.len())];
    let score = rng.gen_range(0.0..MAX_SYNTHETIC_SCORE);

    Profile::new(
        String::new(),
        format!("user_{}_{}", seq, Uuid::new_v4()),
        country,
        score,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::user::MockProfileCreator;
    use crate::services::{RankingStore, UserService};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    const PREFIX: &str = "LB_";

    /// Creator that blocks until the test hands out permits.
    struct GatedCreator {
        gate: Semaphore,
        created: AtomicU64,
        fails: bool,
    }

    impl GatedCreator {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                created: AtomicU64::new(0),
                fails: false,
            }
        }

        /// Every creation errors once its permit arrives.
        fn failing() -> Self {
            Self {
                fails: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ProfileCreator for GatedCreator {
        async fn create(&self, _profile: Profile) -> Result<String> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            permit.forget();
            if self.fails {
                return Err(AppError::StoreUnavailable("connection reset".to_string()));
            }
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("gated-{}", n))
        }
    }

    fn with_creator(
        creator: Arc<dyn ProfileCreator>,
    ) -> (Arc<MemoryStore>, Arc<BulkGenerationCoordinator>) {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Arc::new(BulkGenerationCoordinator::new(
            store.clone(),
            creator,
            PREFIX,
            16,
        ));
        (store, coordinator)
    }

    fn with_users() -> (Arc<MemoryStore>, Arc<BulkGenerationCoordinator>) {
        let store = Arc::new(MemoryStore::new());
        let ranking = Arc::new(RankingStore::new(store.clone(), PREFIX));
        let users = Arc::new(UserService::new(ranking));
        let coordinator = Arc::new(BulkGenerationCoordinator::new(
            store.clone(),
            users,
            PREFIX,
            16,
        ));
        (store, coordinator)
    }

    async fn wait_for_terminal(coordinator: &BulkGenerationCoordinator) -> TaskStatus {
        for _ in 0..500 {
            let status = coordinator.status().await.unwrap();
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("generation did not reach a terminal state");
    }

    async fn wait_until_idle_workers(coordinator: &BulkGenerationCoordinator) {
        for _ in 0..500 {
            if coordinator.ledger.lock().await.in_flight == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("in-flight creations never drained");
    }

    #[tokio::test]
    async fn test_status_without_record_is_idle() {
        let (_store, coordinator) = with_users();
        assert_eq!(coordinator.status().await.unwrap(), TaskStatus::idle());
    }

    #[tokio::test]
    async fn test_run_creates_exactly_n_users() {
        let (store, coordinator) = with_users();

        let started = coordinator.start(100, 4).await.unwrap();
        assert_eq!(started.status, TaskState::Running);
        assert_eq!(started.concurrency, 4);

        let mut last_remaining = u64::MAX;
        let finished = loop {
            let status = coordinator.status().await.unwrap();
            assert!(status.remaining_users <= last_remaining);
            last_remaining = status.remaining_users;
            if status.status.is_terminal() {
                break status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        assert_eq!(finished.status, TaskState::Done);
        assert_eq!(finished.remaining_users, 0);
        assert_eq!(finished.concurrency, 4);
        assert_eq!(finished.completed_percent, 100.0);
        assert!(finished.started_at.is_some());

        wait_until_idle_workers(&coordinator).await;
        assert_eq!(store.cardinality("LB_GLOBAL").await.unwrap(), 100);
        assert_eq!(coordinator.status().await.unwrap().status, TaskState::Done);
    }

    #[tokio::test]
    async fn test_start_while_running_keeps_counters() {
        let creator = Arc::new(GatedCreator::new());
        let (_store, coordinator) = with_creator(creator.clone());

        coordinator.start(5, 2).await.unwrap();
        let again = coordinator.start(50, 3).await.unwrap();
        assert_eq!(again.status, TaskState::Running);
        assert_eq!(again.remaining_users, 5);
        assert_eq!(again.concurrency, 2);

        creator.gate.add_permits(100);
        let finished = wait_for_terminal(&coordinator).await;
        assert_eq!(finished.status, TaskState::Done);
        wait_until_idle_workers(&coordinator).await;
        assert_eq!(creator.created.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_stop_freezes_remaining_users() {
        let creator = Arc::new(GatedCreator::new());
        let (_store, coordinator) = with_creator(creator.clone());

        coordinator.start(10, 2).await.unwrap();
        // let both workers reserve their first slot
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.stop().await.unwrap();

        creator.gate.add_permits(100);
        wait_until_idle_workers(&coordinator).await;

        let status = coordinator.status().await.unwrap();
        assert_eq!(status.status, TaskState::Cancelled);
        assert_eq!(status.remaining_users, 10);
        assert!(creator.created.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_after_stop_keeps_cancelled() {
        let creator = Arc::new(GatedCreator::failing());
        let (_store, coordinator) = with_creator(creator.clone());

        coordinator.start(10, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        coordinator.stop().await.unwrap();

        creator.gate.add_permits(1);
        wait_until_idle_workers(&coordinator).await;

        let status = coordinator.status().await.unwrap();
        assert_eq!(status.status, TaskState::Cancelled);
        assert_eq!(status.remaining_users, 10);
    }

    #[tokio::test]
    async fn test_stop_when_idle_still_cancels() {
        let (_store, coordinator) = with_users();
        coordinator.stop().await.unwrap();
        assert_eq!(
            coordinator.status().await.unwrap().status,
            TaskState::Cancelled
        );
    }

    #[tokio::test]
    async fn test_creation_failure_marks_error() {
        let mut creator = MockProfileCreator::new();
        creator
            .expect_create()
            .returning(|_| Err(AppError::StoreUnavailable("connection refused".into())));
        let (_store, coordinator) = with_creator(Arc::new(creator));

        coordinator.start(20, 3).await.unwrap();
        let status = wait_for_terminal(&coordinator).await;
        assert_eq!(status.status, TaskState::Error);
        assert_eq!(status.remaining_users, 20);
    }

    #[tokio::test]
    async fn test_mocked_creator_called_once_per_user() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let mut creator = MockProfileCreator::new();
        creator.expect_create().returning(move |profile| {
            assert!(profile.display_name.starts_with("user_"));
            assert!(COUNTRIES.contains(&profile.country.as_str()));
            assert!((0.0..MAX_SYNTHETIC_SCORE).contains(&profile.points));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Uuid::new_v4().to_string())
        });
        let (_store, coordinator) = with_creator(Arc::new(creator));

        coordinator.start(7, 7).await.unwrap();
        assert_eq!(wait_for_terminal(&coordinator).await.status, TaskState::Done);
        wait_until_idle_workers(&coordinator).await;
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_restart_after_terminal_state_resets_record() {
        let (_store, coordinator) = with_users();
        coordinator.stop().await.unwrap();

        let started = coordinator.start(3, 1).await.unwrap();
        assert_eq!(started.status, TaskState::Running);
        assert_eq!(started.remaining_users, 3);
        assert_eq!(started.completed_percent, 0.0);

        let finished = wait_for_terminal(&coordinator).await;
        assert_eq!(finished.status, TaskState::Done);
        assert_eq!(finished.concurrency, 1);
    }

    #[tokio::test]
    async fn test_start_validation() {
        let (_store, coordinator) = with_users();
        for (users, concurrency) in [(0, 1), (1, 0), (1, 17)] {
            assert!(matches!(
                coordinator.start(users, concurrency).await,
                Err(AppError::Validation(_))
            ));
        }
        assert_eq!(coordinator.status().await.unwrap().status, TaskState::Idle);
    }

    #[tokio::test]
    async fn test_blank_fields_default_independently() {
        let (store, coordinator) = with_users();
        store
            .hash_set(
                coordinator.status_key(),
                &[
                    (FIELD_STATUS, "RUNNING".to_string()),
                    (FIELD_CONCURRENCY, "not-a-number".to_string()),
                    (FIELD_COMPLETED_PERCENT, String::new()),
                ],
            )
            .await
            .unwrap();

        let status = coordinator.status().await.unwrap();
        assert_eq!(status.status, TaskState::Running);
        assert_eq!(status.concurrency, 0);
        assert_eq!(status.completed_percent, 0.0);
        assert_eq!(status.started_at, None);
        assert_eq!(status.remaining_users, TaskStatus::UNKNOWN_REMAINING);
    }

    #[tokio::test]
    async fn test_status_fails_only_on_store_outage() {
        let (store, coordinator) = with_users();
        store.set_unavailable(true);
        assert!(matches!(
            coordinator.status().await,
            Err(AppError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_completed_percent_rounding() {
        assert_eq!(completed_percent(3, 2), 33.33);
        assert_eq!(completed_percent(3, 0), 100.0);
        assert_eq!(completed_percent(0, 0), 0.0);
    }
}
