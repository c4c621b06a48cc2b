use super::*;
use crate::storage::MemoryStore;
use arena_core::{Outcome, Placement, Rating};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::{timeout, Instant};

#[derive(Debug, Clone, Copy)]
enum Script {
    /// Everyone finishes, slot order is rank order
    Finish,
    /// Simulator failure
    Void,
    /// Ranking names a bot the store has never seen
    Ghost,
}

/// Executor that plays back scripted results and records what it was asked.
struct FakeExecutor {
    script: Mutex<VecDeque<Script>>,
    plans: Mutex<Vec<MatchPlan>>,
    delay: Duration,
}

impl FakeExecutor {
    fn new(script: impl IntoIterator<Item = Script>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            plans: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MatchExecutor for FakeExecutor {
    async fn execute(&self, plan: MatchPlan) -> MatchRecord {
        self.plans.lock().unwrap().push(plan.clone());
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Finish);
        tokio::time::sleep(self.delay).await;

        let mut record = MatchRecord::pending(plan.participants.clone());
        match step {
            Script::Void => record.void("scripted simulator failure"),
            Script::Finish | Script::Ghost => {
                record.ranking = plan
                    .participants
                    .iter()
                    .enumerate()
                    .map(|(slot, bot)| Placement {
                        bot: if slot == 0 && matches!(step, Script::Ghost) {
                            "ghost".to_string()
                        } else {
                            bot.clone()
                        },
                        slot,
                        reported_rank: slot as u32 + 1,
                        outcome: Outcome::Finished,
                        last_frame_alive: None,
                        error_log: None,
                    })
                    .collect();
            }
        }
        record
    }
}

fn store_with(names: &[&str]) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for name in names {
        store.register_bot(name, Rating::default(), true).unwrap();
    }
    Arc::new(store)
}

fn options(backoff: Duration, max_matches: Option<u64>) -> WorkerOptions {
    WorkerOptions {
        size: MatchSize::Fixed(2),
        map_sizes: Vec::new(),
        backoff,
        max_matches,
    }
}

fn worker(
    store: &Arc<MemoryStore>,
    executor: FakeExecutor,
    options: WorkerOptions,
) -> Worker<MemoryStore, FakeExecutor> {
    Worker::new(Arc::clone(store), executor, RatingModel::default(), options)
        .with_rng(StdRng::seed_from_u64(7))
}

fn total_played(store: &MemoryStore) -> u64 {
    store.all_bots().unwrap().iter().map(|b| b.matches_played).sum()
}

#[tokio::test]
async fn test_runs_until_match_limit() {
    let store = store_with(&["alice", "bob", "carol"]);
    let mut worker = worker(&store, FakeExecutor::new([]), options(Duration::from_secs(60), Some(3)));
    let (_tx, rx) = watch::channel(false);

    let stats = worker.run(rx).await;

    assert_eq!(stats.recorded, 3);
    assert_eq!(stats.voided, 0);
    assert_eq!(store.match_count().unwrap(), 3);
    assert_eq!(total_played(&store), 6);
}

#[tokio::test]
async fn test_voided_match_reselects_without_backoff() {
    let store = store_with(&["alice", "bob"]);
    let executor = FakeExecutor::new([Script::Void, Script::Finish]);
    let mut worker = worker(&store, executor, options(Duration::from_secs(3600), Some(2)));
    let (_tx, rx) = watch::channel(false);

    // An hour of backoff would blow the timeout
    let stats = timeout(Duration::from_secs(5), worker.run(rx)).await.unwrap();

    assert_eq!(stats.voided, 1);
    assert_eq!(stats.recorded, 1);
    assert_eq!(worker.executor.plans.lock().unwrap().len(), 2);
    // Only the second match counted
    for bot in store.all_bots().unwrap() {
        assert_eq!(bot.matches_played, 1, "{}", bot.name);
    }
}

#[tokio::test]
async fn test_empty_pool_backs_off_until_shutdown() {
    let store = store_with(&["alice"]);
    let mut worker = worker(&store, FakeExecutor::new([]), options(Duration::from_millis(20), None));
    let (tx, rx) = watch::channel(false);

    let (stats, ()) = tokio::join!(worker.run(rx), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.send(true).unwrap();
    });

    assert!(stats.empty_pool_waits >= 2);
    assert_eq!(stats.recorded, 0);
    assert!(worker.executor.plans.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_shutdown_wakes_backoff() {
    let store = store_with(&[]);
    let mut worker = worker(&store, FakeExecutor::new([]), options(Duration::from_secs(3600), None));
    let (tx, rx) = watch::channel(false);

    let started = Instant::now();
    let (stats, ()) = tokio::join!(worker.run(rx), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
    });

    assert_eq!(stats.empty_pool_waits, 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_in_flight_match_finishes_after_shutdown() {
    let store = store_with(&["alice", "bob"]);
    let executor = FakeExecutor::new([]).with_delay(Duration::from_millis(200));
    let mut worker = worker(&store, executor, options(Duration::from_secs(60), None));
    let (tx, rx) = watch::channel(false);

    let (stats, ()) = tokio::join!(worker.run(rx), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
    });

    assert_eq!(stats.recorded, 1);
    assert_eq!(store.match_count().unwrap(), 1);
    assert_eq!(worker.executor.plans.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_already_stopped_runs_nothing() {
    let store = store_with(&["alice", "bob"]);
    let mut worker = worker(&store, FakeExecutor::new([]), options(Duration::from_secs(60), None));
    let (_tx, rx) = watch::channel(true);

    let stats = worker.run(rx).await;
    assert_eq!(stats, WorkerStats::default());
}

#[tokio::test]
async fn test_storage_failure_is_counted_and_retried() {
    let store = store_with(&["alice", "bob"]);
    let executor = FakeExecutor::new([Script::Ghost, Script::Finish]);
    let mut worker = worker(&store, executor, options(Duration::from_millis(10), Some(2)));
    let (_tx, rx) = watch::channel(false);

    let stats = timeout(Duration::from_secs(5), worker.run(rx)).await.unwrap();

    assert_eq!(stats.storage_failures, 1);
    assert_eq!(stats.recorded, 1);
    assert_eq!(total_played(&store), 2);
}

#[tokio::test]
async fn test_map_size_is_drawn_per_match() {
    let store = store_with(&["alice", "bob"]);
    let opts = WorkerOptions {
        map_sizes: vec![32],
        ..options(Duration::from_secs(60), Some(1))
    };
    let mut worker = worker(&store, FakeExecutor::new([]), opts);
    let (_tx, rx) = watch::channel(false);

    worker.run(rx).await;

    let plans = worker.executor.plans.lock().unwrap();
    assert_eq!(plans[0].map_size, Some((32, 32)));
    let mut names = plans[0].participants.clone();
    names.sort();
    assert_eq!(names, ["alice", "bob"]);
}

#[test]
fn test_state_names() {
    assert_eq!(WorkerState::Idle.name(), "idle");
    assert_eq!(WorkerState::ShuttingDown.name(), "shutting_down");
    let plan = MatchPlan {
        participants: vec![],
        map_size: None,
    };
    assert_eq!(WorkerState::Executing(plan).name(), "executing");
}
