use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};

use purgekeeper::purge::{
    CachePurger, DebounceScheduler, DiagnosticLog, JobQueue, MemoryObjectCache, MemoryStore,
    PurgeError, PurgeOrchestrator, PurgeTrigger, PurgerKind, ScheduleOutcome, TokioJobQueue,
};

/// Edge purger that records the instant of every purge.
struct TimedPurger {
    name: &'static str,
    fired_at: Mutex<Vec<Instant>>,
}

impl TimedPurger {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fired_at: Mutex::new(Vec::new()),
        })
    }

    fn runs(&self) -> Vec<Instant> {
        self.fired_at.lock().expect("fired_at lock").clone()
    }
}

#[async_trait]
impl CachePurger for TimedPurger {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> PurgerKind {
        PurgerKind::EdgeCache
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn purge_all(&self) -> Result<(), PurgeError> {
        self.fired_at
            .lock()
            .expect("fired_at lock")
            .push(Instant::now());
        Ok(())
    }
}

struct Scenario {
    trigger: PurgeTrigger,
    edge: Arc<TimedPurger>,
    jobs: Arc<TokioJobQueue>,
    log: DiagnosticLog,
}

fn scenario(window: Duration) -> Scenario {
    let edge = TimedPurger::new("edge");
    let log = DiagnosticLog::capturing();
    let jobs = Arc::new(TokioJobQueue::new());
    let orchestrator = Arc::new(PurgeOrchestrator::new(
        Arc::new(MemoryObjectCache::new()),
        vec![edge.clone() as Arc<dyn CachePurger>],
        log.clone(),
    ));
    let scheduler = DebounceScheduler::new(
        Arc::new(MemoryStore::new()),
        jobs.clone() as Arc<dyn JobQueue>,
        orchestrator.clone(),
        window,
    );
    Scenario {
        trigger: PurgeTrigger::new(orchestrator, scheduler),
        edge,
        jobs,
        log,
    }
}

#[tokio::test(start_paused = true)]
async fn spaced_requests_coalesce_into_one_purge() {
    let window = Duration::from_secs(10);
    let gap = Duration::from_secs(4);
    let s = scenario(window);
    let start = Instant::now();

    for _ in 0..4 {
        s.trigger.request_purge("meta-updated");
        sleep(gap).await;
    }

    // Last request went in at start + 3 * gap.
    let earliest = start + gap * 3 + window;
    sleep(window).await;

    let runs = s.edge.runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0] >= earliest);
    assert_eq!(s.jobs.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn rearm_moves_the_fire_time() {
    let window = Duration::from_secs(10);
    let s = scenario(window);
    let start = Instant::now();

    assert_eq!(s.trigger.request_purge("meta-updated"), ScheduleOutcome::Scheduled);
    sleep(Duration::from_secs(6)).await;
    assert_eq!(s.trigger.request_purge("meta-updated"), ScheduleOutcome::Rearmed);

    // Past the first expiry, before the re-armed one.
    sleep(Duration::from_secs(6)).await;
    assert!(s.edge.runs().is_empty());
    assert!(s.trigger.scheduler().is_armed());

    sleep(Duration::from_secs(5)).await;
    let runs = s.edge.runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0] >= start + Duration::from_secs(16));
    assert!(!s.trigger.scheduler().is_armed());
}

#[tokio::test(start_paused = true)]
async fn burst_within_a_second_purges_once_after_the_last() {
    let window = Duration::from_secs(3);
    let s = scenario(window);

    let mut last = Instant::now();
    for _ in 0..5 {
        s.trigger.request_purge("meta-updated");
        last = Instant::now();
        sleep(Duration::from_millis(200)).await;
    }

    sleep(Duration::from_secs(5)).await;

    let runs = s.edge.runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0] >= last + window);

    let lines = s.log.lines();
    let resets = lines
        .iter()
        .filter(|line| line.contains("resetting timer"))
        .count();
    assert_eq!(resets, 4);
}

#[tokio::test(start_paused = true)]
async fn immediate_purge_during_pending_timer_runs_twice() {
    let window = Duration::from_secs(3);
    let s = scenario(window);

    s.trigger.request_purge("meta-updated");
    sleep(Duration::from_secs(1)).await;
    s.trigger
        .purge_now("theme-switched")
        .await
        .expect("immediate purge succeeds");
    assert_eq!(s.edge.runs().len(), 1);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(s.edge.runs().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn deferred_run_reports_the_latest_trigger() {
    let s = scenario(Duration::from_secs(3));

    s.trigger.request_purge("meta-updated");
    sleep(Duration::from_secs(1)).await;
    s.trigger.request_purge("builder-layout-saved");
    sleep(Duration::from_secs(4)).await;

    assert_eq!(s.edge.runs().len(), 1);
    assert!(
        s.log
            .lines()
            .iter()
            .any(|line| line.contains("purge initiated on builder-layout-saved"))
    );
}
