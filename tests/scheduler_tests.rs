use breatheasy::publisher::LinkStatus;
use breatheasy::scheduler::{self, Cycle, CycleError, SchedulerState, SchedulerStats};
use breatheasy::{CycleReadings, Scheduler};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct AlwaysFails {
    runs: u32,
    stop_after: u32,
    shutdown: Option<watch::Sender<bool>>,
}

impl Cycle for AlwaysFails {
    fn run_once(&mut self) -> Result<CycleReadings, CycleError> {
        self.runs += 1;
        if self.runs >= self.stop_after {
            if let Some(tx) = &self.shutdown {
                let _ = tx.send(true);
            }
        }
        if self.runs % 2 == 0 {
            panic!("cycle {} blew up", self.runs);
        }
        Err(CycleError::Aborted(format!("cycle {} failed", self.runs)))
    }
}

#[test]
fn test_scheduler_keeps_iterating_when_every_cycle_fails() {
    let mut scheduler = Scheduler::new(
        AlwaysFails {
            runs: 0,
            stop_after: u32::MAX,
            shutdown: None,
        },
        Duration::from_millis(1),
    );

    for _ in 0..5 {
        assert!(scheduler.tick().is_empty());
    }

    assert_eq!(scheduler.get_stats().cycles_started, 5);
    assert_eq!(scheduler.get_stats().cycles_failed, 5);
    assert_eq!(scheduler.get_stats().panics, 2);
}

#[tokio::test]
async fn test_run_loop_survives_failures_until_shutdown() {
    let (tx, rx) = watch::channel(false);
    let cycle = AlwaysFails {
        runs: 0,
        stop_after: 6,
        shutdown: Some(tx),
    };
    let scheduler = Scheduler::new(cycle, Duration::from_millis(5));

    let (cycle, stats) = tokio::time::timeout(Duration::from_secs(10), scheduler.run(rx))
        .await
        .expect("scheduler did not stop");

    assert_eq!(cycle.runs, 6);
    assert_eq!(stats.cycles_started, 6);
    assert_eq!(stats.cycles_failed, 6);
    assert_eq!(stats.cycles_completed, 0);
}

#[test]
fn test_tick_moves_to_sleeping() {
    let mut scheduler = Scheduler::new(
        AlwaysFails {
            runs: 0,
            stop_after: u32::MAX,
            shutdown: None,
        },
        Duration::from_secs(30),
    );
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    scheduler.tick();
    assert_eq!(scheduler.state(), SchedulerState::Sleeping);
}

/// Counts link notifications; cycles always succeed with nothing.
#[derive(Debug)]
struct LinkWatcher {
    link_changes: Arc<AtomicU32>,
}

impl Cycle for LinkWatcher {
    fn run_once(&mut self) -> Result<CycleReadings, CycleError> {
        Ok(CycleReadings::new())
    }

    fn on_link_change(&mut self) {
        self.link_changes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_link_change_is_handled_between_ticks() {
    let link = LinkStatus::new();
    let link_changes = Arc::new(AtomicU32::new(0));
    let cycle = LinkWatcher {
        link_changes: Arc::clone(&link_changes),
    };
    let scheduler =
        Scheduler::new(cycle, Duration::from_secs(3600)).with_link_updates(link.subscribe());
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(scheduler.run(rx));

    link.mark_connected();
    let notified = async {
        while link_changes.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), notified)
        .await
        .expect("link change not delivered");

    let _ = tx.send(true);
    let (_, stats) = scheduler::join(task).await.unwrap();
    assert_eq!(stats.cycles_started, 1);
}

async fn explode() -> ((), SchedulerStats) {
    panic!("scheduler task died")
}

#[tokio::test]
async fn test_join_reports_panicked_task() {
    let result = scheduler::join(tokio::spawn(explode())).await;
    assert_eq!(result.unwrap_err(), CycleError::Panicked("scheduler task died".to_string()));
}

#[tokio::test]
async fn test_join_reports_cancelled_task() {
    let task = tokio::spawn(std::future::pending::<((), SchedulerStats)>());
    task.abort();
    assert!(matches!(scheduler::join(task).await, Err(CycleError::Aborted(_))));
}
