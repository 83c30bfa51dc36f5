use crate::acquisition::{AcquisitionCycle, CycleReadings};
use crate::publisher::LinkState;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("cycle panicked: {0}")]
    Panicked(String),
    /// Work stopped before finishing: a [`Cycle`] giving up on a pass, or a
    /// scheduler task that was cancelled (see [`join`]).
    #[error("cycle aborted: {0}")]
    Aborted(String),
}

/// One unit of periodic work.
pub trait Cycle {
    fn run_once(&mut self) -> Result<CycleReadings, CycleError>;

    /// Called between cycles when the publishing link goes up or down.
    fn on_link_change(&mut self) {}
}

impl Cycle for AcquisitionCycle {
    fn run_once(&mut self) -> Result<CycleReadings, CycleError> {
        Ok(AcquisitionCycle::run_once(self))
    }

    fn on_link_change(&mut self) {
        self.publisher_mut().sync_connection();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub panics: u64,
    pub readings: u64,
    pub last_cycle_ms: u64,
}

/// Runs a [`Cycle`] on a fixed interval until shutdown.
///
/// Cycles never overlap. A cycle that errors or panics counts as an empty
/// cycle; the loop carries on.
#[derive(Debug)]
pub struct Scheduler<C> {
    cycle: C,
    interval: Duration,
    state: SchedulerState,
    stats: SchedulerStats,
    link: Option<watch::Receiver<LinkState>>,
}

impl<C: Cycle> Scheduler<C> {
    pub fn new(cycle: C, interval: Duration) -> Self {
        debug_assert!(!interval.is_zero(), "Scheduler interval must be non-zero");

        Self {
            cycle,
            interval,
            state: SchedulerState::Idle,
            stats: SchedulerStats::default(),
            link: None,
        }
    }

    /// Let the cycle react to link changes without waiting for its next tick.
    pub fn with_link_updates(mut self, link: watch::Receiver<LinkState>) -> Self {
        self.link = Some(link);
        self
    }

    /// Run one cycle, absorbing any failure.
    pub fn tick(&mut self) -> CycleReadings {
        self.state = SchedulerState::Running;
        self.stats.cycles_started += 1;
        let started = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.cycle.run_once()))
            .unwrap_or_else(|payload| Err(CycleError::Panicked(panic_message(payload.as_ref()))));

        self.stats.last_cycle_ms = started.elapsed().as_millis() as u64;
        self.state = SchedulerState::Sleeping;

        match outcome {
            Ok(readings) => {
                self.stats.cycles_completed += 1;
                self.stats.readings += readings.len() as u64;
                readings
            }
            Err(e) => {
                self.stats.cycles_failed += 1;
                if matches!(e, CycleError::Panicked(_)) {
                    self.stats.panics += 1;
                }
                error!("Acquisition cycle {} failed: {}", self.stats.cycles_started, e);
                CycleReadings::new()
            }
        }
    }

    /// Tick every interval until `shutdown` turns true or its sender is
    /// dropped. The first cycle runs immediately. Returns the cycle so the
    /// caller can shut its collaborators down.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> (C, SchedulerStats) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Scheduler started, interval {:?}", self.interval);
        let mut link = self.link.take();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                }
                changed = link_changed(&mut link) => {
                    if changed {
                        self.handle_link_change();
                    } else {
                        debug!("Link status dropped");
                        link = None;
                    }
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        self.state = SchedulerState::Stopped;
        info!(
            "Scheduler stopped after {} cycles ({} failed)",
            self.stats.cycles_started, self.stats.cycles_failed
        );
        (self.cycle, self.stats)
    }

    fn handle_link_change(&mut self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.cycle.on_link_change()));
        if let Err(payload) = outcome {
            self.stats.panics += 1;
            error!("Link change handling panicked: {}", panic_message(payload.as_ref()));
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn cycle_mut(&mut self) -> &mut C {
        &mut self.cycle
    }
}

/// Wait for a spawned [`Scheduler::run`] to hand its cycle back. A task that
/// panicked or was cancelled cannot, and reports why instead.
pub async fn join<C>(
    task: JoinHandle<(C, SchedulerStats)>,
) -> Result<(C, SchedulerStats), CycleError> {
    task.await.map_err(|e| {
        if e.is_panic() {
            CycleError::Panicked(panic_message(e.into_panic().as_ref()))
        } else {
            CycleError::Aborted(e.to_string())
        }
    })
}

async fn link_changed(link: &mut Option<watch::Receiver<LinkState>>) -> bool {
    match link {
        Some(state) => state.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky {
        calls: u32,
    }

    impl Cycle for Flaky {
        fn run_once(&mut self) -> Result<CycleReadings, CycleError> {
            self.calls += 1;
            match self.calls % 3 {
                0 => panic!("sensor exploded"),
                1 => Err(CycleError::Aborted("store offline".into())),
                _ => Ok(CycleReadings::new()),
            }
        }
    }

    #[test]
    fn test_scheduler_creation() {
        let scheduler = Scheduler::new(Flaky { calls: 0 }, Duration::from_secs(30));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.get_stats().cycles_started, 0);
    }

    #[test]
    fn test_failures_and_panics_are_absorbed() {
        let mut scheduler = Scheduler::new(Flaky { calls: 0 }, Duration::from_millis(1));
        for _ in 0..6 {
            assert!(scheduler.tick().is_empty());
        }

        let stats = scheduler.get_stats();
        assert_eq!(stats.cycles_started, 6);
        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(stats.cycles_failed, 4);
        assert_eq!(stats.panics, 2);
        assert_eq!(scheduler.state(), SchedulerState::Sleeping);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 7");
    }

    #[tokio::test]
    async fn test_run_stops_when_shutdown_already_requested() {
        let (tx, rx) = watch::channel(true);
        let scheduler = Scheduler::new(Flaky { calls: 0 }, Duration::from_secs(30));
        let (cycle, stats) = scheduler.run(rx).await;
        drop(tx);

        assert_eq!(cycle.calls, 0);
        assert_eq!(stats.cycles_started, 0);
    }
}
