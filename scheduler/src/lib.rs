#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

//! Periodic execution of the bridge components.
//!
//! Every component is a [`Task`] driven by its own timer. A task never runs
//! concurrently with itself: a tick firing while the previous run is still in
//! flight is dropped, not queued, and counted in [`SchedulerMetrics::skipped_ticks`].

use std::{fmt::Display, sync::Arc, time::Duration};

use async_trait::async_trait;
use auto_impl::auto_impl;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

pub mod metrics;

pub use metrics::{SchedulerMetrics, SCHEDULER_METRICS};

/// A unit of periodic work.
#[async_trait]
#[auto_impl(Arc, Box)]
pub trait Task: Send + Sync + 'static {
    /// Error of a single run.
    type Error: Display + Send;

    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Time between two ticks.
    fn interval(&self) -> Duration;

    /// Performs one run.
    async fn run(&self) -> Result<(), Self::Error>;
}

/// A non-blocking single-slot lock.
#[derive(Debug, Clone)]
pub struct SkipIfBusy {
    slot: Arc<Semaphore>,
}

impl Default for SkipIfBusy {
    fn default() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }
}

impl SkipIfBusy {
    /// Create a new free `SkipIfBusy`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot if it is free; the slot is released when the permit drops.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.slot.clone().try_acquire_owned().ok()
    }

    /// Waits until the slot is free.
    pub async fn wait_idle(&self) {
        // The semaphore is never closed.
        let _ = self.slot.acquire().await;
    }
}

/// Drives [`Task`]s until a shared cancellation token fires.
#[derive(Debug, Clone)]
pub struct Scheduler {
    cancel: CancellationToken,
    metrics: &'static SchedulerMetrics,
}

impl Scheduler {
    /// Create a new `Scheduler`.
    ///
    /// # Arguments
    ///
    /// * `cancel`: Token stopping all tasks spawned by this scheduler
    /// * `metrics`: Metrics to report skipped ticks and failed runs to
    pub fn new(cancel: CancellationToken, metrics: &'static SchedulerMetrics) -> Self {
        Self { cancel, metrics }
    }

    /// Starts ticking `task` on its interval, the first tick fires immediately.
    ///
    /// Cancellation is only observed between ticks; the returned handle resolves
    /// once the token is cancelled and the in-flight run, if any, has finished.
    pub fn spawn<T: Task>(&self, task: T) -> JoinHandle<()> {
        tokio::spawn(run_periodically(
            Arc::new(task),
            self.cancel.clone(),
            self.metrics,
        ))
    }
}

async fn run_periodically<T: Task>(
    task: Arc<T>,
    cancel: CancellationToken,
    metrics: &'static SchedulerMetrics,
) {
    let name = task.name();
    let busy = SkipIfBusy::new();
    let mut interval = tokio::time::interval(task.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("starting task {name} every {:?}", task.interval());

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(permit) = busy.try_acquire() else {
            metrics.skipped_ticks[&name].inc();
            tracing::debug!("task {name} is still running, skipping tick");
            continue;
        };

        let task = task.clone();
        tokio::spawn(async move {
            let latency = metrics.run_latency[&name].start();

            if let Err(e) = task.run().await {
                metrics.failed_runs[&name].inc();
                tracing::error!("task {name} failed: {e}");
            }

            latency.observe();
            // Callers awaiting the handle may take the task back once idle.
            drop(task);
            drop(permit);
        });
    }

    busy.wait_idle().await;
    tracing::info!("task {name} stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    struct Sleepy {
        runs: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
        busy_for: Duration,
        fail: bool,
    }

    #[async_trait]
    impl Task for Sleepy {
        type Error = String;

        fn name(&self) -> &'static str {
            "sleepy"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(10)
        }

        async fn run(&self) -> Result<(), String> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.busy_for).await;
            self.finished.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                return Err("boom".to_string());
            }
            Ok(())
        }
    }

    fn sleepy(busy_for: Duration, fail: bool) -> (Sleepy, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        (
            Sleepy {
                runs: runs.clone(),
                finished: finished.clone(),
                busy_for,
                fail,
            },
            runs,
            finished,
        )
    }

    fn metrics() -> &'static SchedulerMetrics {
        Box::leak(Box::default())
    }

    #[test]
    fn skip_if_busy_has_a_single_slot() {
        let busy = SkipIfBusy::new();

        let permit = busy.try_acquire();
        assert!(permit.is_some());
        assert!(busy.try_acquire().is_none());

        drop(permit);
        assert!(busy.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_every_interval() {
        let metrics = metrics();
        let cancel = CancellationToken::new();
        let (task, runs, _) = sleepy(Duration::from_secs(1), false);

        let handle = Scheduler::new(cancel.clone(), metrics).spawn(task);

        // Ticks at 0, 10, 20 and 30.
        tokio::time::sleep(Duration::from_secs(35)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert_eq!(metrics.skipped_ticks[&"sleepy"].get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_during_a_run_are_dropped() {
        let metrics = metrics();
        let cancel = CancellationToken::new();
        let (task, runs, finished) = sleepy(Duration::from_secs(25), false);

        let handle = Scheduler::new(cancel.clone(), metrics).spawn(task);

        // Runs start at 0 and 30, the ticks at 10 and 20 find the first run busy.
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.skipped_ticks[&"sleepy"].get(), 2);

        cancel.cancel();
        handle.await.unwrap();

        // The in-flight run is not interrupted.
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_runs_are_counted_and_do_not_stop_the_task() {
        let metrics = metrics();
        let cancel = CancellationToken::new();
        let (task, runs, _) = sleepy(Duration::from_secs(1), true);

        let handle = Scheduler::new(cancel.clone(), metrics).spawn(task);

        tokio::time::sleep(Duration::from_secs(15)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.failed_runs[&"sleepy"].get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn task_is_released_once_stopped() {
        let metrics = metrics();
        let cancel = CancellationToken::new();
        let (task, _, finished) = sleepy(Duration::from_secs(5), false);
        let task = Arc::new(task);

        let handle = Scheduler::new(cancel.clone(), metrics).spawn(task.clone());

        // Cancelled while the first run is in flight.
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(Arc::try_unwrap(task).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_scheduler_does_not_tick() {
        let metrics = metrics();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (task, runs, _) = sleepy(Duration::from_secs(1), false);

        Scheduler::new(cancel, metrics).spawn(task).await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
