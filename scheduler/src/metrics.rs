//! Metrics for the scheduler

use std::time::Duration;

use vise::{Buckets, Counter, Histogram, LabeledFamily, Metrics};

/// Scheduler metrics, labeled by task name.
#[derive(Debug, Metrics)]
#[metrics(prefix = "scheduler")]
pub struct SchedulerMetrics {
    /// Ticks dropped because the previous run of the task was still in flight.
    #[metrics(labels = ["task"])]
    pub skipped_ticks: LabeledFamily<&'static str, Counter>,

    /// Runs that returned an error.
    #[metrics(labels = ["task"])]
    pub failed_runs: LabeledFamily<&'static str, Counter>,

    /// Duration of task runs.
    #[metrics(buckets = Buckets::LATENCIES, labels = ["task"])]
    pub run_latency: LabeledFamily<&'static str, Histogram<Duration>>,
}

/// Registered instance handed to the [`Scheduler`](crate::Scheduler) by the binary.
#[allow(unexpected_cfgs)]
#[vise::register]
pub static SCHEDULER_METRICS: vise::Global<SchedulerMetrics> = vise::Global::new();
