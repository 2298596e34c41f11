//! Metrics for chain watchers

use vise::{Counter, Gauge, LabeledFamily, Metrics};

/// Watcher metrics, labeled by chain.
#[derive(Debug, Metrics)]
#[metrics(prefix = "watcher")]
pub struct WatcherMetrics {
    /// Height of the last block whose events are stored.
    #[metrics(labels = ["chain"])]
    pub synced_height: LabeledFamily<&'static str, Gauge<u64>>,

    /// Chain reorganizations detected.
    #[metrics(labels = ["chain"])]
    pub reorgs: LabeledFamily<&'static str, Counter>,

    /// Bridge events newly stored.
    #[metrics(labels = ["chain"])]
    pub events_ingested: LabeledFamily<&'static str, Counter>,
}

/// Registered instance handed to the watchers by the binary.
#[allow(unexpected_cfgs)]
#[vise::register]
pub static WATCHER_METRICS: vise::Global<WatcherMetrics> = vise::Global::new();
