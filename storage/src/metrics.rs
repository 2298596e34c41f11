//! Metrics for storage

use std::time::Duration;

use vise::{Buckets, Counter, Histogram, LabeledFamily, Metrics};

/// Storage metrics
#[derive(Debug, Metrics)]
#[metrics(prefix = "storage")]
pub struct StorageMetrics {
    /// Latency of store calls.
    #[metrics(buckets = Buckets::LATENCIES, labels = ["method"])]
    pub call: LabeledFamily<&'static str, Histogram<Duration>>,

    /// Raw events skipped on insertion because their message hash was already stored.
    pub duplicate_raw_events: Counter,
}

/// Registered instance handed to [`crate::PgStore`] by the binary.
#[allow(unexpected_cfgs)]
#[vise::register]
pub static STORAGE_METRICS: vise::Global<StorageMetrics> = vise::Global::new();
