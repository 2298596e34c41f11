//! Metrics for client

#![allow(unexpected_cfgs)]

use std::time::Duration;

use vise::{Buckets, Counter, Histogram, LabeledFamily, Metrics};

/// Client metrics.
#[derive(Debug, Metrics)]
#[metrics(prefix = "client")]
pub(super) struct ClientMetrics {
    #[metrics(buckets = Buckets::LATENCIES, labels = ["method"])]
    pub call: LabeledFamily<&'static str, Histogram<Duration>>,

    /// Contract calls and transactions that were reverted by the node.
    pub reverted: Counter,
}

#[vise::register]
pub(super) static CLIENT_METRICS: vise::Global<ClientMetrics> = vise::Global::new();
