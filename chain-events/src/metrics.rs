//! Metrics for chain events

use vise::{Counter, LabeledFamily, Metrics};

/// Chain events metrics.
#[derive(Debug, Metrics)]
#[metrics(prefix = "chain_events")]
pub(super) struct ChainEventsMetrics {
    /// Number of bridge logs decoded, by event type.
    #[metrics(labels = ["event_type"])]
    pub decoded: LabeledFamily<&'static str, Counter>,

    /// Number of logs at a bridge address with a topic this decoder does not know.
    pub foreign_logs: Counter,

    /// Number of logs that carried a known topic but failed to decode.
    pub malformed_logs: Counter,
}

#[allow(unexpected_cfgs)]
#[vise::register]
pub(super) static CHAIN_EVENTS_METRICS: vise::Global<ChainEventsMetrics> = vise::Global::new();
