//! Metrics for relayers

use vise::{Counter, LabeledFamily, Metrics};

const LABELS: [&str; 2] = ["direction", "payload_type"];
type Labels = (&'static str, &'static str);

/// Relayer metrics.
#[derive(Debug, Metrics)]
#[metrics(prefix = "relayer")]
pub struct RelayerMetrics {
    /// Originating events picked up for relaying.
    #[metrics(labels = LABELS)]
    pub received: LabeledFamily<Labels, Counter, 2>,

    /// Messages delivered, or found already executed, on the destination chain.
    #[metrics(labels = LABELS)]
    pub success: LabeledFamily<Labels, Counter, 2>,

    /// Messages that failed to be delivered.
    #[metrics(labels = LABELS)]
    pub failure: LabeledFamily<Labels, Counter, 2>,

    /// Messages found already executed on the destination chain.
    #[metrics(labels = ["direction"])]
    pub already_executed: LabeledFamily<&'static str, Counter>,

    /// Cross messages marked consumed.
    #[metrics(labels = ["direction"])]
    pub consumed: LabeledFamily<&'static str, Counter>,

    /// Confirmations with no matching sent cross message yet.
    #[metrics(labels = ["direction"])]
    pub unmatched_confirmations: LabeledFamily<&'static str, Counter>,
}

/// Registered instance handed to the relayers by the binary.
#[allow(unexpected_cfgs)]
#[vise::register]
pub static RELAYER_METRICS: vise::Global<RelayerMetrics> = vise::Global::new();
