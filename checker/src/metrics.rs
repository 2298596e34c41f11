//! Metrics for checker

use vise::{Counter, LabeledFamily, Metrics};

const LABELS: [&str; 2] = ["chain", "event_type"];
type Labels = (&'static str, &'static str);

/// Checker metrics, labeled by chain and event type.
#[derive(Debug, Metrics)]
#[metrics(prefix = "checker")]
pub struct CheckerMetrics {
    /// Missing nonce ranges detected.
    #[metrics(labels = LABELS)]
    pub gaps_found: LabeledFamily<Labels, Counter, 2>,

    /// Events recovered by re-fetching gaps.
    #[metrics(labels = LABELS)]
    pub events_backfilled: LabeledFamily<Labels, Counter, 2>,

    /// Events moved to `CheckedStep1`.
    #[metrics(labels = LABELS)]
    pub checked_step1: LabeledFamily<Labels, Counter, 2>,

    /// Events moved to `CheckedStep2`.
    #[metrics(labels = LABELS)]
    pub checked_step2: LabeledFamily<Labels, Counter, 2>,

    /// Events still without a cross message on a step 2 pass.
    #[metrics(labels = LABELS)]
    pub missing_cross_messages: LabeledFamily<Labels, Counter, 2>,
}

/// Registered instance handed to the checkers by the binary.
#[allow(unexpected_cfgs)]
#[vise::register]
pub static CHECKER_METRICS: vise::Global<CheckerMetrics> = vise::Global::new();
