//! Metrics for tx sender

use vise::{Counter, Metrics};

/// TX Sender metrics
#[derive(Debug, Metrics)]
#[metrics(prefix = "relay_tx_sender")]
pub(super) struct TxSenderMetrics {
    /// Transactions broadcast, retries included.
    pub sent_transactions: Counter,

    /// Broadcasts that were not mined within the retry timeout.
    pub timedout_transactions: Counter,

    /// Transactions given up on after exhausting all retries.
    pub abandoned_transactions: Counter,
}

#[allow(unexpected_cfgs)]
#[vise::register]
pub(super) static TX_SENDER_METRICS: vise::Global<TxSenderMetrics> = vise::Global::new();
