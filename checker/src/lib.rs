#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

//! Reconciliation of ingested bridge events.
//!
//! A pass runs two steps for each event type watched on a chain:
//!
//! 1. The lowest `batch_size + 1` unchecked nonces are counted. A complete range
//!    is marked `CheckedStep1`, otherwise the blocks around every missing nonce
//!    range are fetched again and the recovered events stored. The range is
//!    re-evaluated on the next pass.
//! 2. Every `CheckedStep1` event for which a cross message exists is marked
//!    `CheckedStep2`. The others get a fail reason and are retried on later passes.

use std::time::Duration;

use async_trait::async_trait;
use client::EventSource;
use scheduler::Task;
use storage::{Chain, CheckStatus, EventType, Store};
use watcher::EventFetcher;

mod error;
pub mod metrics;

pub use error::{Error, Result};
pub use metrics::{CheckerMetrics, CHECKER_METRICS};

/// Fail reason recorded on events whose cross message is not stored yet.
pub const CROSS_MESSAGE_NOT_FOUND: &str = "cross message not found";

/// Configuration of a [`Checker`].
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Chain whose events are checked.
    pub chain: Chain,

    /// Lowest block gaps are re-fetched from.
    pub start_height: u64,

    /// Nonces checked on top of the lowest unchecked one in a single pass.
    pub batch_size: u64,

    /// Time between two passes.
    pub poll_interval: Duration,
}

/// Number of nonces in `[start, end]`.
pub fn calculate_expected_count(start: u64, end: u64) -> u64 {
    if start > end {
        0
    } else {
        end - start + 1
    }
}

/// Result of [`Checker::step1`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step1Outcome {
    /// No unchecked events.
    Idle,

    /// Nonces in `[start, end]` are all stored and were marked `CheckedStep1`.
    Complete {
        /// First nonce of the range.
        start: u64,
        /// Last nonce of the range.
        end: u64,
    },

    /// The range had missing nonces that were re-fetched.
    Backfilled {
        /// Number of missing nonce ranges.
        gaps: usize,
        /// Number of events newly stored.
        recovered: u64,
    },
}

/// Result of [`Checker::step2`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Step2Outcome {
    /// Events marked `CheckedStep2`.
    pub passed: u64,

    /// Events left at `CheckedStep1` with a fail reason.
    pub missing: u64,
}

/// Checks the completeness of the events stored for one chain.
pub struct Checker<S, St> {
    fetcher: EventFetcher<S>,
    store: St,
    config: CheckerConfig,
    metrics: &'static CheckerMetrics,
}

impl<S, St> Checker<S, St>
where
    S: EventSource,
    St: Store,
{
    /// Create a new `Checker`.
    ///
    /// # Arguments
    ///
    /// * `fetcher`: Fetcher used to backfill gaps, connected to `config.chain`
    /// * `store`: Bridge storage
    /// * `config`: Checker configuration
    /// * `metrics`: Metrics to report progress to
    pub fn new(
        fetcher: EventFetcher<S>,
        store: St,
        config: CheckerConfig,
        metrics: &'static CheckerMetrics,
    ) -> Self {
        Self {
            fetcher,
            store,
            config,
            metrics,
        }
    }

    /// Runs both steps for both event types watched on the chain.
    pub async fn check(&self) -> Result<()> {
        for event_type in self.config.chain.watched_events() {
            self.step1(event_type).await?;
            self.step2(event_type).await?;
        }

        Ok(())
    }

    /// Completeness check and gap backfill.
    pub async fn step1(&self, event_type: EventType) -> Result<Step1Outcome> {
        let chain = self.config.chain;
        let labels = (chain.as_str(), event_type.as_str());

        let Some(start) = self
            .store
            .min_nonce_by_check_status(chain, event_type, CheckStatus::Unchecked)
            .await?
        else {
            return Ok(Step1Outcome::Idle);
        };

        let max = self
            .store
            .max_nonce_by_check_status(chain, event_type, CheckStatus::Unchecked)
            .await?
            .unwrap_or(start);
        let end = start.saturating_add(self.config.batch_size).min(max);

        let expected = calculate_expected_count(start, end);
        let actual = self
            .store
            .count_by_nonce_range(chain, event_type, start, end)
            .await?;

        if actual == expected {
            let updated = self
                .store
                .update_check_status_by_range(
                    chain,
                    event_type,
                    start,
                    end,
                    CheckStatus::Unchecked,
                    CheckStatus::CheckedStep1,
                )
                .await?;

            self.metrics.checked_step1[&labels].inc_by(updated);
            tracing::info!(
                "{chain} {} nonces {start}..={end} complete, {updated} events checked",
                event_type.as_str()
            );

            return Ok(Step1Outcome::Complete { start, end });
        }

        let gaps = self
            .store
            .find_nonce_gaps(chain, event_type, start, end)
            .await?;

        tracing::warn!(
            "{chain} {} nonces {start}..={end}: {actual} of {expected} stored, {} gaps",
            event_type.as_str(),
            gaps.len()
        );
        self.metrics.gaps_found[&labels].inc_by(gaps.len() as u64);

        let head = self.fetcher.source().block_number().await?;
        let mut recovered = 0;

        for gap in &gaps {
            let from = gap.start_block.max(self.config.start_height);
            let to = gap.end_block.min(head);

            if from > to {
                tracing::warn!(
                    "{chain} {} gap {}..={} has no block range to fetch",
                    event_type.as_str(),
                    gap.start_nonce,
                    gap.end_nonce
                );
                continue;
            }

            let events = self.fetcher.fetch_events(from, to).await?;
            let inserted = self.store.insert_raw_events(chain, &events).await?;

            tracing::info!(
                "{chain} {} gap {}..={} refetched from blocks {from}..={to}, {inserted} events recovered",
                event_type.as_str(),
                gap.start_nonce,
                gap.end_nonce
            );
            recovered += inserted;
        }

        self.metrics.events_backfilled[&labels].inc_by(recovered);

        Ok(Step1Outcome::Backfilled {
            gaps: gaps.len(),
            recovered,
        })
    }

    /// Cross message existence check.
    pub async fn step2(&self, event_type: EventType) -> Result<Step2Outcome> {
        let chain = self.config.chain;
        let labels = (chain.as_str(), event_type.as_str());
        let mut outcome = Step2Outcome::default();

        let Some(start) = self
            .store
            .min_nonce_by_check_status(chain, event_type, CheckStatus::CheckedStep1)
            .await?
        else {
            return Ok(outcome);
        };
        let end = self
            .store
            .max_nonce_by_check_status(chain, event_type, CheckStatus::CheckedStep1)
            .await?
            .unwrap_or(start);

        let events = self
            .store
            .events_by_nonce_range(
                chain,
                event_type,
                start,
                end,
                Some(CheckStatus::CheckedStep1),
            )
            .await?;

        for event in events {
            if self.store.exists_by_message_hash(event.message_hash).await? {
                self.store
                    .update_check_status(chain, event.id, CheckStatus::CheckedStep2)
                    .await?;
                outcome.passed += 1;
            } else {
                self.store
                    .update_check_fail_reason(
                        chain,
                        event.id,
                        CheckStatus::CheckedStep1,
                        CROSS_MESSAGE_NOT_FOUND,
                    )
                    .await?;
                outcome.missing += 1;
            }
        }

        self.metrics.checked_step2[&labels].inc_by(outcome.passed);
        self.metrics.missing_cross_messages[&labels].inc_by(outcome.missing);

        if outcome.missing > 0 {
            tracing::debug!(
                "{chain} {}: {} events still without a cross message",
                event_type.as_str(),
                outcome.missing
            );
        }

        Ok(outcome)
    }
}

#[async_trait]
impl<S, St> Task for Checker<S, St>
where
    S: EventSource + 'static,
    St: Store + 'static,
{
    type Error = Error;

    fn name(&self) -> &'static str {
        match self.config.chain {
            Chain::L1 => "l1_checker",
            Chain::L2 => "l2_checker",
        }
    }

    fn interval(&self) -> Duration {
        self.config.poll_interval
    }

    async fn run(&self) -> Result<()> {
        self.check().await
    }
}
