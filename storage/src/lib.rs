#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

//! Bridge storage: raw per-chain event logs and canonical cross messages.
//!
//! The store is the only state shared between the watchers, the checkers and the
//! relayers. Correctness of concurrent writers relies on two properties every
//! implementation provides:
//!
//! * raw event inserts are idempotent on `message_hash`;
//! * cross message upserts only ever update rows still in `Sent`.

use async_trait::async_trait;
use auto_impl::auto_impl;
use ethers::types::{Address, H256};

mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod metrics;
mod pg;
mod types;
mod utils;

pub use error::{Error, Result};
#[cfg(any(test, feature = "testing"))]
pub use memory::InMemoryStore;
pub use pg::{PgStore, MIGRATOR};
pub use types::{
    Chain, CheckStatus, CrossMessage, EventType, Gap, MessageType, ProcessStatus, RawBridgeEvent,
    RelayedMessage, TokenType, TxStatus, TxType,
};

/// Persistence of [`RawBridgeEvent`]s, one table per [`Chain`].
#[async_trait]
#[auto_impl(&, Arc, Box)]
pub trait RawEventStore: Send + Sync {
    /// Inserts events, silently skipping those whose `message_hash` is already stored.
    ///
    /// A soft-deleted row seen again is restored at the block and transaction it
    /// was seen in. Returns the number of newly inserted or restored rows.
    async fn insert_raw_events(&self, chain: Chain, events: &[RawBridgeEvent]) -> Result<u64>;

    /// Soft-deletes the not yet processed events of blocks above `block_number`.
    ///
    /// Deleted rows are invisible to every other query. Returns the number of
    /// deleted rows.
    async fn delete_raw_events_above(&self, chain: Chain, block_number: u64) -> Result<u64>;

    /// Highest block number an event was stored for.
    async fn max_block_number(&self, chain: Chain) -> Result<Option<u64>>;

    /// Lowest nonce of events of `event_type` in `status`.
    async fn min_nonce_by_check_status(
        &self,
        chain: Chain,
        event_type: EventType,
        status: CheckStatus,
    ) -> Result<Option<u64>>;

    /// Highest nonce of events of `event_type` in `status`.
    async fn max_nonce_by_check_status(
        &self,
        chain: Chain,
        event_type: EventType,
        status: CheckStatus,
    ) -> Result<Option<u64>>;

    /// Number of distinct nonces stored within `[start, end]`.
    async fn count_by_nonce_range(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
    ) -> Result<u64>;

    /// Events with a nonce within `[start, end]`, ascending by nonce, optionally
    /// restricted to a check status.
    async fn events_by_nonce_range(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
        status: Option<CheckStatus>,
    ) -> Result<Vec<RawBridgeEvent>>;

    /// Missing contiguous nonce ranges within `[start, end]`.
    async fn find_nonce_gaps(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
    ) -> Result<Vec<Gap>>;

    /// Moves every event with a nonce in `[start, end]` from `from` to `to`.
    ///
    /// Returns the number of updated rows.
    async fn update_check_status_by_range(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
        from: CheckStatus,
        to: CheckStatus,
    ) -> Result<u64>;

    /// Sets the check status of a single event and clears its fail reason.
    async fn update_check_status(&self, chain: Chain, id: i64, status: CheckStatus) -> Result<()>;

    /// Records why a check did not pass.
    async fn update_check_fail_reason(
        &self,
        chain: Chain,
        id: i64,
        status: CheckStatus,
        reason: &str,
    ) -> Result<()>;

    /// Checked events of `event_type` awaiting relay, ascending by nonce.
    ///
    /// Includes `ProcessFailed` events with fewer than `max_attempts` attempts.
    async fn query_unprocessed(
        &self,
        chain: Chain,
        event_type: EventType,
        batch_size: u64,
        max_attempts: u32,
    ) -> Result<Vec<RawBridgeEvent>>;

    /// Sets the process status of an event.
    async fn update_process_status(&self, chain: Chain, id: i64, status: ProcessStatus)
        -> Result<()>;

    /// Marks an event `ProcessFailed`, records the reason and counts the attempt.
    async fn update_process_fail(&self, chain: Chain, id: i64, reason: &str) -> Result<()>;

    /// Operator action: makes a failed event eligible for relay again.
    async fn reset_process_status(&self, chain: Chain, id: i64) -> Result<bool>;
}

/// Persistence of [`CrossMessage`]s.
#[async_trait]
#[auto_impl(&, Arc, Box)]
pub trait CrossMessageStore: Send + Sync {
    /// Inserts messages or updates them in place on the
    /// `(message_hash, tx_type, message_type)` key.
    ///
    /// Only `Sent` rows are updated, a status past `Sent` is never moved back.
    async fn upsert_cross_messages(&self, messages: &[CrossMessage]) -> Result<()>;

    /// Whether any cross message with the given hash exists.
    async fn exists_by_message_hash(&self, message_hash: H256) -> Result<bool>;

    /// Flips the matching `Sent` message to `Consumed`, recording the executing
    /// transaction on the destination side.
    ///
    /// Returns the number of affected rows.
    async fn update_consumed_status(&self, relayed: &RelayedMessage) -> Result<u64>;

    /// Messages sent or received by `address`, newest first, with the total count.
    ///
    /// `page` starts at 1.
    async fn query_by_address(
        &self,
        address: Address,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<CrossMessage>, u64)>;
}

/// The full store used by the bridge components.
pub trait Store: RawEventStore + CrossMessageStore {}

impl<T: RawEventStore + CrossMessageStore> Store for T {}
