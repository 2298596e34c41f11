//! Postgres implementation of the bridge store.
//!
//! Every statement is checked against the schema at compile time, so each
//! raw event query is spelled out once per chain table.

use async_trait::async_trait;
use ethers::types::{Address, H256};
use sqlx::{migrate::Migrator, types::BigDecimal, PgPool};

use crate::{
    metrics::StorageMetrics,
    utils::{
        address_from_slice, big_decimal_to_u256, h256_from_slice, join_proofs, join_u256,
        nonce_gaps, split_proofs, split_u256, u256_to_big_decimal,
    },
    Chain, CheckStatus, CrossMessage, CrossMessageStore, EventType, Gap, MessageType,
    ProcessStatus, RawBridgeEvent, RawEventStore, RelayedMessage, Result, TokenType, TxStatus,
    TxType,
};

/// Schema migrations for the bridge tables.
pub static MIGRATOR: Migrator = sqlx::migrate!();

struct RawEventRow {
    id: i64,
    chain_id: i64,
    event_type: EventType,
    token_type: TokenType,
    tx_hash: Vec<u8>,
    block_number: i64,
    block_timestamp: i64,
    sender: Vec<u8>,
    receiver: Vec<u8>,
    message_hash: Vec<u8>,
    message_payload_type: i64,
    message_payload: Vec<u8>,
    message_nonce: i64,
    message_from: Vec<u8>,
    message_to: Vec<u8>,
    message_value: BigDecimal,
    check_status: CheckStatus,
    process_status: ProcessStatus,
    process_attempts: i32,
    fail_reason: Option<String>,
}

fn raw_event_from_row(row: RawEventRow) -> Result<RawBridgeEvent> {
    Ok(RawBridgeEvent {
        id: row.id,
        chain_id: row.chain_id as u64,
        event_type: row.event_type,
        token_type: row.token_type,
        tx_hash: h256_from_slice("tx_hash", &row.tx_hash)?,
        block_number: row.block_number as u64,
        block_timestamp: row.block_timestamp as u64,
        sender: address_from_slice("sender", &row.sender)?,
        receiver: address_from_slice("receiver", &row.receiver)?,
        message_hash: h256_from_slice("message_hash", &row.message_hash)?,
        message_payload_type: row.message_payload_type as u32,
        message_payload: row.message_payload.into(),
        message_nonce: row.message_nonce as u64,
        message_from: address_from_slice("message_from", &row.message_from)?,
        message_to: address_from_slice("message_to", &row.message_to)?,
        message_value: big_decimal_to_u256(row.message_value)?,
        check_status: row.check_status,
        process_status: row.process_status,
        process_attempts: row.process_attempts as u32,
        fail_reason: row.fail_reason,
    })
}

struct CrossMessageRow {
    id: i64,
    message_hash: Vec<u8>,
    message_type: MessageType,
    tx_type: TxType,
    tx_status: TxStatus,
    token_type: TokenType,
    sender: Vec<u8>,
    receiver: Vec<u8>,
    l1_token_address: Vec<u8>,
    l2_token_address: Vec<u8>,
    token_ids: String,
    token_amounts: String,
    l1_tx_hash: Option<Vec<u8>>,
    l1_block_number: Option<i64>,
    l2_tx_hash: Option<Vec<u8>>,
    l2_block_number: Option<i64>,
    relay_tx_hash: Option<Vec<u8>>,
    message_from: Vec<u8>,
    message_to: Vec<u8>,
    message_value: BigDecimal,
    message_payload: Vec<u8>,
    message_payload_type: i64,
    message_nonce: i64,
    multi_sign_proof: String,
    block_timestamp: i64,
}

fn opt_h256(column: &str, bytes: Option<Vec<u8>>) -> Result<Option<H256>> {
    bytes.map(|b| h256_from_slice(column, &b)).transpose()
}

fn cross_message_from_row(row: CrossMessageRow) -> Result<CrossMessage> {
    Ok(CrossMessage {
        id: row.id,
        message_hash: h256_from_slice("message_hash", &row.message_hash)?,
        message_type: row.message_type,
        tx_type: row.tx_type,
        tx_status: row.tx_status,
        token_type: row.token_type,
        sender: address_from_slice("sender", &row.sender)?,
        receiver: address_from_slice("receiver", &row.receiver)?,
        l1_token_address: address_from_slice("l1_token_address", &row.l1_token_address)?,
        l2_token_address: address_from_slice("l2_token_address", &row.l2_token_address)?,
        token_ids: split_u256(&row.token_ids)?,
        token_amounts: split_u256(&row.token_amounts)?,
        l1_tx_hash: opt_h256("l1_tx_hash", row.l1_tx_hash)?,
        l1_block_number: row.l1_block_number.map(|n| n as u64),
        l2_tx_hash: opt_h256("l2_tx_hash", row.l2_tx_hash)?,
        l2_block_number: row.l2_block_number.map(|n| n as u64),
        relay_tx_hash: opt_h256("relay_tx_hash", row.relay_tx_hash)?,
        message_from: address_from_slice("message_from", &row.message_from)?,
        message_to: address_from_slice("message_to", &row.message_to)?,
        message_value: big_decimal_to_u256(row.message_value)?,
        message_payload: row.message_payload.into(),
        message_payload_type: row.message_payload_type as u32,
        message_nonce: row.message_nonce as u64,
        multi_sign_proof: split_proofs(&row.multi_sign_proof)?,
        block_timestamp: row.block_timestamp as u64,
    })
}

fn into_events(rows: Vec<RawEventRow>) -> Result<Vec<RawBridgeEvent>> {
    rows.into_iter().map(raw_event_from_row).collect()
}

/// A [`RawEventStore`] and [`CrossMessageStore`] backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    metrics: &'static StorageMetrics,
}

impl PgStore {
    /// Creates a new `PgStore`.
    ///
    /// # Arguments
    ///
    /// * `pool`: Connection pool to the Postgres DB
    /// * `metrics`: Latency histograms to report calls to
    pub fn new(pool: PgPool, metrics: &'static StorageMetrics) -> Self {
        Self { pool, metrics }
    }

    /// Applies pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RawEventStore for PgStore {
    async fn insert_raw_events(&self, chain: Chain, events: &[RawBridgeEvent]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let latency = self.metrics.call[&"insert_raw_events"].start();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        // A conflicting row is only touched when it was soft-deleted, in which
        // case it is brought back at the block it was seen in again.
        for event in events {
            let res = match chain {
                Chain::L1 => {
                    sqlx::query!(
                        "
                        INSERT INTO l1_raw_bridge_events
                        (
                            chain_id, event_type, token_type, tx_hash, block_number,
                            block_timestamp, sender, receiver, message_hash,
                            message_payload_type, message_payload, message_nonce,
                            message_from, message_to, message_value, check_status,
                            process_status, process_attempts, fail_reason
                        )
                        VALUES (
                            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                            $11, $12, $13, $14, $15, $16, $17, $18, $19
                        )
                        ON CONFLICT (message_hash) DO UPDATE SET
                            deleted_at = NULL,
                            tx_hash = EXCLUDED.tx_hash,
                            block_number = EXCLUDED.block_number,
                            block_timestamp = EXCLUDED.block_timestamp,
                            updated_at = NOW()
                        WHERE l1_raw_bridge_events.deleted_at IS NOT NULL
                        ",
                        event.chain_id as i64,
                        event.event_type as EventType,
                        event.token_type as TokenType,
                        event.tx_hash.as_bytes(),
                        event.block_number as i64,
                        event.block_timestamp as i64,
                        event.sender.as_bytes(),
                        event.receiver.as_bytes(),
                        event.message_hash.as_bytes(),
                        event.message_payload_type as i64,
                        event.message_payload.as_ref(),
                        event.message_nonce as i64,
                        event.message_from.as_bytes(),
                        event.message_to.as_bytes(),
                        u256_to_big_decimal(event.message_value),
                        event.check_status as CheckStatus,
                        event.process_status as ProcessStatus,
                        event.process_attempts as i32,
                        event.fail_reason.as_deref(),
                    )
                    .execute(&mut *tx)
                    .await?
                }
                Chain::L2 => {
                    sqlx::query!(
                        "
                        INSERT INTO l2_raw_bridge_events
                        (
                            chain_id, event_type, token_type, tx_hash, block_number,
                            block_timestamp, sender, receiver, message_hash,
                            message_payload_type, message_payload, message_nonce,
                            message_from, message_to, message_value, check_status,
                            process_status, process_attempts, fail_reason
                        )
                        VALUES (
                            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                            $11, $12, $13, $14, $15, $16, $17, $18, $19
                        )
                        ON CONFLICT (message_hash) DO UPDATE SET
                            deleted_at = NULL,
                            tx_hash = EXCLUDED.tx_hash,
                            block_number = EXCLUDED.block_number,
                            block_timestamp = EXCLUDED.block_timestamp,
                            updated_at = NOW()
                        WHERE l2_raw_bridge_events.deleted_at IS NOT NULL
                        ",
                        event.chain_id as i64,
                        event.event_type as EventType,
                        event.token_type as TokenType,
                        event.tx_hash.as_bytes(),
                        event.block_number as i64,
                        event.block_timestamp as i64,
                        event.sender.as_bytes(),
                        event.receiver.as_bytes(),
                        event.message_hash.as_bytes(),
                        event.message_payload_type as i64,
                        event.message_payload.as_ref(),
                        event.message_nonce as i64,
                        event.message_from.as_bytes(),
                        event.message_to.as_bytes(),
                        u256_to_big_decimal(event.message_value),
                        event.check_status as CheckStatus,
                        event.process_status as ProcessStatus,
                        event.process_attempts as i32,
                        event.fail_reason.as_deref(),
                    )
                    .execute(&mut *tx)
                    .await?
                }
            };

            inserted += res.rows_affected();
        }

        tx.commit().await?;

        self.metrics
            .duplicate_raw_events
            .inc_by(events.len() as u64 - inserted);
        latency.observe();

        Ok(inserted)
    }

    async fn delete_raw_events_above(&self, chain: Chain, block_number: u64) -> Result<u64> {
        let latency = self.metrics.call[&"delete_raw_events_above"].start();

        let res = match chain {
            Chain::L1 => {
                sqlx::query!(
                    "
                    UPDATE l1_raw_bridge_events
                    SET deleted_at = NOW(), updated_at = NOW()
                    WHERE block_number > $1
                        AND process_status <> $2
                        AND deleted_at IS NULL
                    ",
                    block_number as i64,
                    ProcessStatus::Processed as ProcessStatus,
                )
                .execute(&self.pool)
                .await?
            }
            Chain::L2 => {
                sqlx::query!(
                    "
                    UPDATE l2_raw_bridge_events
                    SET deleted_at = NOW(), updated_at = NOW()
                    WHERE block_number > $1
                        AND process_status <> $2
                        AND deleted_at IS NULL
                    ",
                    block_number as i64,
                    ProcessStatus::Processed as ProcessStatus,
                )
                .execute(&self.pool)
                .await?
            }
        };

        latency.observe();

        Ok(res.rows_affected())
    }

    async fn max_block_number(&self, chain: Chain) -> Result<Option<u64>> {
        let max = match chain {
            Chain::L1 => {
                sqlx::query_scalar!(
                    "SELECT MAX(block_number) FROM l1_raw_bridge_events WHERE deleted_at IS NULL"
                )
                .fetch_one(&self.pool)
                .await?
            }
            Chain::L2 => {
                sqlx::query_scalar!(
                    "SELECT MAX(block_number) FROM l2_raw_bridge_events WHERE deleted_at IS NULL"
                )
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(max.map(|max| max as u64))
    }

    async fn min_nonce_by_check_status(
        &self,
        chain: Chain,
        event_type: EventType,
        status: CheckStatus,
    ) -> Result<Option<u64>> {
        let min = match chain {
            Chain::L1 => {
                sqlx::query_scalar!(
                    "
                    SELECT MIN(message_nonce) FROM l1_raw_bridge_events
                    WHERE event_type = $1 AND check_status = $2 AND deleted_at IS NULL
                    ",
                    event_type as EventType,
                    status as CheckStatus,
                )
                .fetch_one(&self.pool)
                .await?
            }
            Chain::L2 => {
                sqlx::query_scalar!(
                    "
                    SELECT MIN(message_nonce) FROM l2_raw_bridge_events
                    WHERE event_type = $1 AND check_status = $2 AND deleted_at IS NULL
                    ",
                    event_type as EventType,
                    status as CheckStatus,
                )
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(min.map(|n| n as u64))
    }

    async fn max_nonce_by_check_status(
        &self,
        chain: Chain,
        event_type: EventType,
        status: CheckStatus,
    ) -> Result<Option<u64>> {
        let max = match chain {
            Chain::L1 => {
                sqlx::query_scalar!(
                    "
                    SELECT MAX(message_nonce) FROM l1_raw_bridge_events
                    WHERE event_type = $1 AND check_status = $2 AND deleted_at IS NULL
                    ",
                    event_type as EventType,
                    status as CheckStatus,
                )
                .fetch_one(&self.pool)
                .await?
            }
            Chain::L2 => {
                sqlx::query_scalar!(
                    "
                    SELECT MAX(message_nonce) FROM l2_raw_bridge_events
                    WHERE event_type = $1 AND check_status = $2 AND deleted_at IS NULL
                    ",
                    event_type as EventType,
                    status as CheckStatus,
                )
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(max.map(|n| n as u64))
    }

    async fn count_by_nonce_range(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
    ) -> Result<u64> {
        let count = match chain {
            Chain::L1 => {
                sqlx::query_scalar!(
                    r#"
                    SELECT COUNT(DISTINCT message_nonce) AS "count!"
                    FROM l1_raw_bridge_events
                    WHERE event_type = $1
                        AND message_nonce >= $2 AND message_nonce <= $3
                        AND deleted_at IS NULL
                    "#,
                    event_type as EventType,
                    start as i64,
                    end as i64,
                )
                .fetch_one(&self.pool)
                .await?
            }
            Chain::L2 => {
                sqlx::query_scalar!(
                    r#"
                    SELECT COUNT(DISTINCT message_nonce) AS "count!"
                    FROM l2_raw_bridge_events
                    WHERE event_type = $1
                        AND message_nonce >= $2 AND message_nonce <= $3
                        AND deleted_at IS NULL
                    "#,
                    event_type as EventType,
                    start as i64,
                    end as i64,
                )
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(count as u64)
    }

    async fn events_by_nonce_range(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
        status: Option<CheckStatus>,
    ) -> Result<Vec<RawBridgeEvent>> {
        let rows = match chain {
            Chain::L1 => {
                sqlx::query_as!(
                    RawEventRow,
                    r#"
                    SELECT
                        id, chain_id,
                        event_type AS "event_type: EventType",
                        token_type AS "token_type: TokenType",
                        tx_hash, block_number, block_timestamp, sender, receiver,
                        message_hash, message_payload_type, message_payload,
                        message_nonce, message_from, message_to, message_value,
                        check_status AS "check_status: CheckStatus",
                        process_status AS "process_status: ProcessStatus",
                        process_attempts, fail_reason
                    FROM l1_raw_bridge_events
                    WHERE event_type = $1
                        AND message_nonce >= $2 AND message_nonce <= $3
                        AND ($4::check_status IS NULL OR check_status = $4)
                        AND deleted_at IS NULL
                    ORDER BY message_nonce ASC, id ASC
                    "#,
                    event_type as EventType,
                    start as i64,
                    end as i64,
                    status as Option<CheckStatus>,
                )
                .fetch_all(&self.pool)
                .await?
            }
            Chain::L2 => {
                sqlx::query_as!(
                    RawEventRow,
                    r#"
                    SELECT
                        id, chain_id,
                        event_type AS "event_type: EventType",
                        token_type AS "token_type: TokenType",
                        tx_hash, block_number, block_timestamp, sender, receiver,
                        message_hash, message_payload_type, message_payload,
                        message_nonce, message_from, message_to, message_value,
                        check_status AS "check_status: CheckStatus",
                        process_status AS "process_status: ProcessStatus",
                        process_attempts, fail_reason
                    FROM l2_raw_bridge_events
                    WHERE event_type = $1
                        AND message_nonce >= $2 AND message_nonce <= $3
                        AND ($4::check_status IS NULL OR check_status = $4)
                        AND deleted_at IS NULL
                    ORDER BY message_nonce ASC, id ASC
                    "#,
                    event_type as EventType,
                    start as i64,
                    end as i64,
                    status as Option<CheckStatus>,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        into_events(rows)
    }

    async fn find_nonce_gaps(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
    ) -> Result<Vec<Gap>> {
        let latency = self.metrics.call[&"find_nonce_gaps"].start();

        // The nearest stored neighbours outside of `[start, end]` are selected as
        // well, they bound the block range of gaps at the edges.
        let rows = match chain {
            Chain::L1 => {
                sqlx::query!(
                    r#"
                    SELECT message_nonce AS "message_nonce!", MIN(block_number) AS "block_number!"
                    FROM l1_raw_bridge_events
                    WHERE event_type = $1
                        AND deleted_at IS NULL
                        AND message_nonce >= COALESCE(
                            (SELECT MAX(message_nonce) FROM l1_raw_bridge_events
                             WHERE event_type = $1 AND deleted_at IS NULL AND message_nonce < $2),
                            $2
                        )
                        AND message_nonce <= COALESCE(
                            (SELECT MIN(message_nonce) FROM l1_raw_bridge_events
                             WHERE event_type = $1 AND deleted_at IS NULL AND message_nonce > $3),
                            $3
                        )
                    GROUP BY message_nonce
                    ORDER BY message_nonce ASC
                    "#,
                    event_type as EventType,
                    start as i64,
                    end as i64,
                )
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|row| (row.message_nonce as u64, row.block_number as u64))
                .collect::<Vec<_>>()
            }
            Chain::L2 => {
                sqlx::query!(
                    r#"
                    SELECT message_nonce AS "message_nonce!", MIN(block_number) AS "block_number!"
                    FROM l2_raw_bridge_events
                    WHERE event_type = $1
                        AND deleted_at IS NULL
                        AND message_nonce >= COALESCE(
                            (SELECT MAX(message_nonce) FROM l2_raw_bridge_events
                             WHERE event_type = $1 AND deleted_at IS NULL AND message_nonce < $2),
                            $2
                        )
                        AND message_nonce <= COALESCE(
                            (SELECT MIN(message_nonce) FROM l2_raw_bridge_events
                             WHERE event_type = $1 AND deleted_at IS NULL AND message_nonce > $3),
                            $3
                        )
                    GROUP BY message_nonce
                    ORDER BY message_nonce ASC
                    "#,
                    event_type as EventType,
                    start as i64,
                    end as i64,
                )
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|row| (row.message_nonce as u64, row.block_number as u64))
                .collect::<Vec<_>>()
            }
        };

        latency.observe();

        Ok(nonce_gaps(&rows, start, end))
    }

    async fn update_check_status_by_range(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
        from: CheckStatus,
        to: CheckStatus,
    ) -> Result<u64> {
        let res = match chain {
            Chain::L1 => {
                sqlx::query!(
                    "
                    UPDATE l1_raw_bridge_events
                    SET check_status = $1, fail_reason = NULL, updated_at = NOW()
                    WHERE event_type = $2
                        AND message_nonce >= $3 AND message_nonce <= $4
                        AND check_status = $5
                        AND deleted_at IS NULL
                    ",
                    to as CheckStatus,
                    event_type as EventType,
                    start as i64,
                    end as i64,
                    from as CheckStatus,
                )
                .execute(&self.pool)
                .await?
            }
            Chain::L2 => {
                sqlx::query!(
                    "
                    UPDATE l2_raw_bridge_events
                    SET check_status = $1, fail_reason = NULL, updated_at = NOW()
                    WHERE event_type = $2
                        AND message_nonce >= $3 AND message_nonce <= $4
                        AND check_status = $5
                        AND deleted_at IS NULL
                    ",
                    to as CheckStatus,
                    event_type as EventType,
                    start as i64,
                    end as i64,
                    from as CheckStatus,
                )
                .execute(&self.pool)
                .await?
            }
        };

        Ok(res.rows_affected())
    }

    async fn update_check_status(&self, chain: Chain, id: i64, status: CheckStatus) -> Result<()> {
        match chain {
            Chain::L1 => {
                sqlx::query!(
                    "
                    UPDATE l1_raw_bridge_events
                    SET check_status = $1, fail_reason = NULL, updated_at = NOW()
                    WHERE id = $2
                    ",
                    status as CheckStatus,
                    id,
                )
                .execute(&self.pool)
                .await?;
            }
            Chain::L2 => {
                sqlx::query!(
                    "
                    UPDATE l2_raw_bridge_events
                    SET check_status = $1, fail_reason = NULL, updated_at = NOW()
                    WHERE id = $2
                    ",
                    status as CheckStatus,
                    id,
                )
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn update_check_fail_reason(
        &self,
        chain: Chain,
        id: i64,
        status: CheckStatus,
        reason: &str,
    ) -> Result<()> {
        match chain {
            Chain::L1 => {
                sqlx::query!(
                    "
                    UPDATE l1_raw_bridge_events
                    SET check_status = $1, fail_reason = $2, updated_at = NOW()
                    WHERE id = $3
                    ",
                    status as CheckStatus,
                    reason,
                    id,
                )
                .execute(&self.pool)
                .await?;
            }
            Chain::L2 => {
                sqlx::query!(
                    "
                    UPDATE l2_raw_bridge_events
                    SET check_status = $1, fail_reason = $2, updated_at = NOW()
                    WHERE id = $3
                    ",
                    status as CheckStatus,
                    reason,
                    id,
                )
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn query_unprocessed(
        &self,
        chain: Chain,
        event_type: EventType,
        batch_size: u64,
        max_attempts: u32,
    ) -> Result<Vec<RawBridgeEvent>> {
        let latency = self.metrics.call[&"query_unprocessed"].start();

        let rows = match chain {
            Chain::L1 => {
                sqlx::query_as!(
                    RawEventRow,
                    r#"
                    SELECT
                        id, chain_id,
                        event_type AS "event_type: EventType",
                        token_type AS "token_type: TokenType",
                        tx_hash, block_number, block_timestamp, sender, receiver,
                        message_hash, message_payload_type, message_payload,
                        message_nonce, message_from, message_to, message_value,
                        check_status AS "check_status: CheckStatus",
                        process_status AS "process_status: ProcessStatus",
                        process_attempts, fail_reason
                    FROM l1_raw_bridge_events
                    WHERE event_type = $1
                        AND check_status <> $2
                        AND (
                            process_status = $3
                            OR (process_status = $4 AND process_attempts < $5)
                        )
                        AND deleted_at IS NULL
                    ORDER BY message_nonce ASC, id ASC
                    LIMIT $6
                    "#,
                    event_type as EventType,
                    CheckStatus::Unchecked as CheckStatus,
                    ProcessStatus::UnProcessed as ProcessStatus,
                    ProcessStatus::ProcessFailed as ProcessStatus,
                    max_attempts as i32,
                    batch_size as i64,
                )
                .fetch_all(&self.pool)
                .await?
            }
            Chain::L2 => {
                sqlx::query_as!(
                    RawEventRow,
                    r#"
                    SELECT
                        id, chain_id,
                        event_type AS "event_type: EventType",
                        token_type AS "token_type: TokenType",
                        tx_hash, block_number, block_timestamp, sender, receiver,
                        message_hash, message_payload_type, message_payload,
                        message_nonce, message_from, message_to, message_value,
                        check_status AS "check_status: CheckStatus",
                        process_status AS "process_status: ProcessStatus",
                        process_attempts, fail_reason
                    FROM l2_raw_bridge_events
                    WHERE event_type = $1
                        AND check_status <> $2
                        AND (
                            process_status = $3
                            OR (process_status = $4 AND process_attempts < $5)
                        )
                        AND deleted_at IS NULL
                    ORDER BY message_nonce ASC, id ASC
                    LIMIT $6
                    "#,
                    event_type as EventType,
                    CheckStatus::Unchecked as CheckStatus,
                    ProcessStatus::UnProcessed as ProcessStatus,
                    ProcessStatus::ProcessFailed as ProcessStatus,
                    max_attempts as i32,
                    batch_size as i64,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        latency.observe();

        into_events(rows)
    }

    async fn update_process_status(
        &self,
        chain: Chain,
        id: i64,
        status: ProcessStatus,
    ) -> Result<()> {
        match chain {
            Chain::L1 => {
                sqlx::query!(
                    "
                    UPDATE l1_raw_bridge_events
                    SET process_status = $1, updated_at = NOW()
                    WHERE id = $2
                    ",
                    status as ProcessStatus,
                    id,
                )
                .execute(&self.pool)
                .await?;
            }
            Chain::L2 => {
                sqlx::query!(
                    "
                    UPDATE l2_raw_bridge_events
                    SET process_status = $1, updated_at = NOW()
                    WHERE id = $2
                    ",
                    status as ProcessStatus,
                    id,
                )
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn update_process_fail(&self, chain: Chain, id: i64, reason: &str) -> Result<()> {
        match chain {
            Chain::L1 => {
                sqlx::query!(
                    "
                    UPDATE l1_raw_bridge_events
                    SET process_status = $1,
                        process_attempts = process_attempts + 1,
                        fail_reason = $2,
                        updated_at = NOW()
                    WHERE id = $3
                    ",
                    ProcessStatus::ProcessFailed as ProcessStatus,
                    reason,
                    id,
                )
                .execute(&self.pool)
                .await?;
            }
            Chain::L2 => {
                sqlx::query!(
                    "
                    UPDATE l2_raw_bridge_events
                    SET process_status = $1,
                        process_attempts = process_attempts + 1,
                        fail_reason = $2,
                        updated_at = NOW()
                    WHERE id = $3
                    ",
                    ProcessStatus::ProcessFailed as ProcessStatus,
                    reason,
                    id,
                )
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn reset_process_status(&self, chain: Chain, id: i64) -> Result<bool> {
        let res = match chain {
            Chain::L1 => {
                sqlx::query!(
                    "
                    UPDATE l1_raw_bridge_events
                    SET process_status = $1,
                        process_attempts = 0,
                        fail_reason = NULL,
                        updated_at = NOW()
                    WHERE id = $2 AND process_status = $3
                    ",
                    ProcessStatus::UnProcessed as ProcessStatus,
                    id,
                    ProcessStatus::ProcessFailed as ProcessStatus,
                )
                .execute(&self.pool)
                .await?
            }
            Chain::L2 => {
                sqlx::query!(
                    "
                    UPDATE l2_raw_bridge_events
                    SET process_status = $1,
                        process_attempts = 0,
                        fail_reason = NULL,
                        updated_at = NOW()
                    WHERE id = $2 AND process_status = $3
                    ",
                    ProcessStatus::UnProcessed as ProcessStatus,
                    id,
                    ProcessStatus::ProcessFailed as ProcessStatus,
                )
                .execute(&self.pool)
                .await?
            }
        };

        Ok(res.rows_affected() == 1)
    }
}

#[async_trait]
impl CrossMessageStore for PgStore {
    async fn upsert_cross_messages(&self, messages: &[CrossMessage]) -> Result<()> {
        let latency = self.metrics.call[&"upsert_cross_messages"].start();
        let mut tx = self.pool.begin().await?;

        for m in messages {
            sqlx::query!(
                "
                INSERT INTO cross_messages
                (
                    message_hash, message_type, tx_type, tx_status, token_type, sender,
                    receiver, l1_token_address, l2_token_address, token_ids, token_amounts,
                    l1_tx_hash, l1_block_number, l2_tx_hash, l2_block_number, relay_tx_hash,
                    message_from, message_to, message_value, message_payload,
                    message_payload_type, message_nonce, multi_sign_proof, block_timestamp
                )
                VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
                )
                ON CONFLICT (message_hash, tx_type, message_type) DO UPDATE SET
                    tx_status = EXCLUDED.tx_status,
                    token_type = EXCLUDED.token_type,
                    sender = EXCLUDED.sender,
                    receiver = EXCLUDED.receiver,
                    l1_token_address = EXCLUDED.l1_token_address,
                    l2_token_address = EXCLUDED.l2_token_address,
                    token_ids = EXCLUDED.token_ids,
                    token_amounts = EXCLUDED.token_amounts,
                    l1_tx_hash = COALESCE(EXCLUDED.l1_tx_hash, cross_messages.l1_tx_hash),
                    l1_block_number = COALESCE(EXCLUDED.l1_block_number, cross_messages.l1_block_number),
                    l2_tx_hash = COALESCE(EXCLUDED.l2_tx_hash, cross_messages.l2_tx_hash),
                    l2_block_number = COALESCE(EXCLUDED.l2_block_number, cross_messages.l2_block_number),
                    relay_tx_hash = COALESCE(EXCLUDED.relay_tx_hash, cross_messages.relay_tx_hash),
                    multi_sign_proof = EXCLUDED.multi_sign_proof,
                    updated_at = NOW()
                WHERE cross_messages.tx_status = $25
                ",
                m.message_hash.as_bytes(),
                m.message_type as MessageType,
                m.tx_type as TxType,
                m.tx_status as TxStatus,
                m.token_type as TokenType,
                m.sender.as_bytes(),
                m.receiver.as_bytes(),
                m.l1_token_address.as_bytes(),
                m.l2_token_address.as_bytes(),
                join_u256(&m.token_ids),
                join_u256(&m.token_amounts),
                m.l1_tx_hash.as_ref().map(|h| h.as_bytes()),
                m.l1_block_number.map(|n| n as i64),
                m.l2_tx_hash.as_ref().map(|h| h.as_bytes()),
                m.l2_block_number.map(|n| n as i64),
                m.relay_tx_hash.as_ref().map(|h| h.as_bytes()),
                m.message_from.as_bytes(),
                m.message_to.as_bytes(),
                u256_to_big_decimal(m.message_value),
                m.message_payload.as_ref(),
                m.message_payload_type as i64,
                m.message_nonce as i64,
                join_proofs(&m.multi_sign_proof),
                m.block_timestamp as i64,
                TxStatus::Sent as TxStatus,
            )
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        latency.observe();

        Ok(())
    }

    async fn exists_by_message_hash(&self, message_hash: H256) -> Result<bool> {
        let exists = sqlx::query_scalar!(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM cross_messages
                WHERE message_hash = $1 AND deleted_at IS NULL
            ) AS "exists!"
            "#,
            message_hash.as_bytes(),
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn update_consumed_status(&self, relayed: &RelayedMessage) -> Result<u64> {
        // A message is executed on the chain opposite to its origin.
        let res = match relayed.message_type {
            MessageType::L1Message => {
                sqlx::query!(
                    "
                    UPDATE cross_messages
                    SET tx_status = $1, l2_tx_hash = $2, l2_block_number = $3, updated_at = NOW()
                    WHERE message_hash = $4 AND message_type = $5 AND tx_status = $6
                    ",
                    TxStatus::Consumed as TxStatus,
                    relayed.tx_hash.as_bytes(),
                    relayed.block_number as i64,
                    relayed.message_hash.as_bytes(),
                    relayed.message_type as MessageType,
                    TxStatus::Sent as TxStatus,
                )
                .execute(&self.pool)
                .await?
            }
            MessageType::L2Message => {
                sqlx::query!(
                    "
                    UPDATE cross_messages
                    SET tx_status = $1, l1_tx_hash = $2, l1_block_number = $3, updated_at = NOW()
                    WHERE message_hash = $4 AND message_type = $5 AND tx_status = $6
                    ",
                    TxStatus::Consumed as TxStatus,
                    relayed.tx_hash.as_bytes(),
                    relayed.block_number as i64,
                    relayed.message_hash.as_bytes(),
                    relayed.message_type as MessageType,
                    TxStatus::Sent as TxStatus,
                )
                .execute(&self.pool)
                .await?
            }
        };

        Ok(res.rows_affected())
    }

    async fn query_by_address(
        &self,
        address: Address,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<CrossMessage>, u64)> {
        let offset = page.saturating_sub(1) * page_size;

        let total = sqlx::query_scalar!(
            r#"
            SELECT COUNT(*) AS "count!" FROM cross_messages
            WHERE (sender = $1 OR receiver = $1) AND deleted_at IS NULL
            "#,
            address.as_bytes(),
        )
        .fetch_one(&self.pool)
        .await?;

        let messages = sqlx::query_as!(
            CrossMessageRow,
            r#"
            SELECT
                id, message_hash,
                message_type AS "message_type: MessageType",
                tx_type AS "tx_type: TxType",
                tx_status AS "tx_status: TxStatus",
                token_type AS "token_type: TokenType",
                sender, receiver, l1_token_address, l2_token_address, token_ids,
                token_amounts, l1_tx_hash, l1_block_number, l2_tx_hash, l2_block_number,
                relay_tx_hash, message_from, message_to, message_value, message_payload,
                message_payload_type, message_nonce, multi_sign_proof, block_timestamp
            FROM cross_messages
            WHERE (sender = $1 OR receiver = $1) AND deleted_at IS NULL
            ORDER BY block_timestamp DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            address.as_bytes(),
            page_size as i64,
            offset as i64,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(cross_message_from_row)
        .collect::<Result<Vec<_>>>()?;

        Ok((messages, total as u64))
    }
}
