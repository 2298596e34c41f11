//! An in-process store with the same semantics as [`PgStore`](crate::PgStore).
//!
//! Used by the tests of the components built on top of the storage.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use ethers::types::{Address, H256};

use crate::{
    utils::nonce_gaps, Chain, CheckStatus, CrossMessage, CrossMessageStore, EventType, Gap,
    MessageType, ProcessStatus, RawBridgeEvent, RawEventStore, RelayedMessage, Result, TxStatus,
};

#[derive(Debug)]
struct Row {
    event: RawBridgeEvent,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Tables {
    l1: Vec<Row>,
    l2: Vec<Row>,
    cross_messages: Vec<CrossMessage>,
    next_id: i64,
}

impl Tables {
    fn rows(&mut self, chain: Chain) -> &mut Vec<Row> {
        match chain {
            Chain::L1 => &mut self.l1,
            Chain::L2 => &mut self.l2,
        }
    }

    fn live(&mut self, chain: Chain) -> impl Iterator<Item = &mut RawBridgeEvent> {
        self.rows(chain)
            .iter_mut()
            .filter(|r| !r.deleted)
            .map(|r| &mut r.event)
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A [`RawEventStore`] and [`CrossMessageStore`] keeping everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stored raw events of `chain` that are not deleted, in insertion order.
    pub fn raw_events(&self, chain: Chain) -> Vec<RawBridgeEvent> {
        self.lock().live(chain).map(|e| e.clone()).collect()
    }

    /// Number of soft-deleted raw events of `chain`.
    pub fn deleted_raw_events(&self, chain: Chain) -> usize {
        self.lock().rows(chain).iter().filter(|r| r.deleted).count()
    }

    /// All stored cross messages, in insertion order.
    pub fn cross_messages(&self) -> Vec<CrossMessage> {
        self.lock().cross_messages.clone()
    }

    /// A live raw event by its `message_hash`.
    pub fn raw_event(&self, chain: Chain, message_hash: H256) -> Option<RawBridgeEvent> {
        self.lock()
            .live(chain)
            .find(|e| e.message_hash == message_hash)
            .map(|e| e.clone())
    }

    fn update_raw<F>(&self, chain: Chain, id: i64, f: F)
    where
        F: FnOnce(&mut RawBridgeEvent),
    {
        if let Some(e) = self.lock().rows(chain).iter_mut().find(|r| r.event.id == id) {
            f(&mut e.event)
        }
    }

    fn live_events<F>(&self, chain: Chain, filter: F) -> Vec<RawBridgeEvent>
    where
        F: Fn(&RawBridgeEvent) -> bool,
    {
        self.lock()
            .live(chain)
            .filter(|e| filter(e))
            .map(|e| e.clone())
            .collect()
    }
}

fn in_range(e: &RawBridgeEvent, event_type: EventType, start: u64, end: u64) -> bool {
    e.event_type == event_type && e.message_nonce >= start && e.message_nonce <= end
}

#[async_trait]
impl RawEventStore for InMemoryStore {
    async fn insert_raw_events(&self, chain: Chain, events: &[RawBridgeEvent]) -> Result<u64> {
        let mut tables = self.lock();
        let mut inserted = 0;

        for event in events {
            if let Some(row) = tables
                .rows(chain)
                .iter_mut()
                .find(|r| r.event.message_hash == event.message_hash)
            {
                if row.deleted {
                    row.deleted = false;
                    row.event.tx_hash = event.tx_hash;
                    row.event.block_number = event.block_number;
                    row.event.block_timestamp = event.block_timestamp;
                    inserted += 1;
                }
                continue;
            }

            let id = tables.next_id();
            tables.rows(chain).push(Row {
                event: RawBridgeEvent {
                    id,
                    ..event.clone()
                },
                deleted: false,
            });
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn delete_raw_events_above(&self, chain: Chain, block_number: u64) -> Result<u64> {
        let mut deleted = 0;

        for row in self.lock().rows(chain).iter_mut().filter(|r| {
            !r.deleted
                && r.event.block_number > block_number
                && r.event.process_status != ProcessStatus::Processed
        }) {
            row.deleted = true;
            deleted += 1;
        }

        Ok(deleted)
    }

    async fn max_block_number(&self, chain: Chain) -> Result<Option<u64>> {
        Ok(self.lock().live(chain).map(|e| e.block_number).max())
    }

    async fn min_nonce_by_check_status(
        &self,
        chain: Chain,
        event_type: EventType,
        status: CheckStatus,
    ) -> Result<Option<u64>> {
        Ok(self
            .live_events(chain, |e| e.event_type == event_type && e.check_status == status)
            .iter()
            .map(|e| e.message_nonce)
            .min())
    }

    async fn max_nonce_by_check_status(
        &self,
        chain: Chain,
        event_type: EventType,
        status: CheckStatus,
    ) -> Result<Option<u64>> {
        Ok(self
            .live_events(chain, |e| e.event_type == event_type && e.check_status == status)
            .iter()
            .map(|e| e.message_nonce)
            .max())
    }

    async fn count_by_nonce_range(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
    ) -> Result<u64> {
        let mut nonces: Vec<u64> = self
            .live_events(chain, |e| in_range(e, event_type, start, end))
            .iter()
            .map(|e| e.message_nonce)
            .collect();
        nonces.sort_unstable();
        nonces.dedup();

        Ok(nonces.len() as u64)
    }

    async fn events_by_nonce_range(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
        status: Option<CheckStatus>,
    ) -> Result<Vec<RawBridgeEvent>> {
        let mut events = self.live_events(chain, |e| {
            in_range(e, event_type, start, end) && status.map_or(true, |s| e.check_status == s)
        });
        events.sort_by_key(|e| (e.message_nonce, e.id));

        Ok(events)
    }

    async fn find_nonce_gaps(
        &self,
        chain: Chain,
        event_type: EventType,
        start: u64,
        end: u64,
    ) -> Result<Vec<Gap>> {
        let mut by_nonce: HashMap<u64, u64> = HashMap::new();
        for e in self.live_events(chain, |e| e.event_type == event_type) {
            let block = by_nonce.entry(e.message_nonce).or_insert(e.block_number);
            *block = (*block).min(e.block_number);
        }

        let lower = by_nonce.keys().filter(|n| **n < start).max().copied();
        let upper = by_nonce.keys().filter(|n| **n > end).min().copied();

        let mut present: Vec<(u64, u64)> = by_nonce
            .into_iter()
            .filter(|(n, _)| *n >= lower.unwrap_or(start) && *n <= upper.unwrap_or(end))
            .collect();
        present.sort_unstable();

        Ok(nonce_gaps(&present, start, end))
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
        let mut updated = 0;

        for e in self
            .lock()
            .live(chain)
            .filter(|e| in_range(e, event_type, start, end) && e.check_status == from)
        {
            e.check_status = to;
            e.fail_reason = None;
            updated += 1;
        }

        Ok(updated)
    }

    async fn update_check_status(&self, chain: Chain, id: i64, status: CheckStatus) -> Result<()> {
        self.update_raw(chain, id, |e| {
            e.check_status = status;
            e.fail_reason = None;
        });
        Ok(())
    }

    async fn update_check_fail_reason(
        &self,
        chain: Chain,
        id: i64,
        status: CheckStatus,
        reason: &str,
    ) -> Result<()> {
        self.update_raw(chain, id, |e| {
            e.check_status = status;
            e.fail_reason = Some(reason.to_string());
        });
        Ok(())
    }

    async fn query_unprocessed(
        &self,
        chain: Chain,
        event_type: EventType,
        batch_size: u64,
        max_attempts: u32,
    ) -> Result<Vec<RawBridgeEvent>> {
        let mut events = self.live_events(chain, |e| {
            e.event_type == event_type
                && e.check_status != CheckStatus::Unchecked
                && match e.process_status {
                    ProcessStatus::UnProcessed => true,
                    ProcessStatus::ProcessFailed => e.process_attempts < max_attempts,
                    ProcessStatus::Processed => false,
                }
        });
        events.sort_by_key(|e| (e.message_nonce, e.id));
        events.truncate(batch_size as usize);

        Ok(events)
    }

    async fn update_process_status(
        &self,
        chain: Chain,
        id: i64,
        status: ProcessStatus,
    ) -> Result<()> {
        self.update_raw(chain, id, |e| e.process_status = status);
        Ok(())
    }

    async fn update_process_fail(&self, chain: Chain, id: i64, reason: &str) -> Result<()> {
        self.update_raw(chain, id, |e| {
            e.process_status = ProcessStatus::ProcessFailed;
            e.process_attempts += 1;
            e.fail_reason = Some(reason.to_string());
        });
        Ok(())
    }

    async fn reset_process_status(&self, chain: Chain, id: i64) -> Result<bool> {
        let mut tables = self.lock();
        let Some(e) = tables
            .live(chain)
            .find(|e| e.id == id && e.process_status == ProcessStatus::ProcessFailed)
        else {
            return Ok(false);
        };

        e.process_status = ProcessStatus::UnProcessed;
        e.process_attempts = 0;
        e.fail_reason = None;

        Ok(true)
    }
}

#[async_trait]
impl CrossMessageStore for InMemoryStore {
    async fn upsert_cross_messages(&self, messages: &[CrossMessage]) -> Result<()> {
        let mut tables = self.lock();

        for m in messages {
            let existing = tables.cross_messages.iter_mut().find(|c| {
                c.message_hash == m.message_hash
                    && c.tx_type == m.tx_type
                    && c.message_type == m.message_type
            });

            match existing {
                Some(c) if c.tx_status != TxStatus::Sent => {}
                Some(c) => {
                    let id = c.id;
                    let old = c.clone();
                    *c = CrossMessage {
                        id,
                        l1_tx_hash: m.l1_tx_hash.or(old.l1_tx_hash),
                        l1_block_number: m.l1_block_number.or(old.l1_block_number),
                        l2_tx_hash: m.l2_tx_hash.or(old.l2_tx_hash),
                        l2_block_number: m.l2_block_number.or(old.l2_block_number),
                        relay_tx_hash: m.relay_tx_hash.or(old.relay_tx_hash),
                        // Identity and message fields are immutable once stored.
                        message_from: old.message_from,
                        message_to: old.message_to,
                        message_value: old.message_value,
                        message_payload: old.message_payload,
                        message_payload_type: old.message_payload_type,
                        message_nonce: old.message_nonce,
                        block_timestamp: old.block_timestamp,
                        ..m.clone()
                    };
                }
                None => {
                    let id = tables.next_id();
                    tables.cross_messages.push(CrossMessage { id, ..m.clone() });
                }
            }
        }

        Ok(())
    }

    async fn exists_by_message_hash(&self, message_hash: H256) -> Result<bool> {
        Ok(self
            .lock()
            .cross_messages
            .iter()
            .any(|c| c.message_hash == message_hash))
    }

    async fn update_consumed_status(&self, relayed: &RelayedMessage) -> Result<u64> {
        let mut updated = 0;

        for c in self.lock().cross_messages.iter_mut().filter(|c| {
            c.message_hash == relayed.message_hash
                && c.message_type == relayed.message_type
                && c.tx_status == TxStatus::Sent
        }) {
            c.tx_status = TxStatus::Consumed;
            match relayed.message_type {
                MessageType::L1Message => {
                    c.l2_tx_hash = Some(relayed.tx_hash);
                    c.l2_block_number = Some(relayed.block_number);
                }
                MessageType::L2Message => {
                    c.l1_tx_hash = Some(relayed.tx_hash);
                    c.l1_block_number = Some(relayed.block_number);
                }
            }
            updated += 1;
        }

        Ok(updated)
    }

    async fn query_by_address(
        &self,
        address: Address,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<CrossMessage>, u64)> {
        let mut matching: Vec<_> = self
            .lock()
            .cross_messages
            .iter()
            .filter(|c| c.sender == address || c.receiver == address)
            .cloned()
            .collect();
        matching.sort_by(|a, b| (b.block_timestamp, b.id).cmp(&(a.block_timestamp, a.id)));

        let total = matching.len() as u64;
        let offset = (page.saturating_sub(1) * page_size) as usize;
        let page = matching
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();

        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::{Bytes, U256};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{TokenType, TxType};

    fn queued(nonce: u64, block: u64) -> RawBridgeEvent {
        RawBridgeEvent {
            id: 0,
            chain_id: 1,
            event_type: EventType::QueueTransaction,
            token_type: TokenType::NativeCoin,
            tx_hash: H256::from_low_u64_be(block),
            block_number: block,
            block_timestamp: 1_700_000_000 + block,
            sender: Address::repeat_byte(1),
            receiver: Address::repeat_byte(2),
            message_hash: H256::from_low_u64_be(0x1000 + nonce),
            message_payload_type: 0,
            message_payload: Bytes::default(),
            message_nonce: nonce,
            message_from: Address::repeat_byte(1),
            message_to: Address::repeat_byte(3),
            message_value: U256::from(10),
            check_status: CheckStatus::Unchecked,
            process_status: ProcessStatus::UnProcessed,
            process_attempts: 0,
            fail_reason: None,
        }
    }

    fn deposit(nonce: u64, timestamp: u64) -> CrossMessage {
        CrossMessage {
            id: 0,
            message_hash: H256::from_low_u64_be(0x1000 + nonce),
            message_type: MessageType::L1Message,
            tx_type: TxType::Deposit,
            tx_status: TxStatus::Sent,
            token_type: TokenType::NativeCoin,
            sender: Address::repeat_byte(1),
            receiver: Address::repeat_byte(2),
            l1_token_address: Address::zero(),
            l2_token_address: Address::zero(),
            token_ids: vec![],
            token_amounts: vec![U256::from(10)],
            l1_tx_hash: Some(H256::repeat_byte(0xaa)),
            l1_block_number: Some(100),
            l2_tx_hash: None,
            l2_block_number: None,
            relay_tx_hash: None,
            message_from: Address::repeat_byte(1),
            message_to: Address::repeat_byte(3),
            message_value: U256::from(10),
            message_payload: Bytes::default(),
            message_payload_type: 0,
            message_nonce: nonce,
            multi_sign_proof: vec![],
            block_timestamp: timestamp,
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent_on_message_hash() {
        let store = InMemoryStore::new();
        let events = vec![queued(1, 10), queued(2, 11)];

        assert_eq!(store.insert_raw_events(Chain::L1, &events).await.unwrap(), 2);
        assert_eq!(store.insert_raw_events(Chain::L1, &events).await.unwrap(), 0);
        assert_eq!(store.raw_events(Chain::L1).len(), 2);
        assert!(store.raw_events(Chain::L2).is_empty());
        assert_eq!(store.max_block_number(Chain::L1).await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn gaps_reported_iff_count_mismatch() {
        let store = InMemoryStore::new();
        let et = EventType::QueueTransaction;
        store
            .insert_raw_events(Chain::L1, &[queued(5, 104), queued(7, 120)])
            .await
            .unwrap();

        assert_eq!(store.count_by_nonce_range(Chain::L1, et, 5, 7).await.unwrap(), 2);
        assert_eq!(
            store.find_nonce_gaps(Chain::L1, et, 5, 7).await.unwrap(),
            vec![Gap {
                start_nonce: 6,
                end_nonce: 6,
                start_block: 104,
                end_block: 120,
            }]
        );

        store
            .insert_raw_events(Chain::L1, &[queued(6, 110)])
            .await
            .unwrap();
        assert_eq!(store.count_by_nonce_range(Chain::L1, et, 5, 7).await.unwrap(), 3);
        assert_eq!(store.find_nonce_gaps(Chain::L1, et, 5, 7).await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn unprocessed_respects_check_status_and_attempt_cap() {
        let store = InMemoryStore::new();
        let et = EventType::QueueTransaction;
        store
            .insert_raw_events(Chain::L1, &[queued(1, 10), queued(2, 11), queued(3, 12)])
            .await
            .unwrap();

        // Nothing is relayable before the checker ran.
        assert!(store
            .query_unprocessed(Chain::L1, et, 10, 3)
            .await
            .unwrap()
            .is_empty());

        store
            .update_check_status_by_range(
                Chain::L1,
                et,
                1,
                2,
                CheckStatus::Unchecked,
                CheckStatus::CheckedStep1,
            )
            .await
            .unwrap();

        let batch = store.query_unprocessed(Chain::L1, et, 10, 2).await.unwrap();
        assert_eq!(
            batch.iter().map(|e| e.message_nonce).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let id = batch[0].id;
        store.update_process_fail(Chain::L1, id, "boom").await.unwrap();
        assert_eq!(
            store.query_unprocessed(Chain::L1, et, 10, 2).await.unwrap().len(),
            2
        );

        store.update_process_fail(Chain::L1, id, "boom").await.unwrap();
        let batch = store.query_unprocessed(Chain::L1, et, 10, 2).await.unwrap();
        assert_eq!(
            batch.iter().map(|e| e.message_nonce).collect::<Vec<_>>(),
            vec![2]
        );

        assert!(store.reset_process_status(Chain::L1, id).await.unwrap());
        assert!(!store.reset_process_status(Chain::L1, id).await.unwrap());
        assert_eq!(
            store.query_unprocessed(Chain::L1, et, 1, 2).await.unwrap()[0].message_nonce,
            1
        );
    }

    #[tokio::test]
    async fn consumed_messages_are_never_regressed() {
        let store = InMemoryStore::new();
        store.upsert_cross_messages(&[deposit(1, 100)]).await.unwrap();

        let relayed = RelayedMessage {
            message_hash: H256::from_low_u64_be(0x1001),
            message_type: MessageType::L1Message,
            tx_hash: H256::repeat_byte(0xbb),
            block_number: 500,
        };
        assert_eq!(store.update_consumed_status(&relayed).await.unwrap(), 1);
        // Already consumed.
        assert_eq!(store.update_consumed_status(&relayed).await.unwrap(), 0);

        store.upsert_cross_messages(&[deposit(1, 100)]).await.unwrap();

        let stored = store.cross_messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].tx_status, TxStatus::Consumed);
        assert_eq!(stored[0].l2_tx_hash, Some(H256::repeat_byte(0xbb)));
        assert_eq!(stored[0].l2_block_number, Some(500));
    }

    #[tokio::test]
    async fn deleted_events_are_hidden_until_seen_again() {
        let store = InMemoryStore::new();
        let et = EventType::QueueTransaction;
        store
            .insert_raw_events(Chain::L1, &[queued(1, 10), queued(2, 20), queued(3, 30)])
            .await
            .unwrap();

        let processed = store.raw_events(Chain::L1)[2].id;
        store
            .update_process_status(Chain::L1, processed, ProcessStatus::Processed)
            .await
            .unwrap();

        // Processed events stay whatever block they were seen in.
        assert_eq!(store.delete_raw_events_above(Chain::L1, 15).await.unwrap(), 1);
        assert_eq!(store.deleted_raw_events(Chain::L1), 1);
        assert_eq!(store.max_block_number(Chain::L1).await.unwrap(), Some(30));
        assert_eq!(store.count_by_nonce_range(Chain::L1, et, 1, 3).await.unwrap(), 2);
        assert_eq!(
            store.find_nonce_gaps(Chain::L1, et, 1, 3).await.unwrap(),
            vec![Gap {
                start_nonce: 2,
                end_nonce: 2,
                start_block: 10,
                end_block: 30,
            }]
        );
        assert_eq!(
            store
                .update_check_status_by_range(
                    Chain::L1,
                    et,
                    1,
                    3,
                    CheckStatus::Unchecked,
                    CheckStatus::CheckedStep1,
                )
                .await
                .unwrap(),
            2
        );

        // Seen again on the new fork, at another block.
        let moved = RawBridgeEvent {
            tx_hash: H256::repeat_byte(0x22),
            ..queued(2, 25)
        };
        assert_eq!(store.insert_raw_events(Chain::L1, &[moved]).await.unwrap(), 1);
        assert_eq!(store.insert_raw_events(Chain::L1, &[queued(2, 25)]).await.unwrap(), 0);
        assert_eq!(store.deleted_raw_events(Chain::L1), 0);

        let restored = store.raw_event(Chain::L1, queued(2, 0).message_hash).unwrap();
        assert_eq!(restored.block_number, 25);
        assert_eq!(restored.tx_hash, H256::repeat_byte(0x22));
        assert_eq!(restored.check_status, CheckStatus::Unchecked);
        assert_eq!(store.count_by_nonce_range(Chain::L1, et, 1, 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn settled_messages_are_not_moved_back_to_sent() {
        let store = InMemoryStore::new();
        store.upsert_cross_messages(&[deposit(1, 100)]).await.unwrap();

        let dropped = CrossMessage {
            tx_status: TxStatus::Dropped,
            ..deposit(1, 100)
        };
        store.upsert_cross_messages(&[dropped]).await.unwrap();
        assert_eq!(store.cross_messages()[0].tx_status, TxStatus::Dropped);

        store.upsert_cross_messages(&[deposit(1, 100)]).await.unwrap();
        let ready = CrossMessage {
            tx_status: TxStatus::ReadyForConsumption,
            ..deposit(1, 100)
        };
        store.upsert_cross_messages(&[ready]).await.unwrap();

        let stored = store.cross_messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].tx_status, TxStatus::Dropped);
    }

    #[tokio::test]
    async fn upsert_keeps_known_tx_hashes() {
        let store = InMemoryStore::new();
        store.upsert_cross_messages(&[deposit(1, 100)]).await.unwrap();

        let update = CrossMessage {
            l1_tx_hash: None,
            relay_tx_hash: Some(H256::repeat_byte(0xcc)),
            ..deposit(1, 100)
        };
        store.upsert_cross_messages(&[update]).await.unwrap();

        let stored = store.cross_messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].l1_tx_hash, Some(H256::repeat_byte(0xaa)));
        assert_eq!(stored[0].relay_tx_hash, Some(H256::repeat_byte(0xcc)));
        assert!(store
            .exists_by_message_hash(H256::from_low_u64_be(0x1001))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn query_by_address_pages_newest_first() {
        let store = InMemoryStore::new();
        store
            .upsert_cross_messages(&[deposit(1, 100), deposit(2, 300), deposit(3, 200)])
            .await
            .unwrap();

        let (first, total) = store
            .query_by_address(Address::repeat_byte(2), 1, 2)
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            first.iter().map(|c| c.message_nonce).collect::<Vec<_>>(),
            vec![2, 3]
        );

        let (second, _) = store
            .query_by_address(Address::repeat_byte(2), 2, 2)
            .await
            .unwrap();
        assert_eq!(
            second.iter().map(|c| c.message_nonce).collect::<Vec<_>>(),
            vec![1]
        );

        let (none, total) = store
            .query_by_address(Address::repeat_byte(9), 1, 2)
            .await
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(total, 0);
    }
}
