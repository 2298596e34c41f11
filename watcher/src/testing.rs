//! An in-memory chain implementing [`EventSource`].

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use client::{BlockHeader, EventSource};
use ethers::types::{Address, Log, TransactionReceipt, H256};

/// Hash of block `number` on fork `fork`.
pub fn block_hash(fork: u8, number: u64) -> H256 {
    let mut hash = H256::from_low_u64_be(number);
    hash.0[0] = fork + 1;
    hash
}

#[derive(Debug, Default)]
struct State {
    headers: BTreeMap<u64, BlockHeader>,
    logs: Vec<Log>,
}

/// A chain whose blocks and logs are set up by the test.
#[derive(Debug, Default)]
pub struct FakeChain {
    chain_id: u64,
    state: Mutex<State>,
    head: AtomicU64,
    log_queries: AtomicU64,
}

impl FakeChain {
    /// A chain of blocks `0..=head`, all on fork `0`.
    pub fn new(chain_id: u64, head: u64) -> Self {
        let chain = Self {
            chain_id,
            ..Default::default()
        };
        chain.extend(0, 0, head);
        chain.head.store(head, Ordering::SeqCst);
        chain
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replaces blocks `from..=to` with blocks of `fork`, built on top of the
    /// block at `from - 1`.
    pub fn extend(&self, fork: u8, from: u64, to: u64) {
        let mut state = self.lock();

        let mut parent_hash = match from.checked_sub(1) {
            Some(parent) => state
                .headers
                .get(&parent)
                .map(|h| h.hash)
                .unwrap_or_default(),
            None => H256::zero(),
        };

        for number in from..=to {
            let hash = block_hash(fork, number);
            state.headers.insert(
                number,
                BlockHeader {
                    number,
                    hash,
                    parent_hash,
                    timestamp: 1_700_000_000 + number * 12,
                },
            );
            parent_hash = hash;
        }
    }

    /// Moves the chain head.
    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Adds a log to be returned by [`EventSource::filter_logs`].
    pub fn push_log(&self, log: Log) {
        self.lock().logs.push(log);
    }

    /// Drops all logs in `[from, to]`.
    pub fn remove_logs(&self, from: u64, to: u64) {
        self.lock().logs.retain(|l| {
            let n = l.block_number.map(|n| n.as_u64()).unwrap_or_default();
            n < from || n > to
        });
    }

    /// Number of `filter_logs` calls served.
    pub fn log_queries(&self) -> u64 {
        self.log_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for FakeChain {
    async fn chain_id(&self) -> client::Result<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> client::Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn header_by_number(&self, number: u64) -> client::Result<BlockHeader> {
        if number > self.head.load(Ordering::SeqCst) {
            return Err(client::Error::MissingBlock(number));
        }

        self.lock()
            .headers
            .get(&number)
            .copied()
            .ok_or(client::Error::MissingBlock(number))
    }

    async fn filter_logs(
        &self,
        addresses: &[Address],
        topics: &[H256],
        from: u64,
        to: u64,
    ) -> client::Result<Vec<Log>> {
        self.log_queries.fetch_add(1, Ordering::SeqCst);

        Ok(self
            .lock()
            .logs
            .iter()
            .filter(|l| {
                let n = l.block_number.map(|n| n.as_u64()).unwrap_or_default();
                n >= from
                    && n <= to
                    && addresses.contains(&l.address)
                    && l.topics.first().map_or(false, |t| topics.contains(t))
            })
            .cloned()
            .collect())
    }

    async fn transaction_receipt(&self, _tx_hash: H256) -> client::Result<Option<TransactionReceipt>> {
        Ok(None)
    }
}
