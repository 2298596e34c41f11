#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

//! Reorg-aware ingestion of bridge events into storage.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use client::EventSource;
use ethers::types::{Address, H256};
use scheduler::Task;
use storage::{Chain, RawEventStore};
use tokio::sync::Mutex;

mod error;
mod fetcher;
pub mod metrics;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
pub use fetcher::EventFetcher;
pub use metrics::{WatcherMetrics, WATCHER_METRICS};

/// Configuration of a [`ChainWatcher`].
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Which side of the bridge is watched.
    pub chain: Chain,

    /// Address of the bridge contract.
    pub bridge_address: Address,

    /// First block to scan for bridge events.
    pub start_height: u64,

    /// Number of blocks behind the head considered not final enough to scan.
    pub confirmations: u64,

    /// Number of blocks to roll back past a detected reorg, and to rescan on startup.
    pub reorg_safe_depth: u64,

    /// Maximal number of blocks processed at once.
    pub batch_size: u64,

    /// Time between two sync ticks.
    pub poll_interval: Duration,
}

/// Height and hash of the last block whose events are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    /// Block number.
    pub height: u64,

    /// Block hash.
    pub hash: H256,
}

/// Result of a single [`ChainWatcher::sync`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No new final blocks.
    UpToDate,

    /// Events stored up to and including `height`.
    Synced {
        /// New cursor height.
        height: u64,
    },

    /// The parent hash of block `at` did not match the cursor, which was
    /// rolled back to `resync_height`.
    Reorg {
        /// First block not built on the known chain.
        at: u64,
        /// New cursor height.
        resync_height: u64,
    },
}

/// Follows one chain and stores its bridge events.
pub struct ChainWatcher<S, St> {
    fetcher: EventFetcher<S>,
    store: St,
    config: WatcherConfig,
    cursor: Mutex<SyncCursor>,
    metrics: &'static WatcherMetrics,
}

impl<S, St> ChainWatcher<S, St>
where
    S: EventSource,
    St: RawEventStore,
{
    /// Create a new `ChainWatcher`.
    ///
    /// The cursor resumes `reorg_safe_depth` blocks below the highest block an
    /// event was stored for, and never below the configured start height.
    ///
    /// # Arguments
    ///
    /// * `fetcher`: Fetcher of the watched chain
    /// * `store`: Raw event storage
    /// * `config`: Watcher configuration
    /// * `metrics`: Metrics to report progress to
    pub async fn new(
        fetcher: EventFetcher<S>,
        store: St,
        config: WatcherConfig,
        metrics: &'static WatcherMetrics,
    ) -> Result<Self> {
        let chain = config.chain;
        let synced = store.max_block_number(chain).await?.unwrap_or_default();

        let height = synced
            .saturating_sub(config.reorg_safe_depth)
            .max(config.start_height.saturating_sub(1));
        let header = fetcher.source().header_by_number(height).await?;

        tracing::info!(
            "{chain} watcher resuming from block {height}, highest stored event is at {synced}"
        );
        metrics.synced_height[&chain.as_str()].set(height);

        Ok(Self {
            fetcher,
            store,
            config,
            cursor: Mutex::new(SyncCursor {
                height,
                hash: header.hash,
            }),
            metrics,
        })
    }

    /// Current cursor.
    pub async fn cursor(&self) -> SyncCursor {
        *self.cursor.lock().await
    }

    /// Processes all final blocks past the cursor, in sub-batches.
    ///
    /// On error the cursor stays at the end of the last fully stored sub-batch.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let chain = self.config.chain;
        let head = self.fetcher.source().block_number().await?;
        let end = head.saturating_sub(self.config.confirmations);

        let mut cursor = self.cursor.lock().await;

        if end <= cursor.height {
            return Ok(SyncOutcome::UpToDate);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut from = cursor.height + 1;

        while from <= end {
            let to = from.saturating_add(batch_size - 1).min(end);
            let headers = self.fetcher.source().blocks_in_range(from, to).await?;

            let mut last_hash = cursor.hash;
            for header in &headers {
                if header.parent_hash != last_hash {
                    return self.roll_back(&mut cursor, header.number).await;
                }
                last_hash = header.hash;
            }

            let timestamps: HashMap<u64, u64> =
                headers.iter().map(|h| (h.number, h.timestamp)).collect();
            let events = self.fetcher.events_in_range(from, to, &timestamps).await?;
            let inserted = self.store.insert_raw_events(chain, &events).await?;

            *cursor = SyncCursor {
                height: to,
                hash: last_hash,
            };

            self.metrics.synced_height[&chain.as_str()].set(to);
            self.metrics.events_ingested[&chain.as_str()].inc_by(inserted);
            tracing::info!(
                "{chain} watcher synced blocks {from}..={to}: {} events, {inserted} new",
                events.len()
            );

            from = to + 1;
        }

        Ok(SyncOutcome::Synced { height: end })
    }

    async fn roll_back(&self, cursor: &mut SyncCursor, at: u64) -> Result<SyncOutcome> {
        let chain = self.config.chain;
        let resync_height = at.saturating_sub(1).saturating_sub(self.config.reorg_safe_depth);
        let header = self.fetcher.source().header_by_number(resync_height).await?;

        // Events of the replaced blocks come back on rescan if they survived the reorg.
        let orphaned = self
            .store
            .delete_raw_events_above(chain, resync_height)
            .await?;

        tracing::warn!(
            "{chain} reorg detected at block {at}, cursor at {} rolled back to {resync_height}, \
             {orphaned} unprocessed events above it dropped",
            cursor.height
        );

        *cursor = SyncCursor {
            height: resync_height,
            hash: header.hash,
        };

        self.metrics.reorgs[&chain.as_str()].inc();
        self.metrics.synced_height[&chain.as_str()].set(resync_height);

        Ok(SyncOutcome::Reorg { at, resync_height })
    }

    /// Stops watching, releasing the chain client.
    pub fn close(self) {
        let ChainWatcher { fetcher, config, .. } = self;
        drop(fetcher);
        tracing::info!("{} watcher closed", config.chain);
    }
}

#[async_trait]
impl<S, St> Task for ChainWatcher<S, St>
where
    S: EventSource + 'static,
    St: RawEventStore + 'static,
{
    type Error = Error;

    fn name(&self) -> &'static str {
        match self.config.chain {
            Chain::L1 => "l1_watcher",
            Chain::L2 => "l2_watcher",
        }
    }

    fn interval(&self) -> Duration {
        self.config.poll_interval
    }

    async fn run(&self) -> Result<()> {
        self.sync().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chain_events::{testing::origination_log, BridgePayload};
    use ethers::types::U256;
    use pretty_assertions::assert_eq;
    use storage::{EventType, InMemoryStore};

    use super::*;
    use crate::testing::{block_hash, FakeChain};

    const BRIDGE: Address = Address::repeat_byte(0xb1);

    fn config(start_height: u64) -> WatcherConfig {
        WatcherConfig {
            chain: Chain::L1,
            bridge_address: BRIDGE,
            start_height,
            confirmations: 0,
            reorg_safe_depth: 64,
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
        }
    }

    fn metrics() -> &'static WatcherMetrics {
        Box::leak(Box::default())
    }

    fn deposit(block: u64, nonce: u64) -> ethers::types::Log {
        origination_log(
            Chain::L1,
            BRIDGE,
            block,
            H256::from_low_u64_be(block * 1000 + nonce),
            nonce,
            &BridgePayload::NativeCoin {
                from: Address::repeat_byte(0xaa),
                to: Address::repeat_byte(0xbb),
                amount: U256::from(nonce),
            },
        )
    }

    fn transfer(block: u64, nonce: u64, amount: u64) -> ethers::types::Log {
        origination_log(
            Chain::L1,
            BRIDGE,
            block,
            H256::from_low_u64_be(block * 1000 + nonce),
            nonce,
            &BridgePayload::NativeCoin {
                from: Address::repeat_byte(0xaa),
                to: Address::repeat_byte(0xbb),
                amount: U256::from(amount),
            },
        )
    }

    async fn watcher(
        chain: Arc<FakeChain>,
        store: Arc<InMemoryStore>,
        config: WatcherConfig,
    ) -> ChainWatcher<Arc<FakeChain>, Arc<InMemoryStore>> {
        let fetcher = EventFetcher::new(chain, Chain::L1, BRIDGE, config.batch_size)
            .await
            .unwrap();
        ChainWatcher::new(fetcher, store, config, metrics())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn clean_ingestion() {
        let chain = Arc::new(FakeChain::new(1, 110));
        chain.push_log(deposit(104, 5));
        let store = Arc::new(InMemoryStore::new());

        let watcher = watcher(chain.clone(), store.clone(), config(100)).await;
        assert_eq!(watcher.cursor().await.height, 99);

        assert_eq!(
            watcher.sync().await.unwrap(),
            SyncOutcome::Synced { height: 110 }
        );
        assert_eq!(
            watcher.cursor().await,
            SyncCursor {
                height: 110,
                hash: block_hash(0, 110),
            }
        );

        let events = store.raw_events(Chain::L1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::QueueTransaction);
        assert_eq!(events[0].message_nonce, 5);
        assert_eq!(events[0].block_number, 104);
        assert_eq!(events[0].block_timestamp, 1_700_000_000 + 104 * 12);

        assert_eq!(watcher.sync().await.unwrap(), SyncOutcome::UpToDate);
    }

    #[tokio::test]
    async fn confirmations_hold_back_the_head() {
        let chain = Arc::new(FakeChain::new(1, 110));
        chain.push_log(deposit(109, 1));
        let store = Arc::new(InMemoryStore::new());

        let watcher = watcher(
            chain.clone(),
            store.clone(),
            WatcherConfig {
                confirmations: 3,
                ..config(100)
            },
        )
        .await;

        assert_eq!(
            watcher.sync().await.unwrap(),
            SyncOutcome::Synced { height: 107 }
        );
        assert!(store.raw_events(Chain::L1).is_empty());

        chain.extend(0, 111, 112);
        chain.set_head(112);

        assert_eq!(
            watcher.sync().await.unwrap(),
            SyncOutcome::Synced { height: 109 }
        );
        assert_eq!(store.raw_events(Chain::L1).len(), 1);
    }

    #[tokio::test]
    async fn ranges_are_processed_in_sub_batches() {
        let chain = Arc::new(FakeChain::new(1, 250));
        let store = Arc::new(InMemoryStore::new());

        let watcher = watcher(
            chain.clone(),
            store,
            WatcherConfig {
                batch_size: 50,
                ..config(1)
            },
        )
        .await;

        watcher.sync().await.unwrap();

        assert_eq!(chain.log_queries(), 5);
        assert_eq!(watcher.cursor().await.height, 250);
    }

    #[tokio::test]
    async fn reorg_rolls_the_cursor_back() {
        let chain = Arc::new(FakeChain::new(1, 200));
        let store = Arc::new(InMemoryStore::new());

        let watcher = watcher(chain.clone(), store.clone(), config(201)).await;
        assert_eq!(
            watcher.cursor().await,
            SyncCursor {
                height: 200,
                hash: block_hash(0, 200),
            }
        );

        // Blocks from 137 on are replaced, block 201 no longer builds on the known 200.
        chain.extend(1, 137, 215);
        chain.set_head(215);
        chain.push_log(deposit(150, 1));
        chain.push_log(deposit(205, 2));

        assert_eq!(
            watcher.sync().await.unwrap(),
            SyncOutcome::Reorg {
                at: 201,
                resync_height: 136,
            }
        );
        assert_eq!(
            watcher.cursor().await,
            SyncCursor {
                height: 136,
                hash: block_hash(0, 136),
            }
        );
        assert!(store.raw_events(Chain::L1).is_empty());

        // The next pass resumes from 137 on the new fork.
        assert_eq!(
            watcher.sync().await.unwrap(),
            SyncOutcome::Synced { height: 215 }
        );
        assert_eq!(watcher.cursor().await.hash, block_hash(1, 215));
        assert_eq!(
            store
                .raw_events(Chain::L1)
                .iter()
                .map(|e| e.message_nonce)
                .collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn reorg_orphans_events_of_replaced_blocks() {
        let chain = Arc::new(FakeChain::new(1, 200));
        chain.push_log(deposit(150, 1));
        chain.push_log(deposit(180, 2));
        let store = Arc::new(InMemoryStore::new());

        let watcher = watcher(chain.clone(), store.clone(), config(100)).await;
        watcher.sync().await.unwrap();
        assert_eq!(store.raw_events(Chain::L1).len(), 2);

        // On the new fork nonce 1 carries another transfer in another block,
        // nonce 2 is included again unchanged.
        chain.extend(1, 137, 215);
        chain.set_head(215);
        chain.remove_logs(137, 215);
        chain.push_log(transfer(160, 1, 77));
        chain.push_log(deposit(180, 2));

        assert_eq!(
            watcher.sync().await.unwrap(),
            SyncOutcome::Reorg {
                at: 201,
                resync_height: 136,
            }
        );
        assert!(store.raw_events(Chain::L1).is_empty());
        assert_eq!(store.deleted_raw_events(Chain::L1), 2);
        assert_eq!(store.max_block_number(Chain::L1).await.unwrap(), None);

        assert_eq!(
            watcher.sync().await.unwrap(),
            SyncOutcome::Synced { height: 215 }
        );

        let mut events = store.raw_events(Chain::L1);
        events.sort_by_key(|e| e.message_nonce);
        assert_eq!(
            events
                .iter()
                .map(|e| (e.message_nonce, e.block_number))
                .collect::<Vec<_>>(),
            vec![(1, 160), (2, 180)]
        );
        assert_eq!(events[0].message_value, U256::from(77));
        // The replaced nonce 1 transfer stays deleted.
        assert_eq!(store.deleted_raw_events(Chain::L1), 1);
    }

    #[tokio::test]
    async fn restart_rescans_the_reorg_safe_window_idempotently() {
        let chain = Arc::new(FakeChain::new(1, 300));
        chain.push_log(deposit(250, 1));
        chain.push_log(deposit(290, 2));
        let store = Arc::new(InMemoryStore::new());

        let first = watcher(chain.clone(), store.clone(), config(200)).await;
        first.sync().await.unwrap();
        first.close();

        // The highest stored event is at 290, so 64 blocks below are rescanned.
        let second = watcher(chain.clone(), store.clone(), config(200)).await;
        assert_eq!(second.cursor().await.height, 226);

        second.sync().await.unwrap();
        assert_eq!(store.raw_events(Chain::L1).len(), 2);
    }

    #[tokio::test]
    async fn failed_batch_does_not_advance_the_cursor() {
        let chain = Arc::new(FakeChain::new(1, 120));
        let store = Arc::new(InMemoryStore::new());

        let watcher = watcher(
            chain.clone(),
            store,
            WatcherConfig {
                batch_size: 10,
                ..config(101)
            },
        )
        .await;

        // The head moves past blocks the node cannot serve yet.
        chain.set_head(125);
        assert!(watcher.sync().await.is_err());
        assert_eq!(watcher.cursor().await.height, 120);

        chain.extend(0, 121, 125);
        assert_eq!(
            watcher.sync().await.unwrap(),
            SyncOutcome::Synced { height: 125 }
        );
    }
}
