use std::collections::{BTreeSet, HashMap};

use client::EventSource;
use ethers::types::{Address, Log};
use futures::future::join_all;
use storage::{Chain, RawBridgeEvent};

use crate::Result;

/// Fetches and decodes the bridge events of one chain over block ranges.
///
/// Shared by the [`ChainWatcher`](crate::ChainWatcher) and by the checker's
/// gap backfill.
#[derive(Debug)]
pub struct EventFetcher<S> {
    source: S,
    chain: Chain,
    chain_id: u64,
    bridge_address: Address,
    batch_size: u64,
}

impl<S: EventSource> EventFetcher<S> {
    /// Create a new `EventFetcher`, querying the chain id from `source`.
    ///
    /// # Arguments
    ///
    /// * `source`: Client of the chain
    /// * `chain`: Which side of the bridge `source` is connected to
    /// * `bridge_address`: Address of the bridge contract on that chain
    /// * `batch_size`: Maximal number of blocks to query logs for at once
    pub async fn new(
        source: S,
        chain: Chain,
        bridge_address: Address,
        batch_size: u64,
    ) -> Result<Self> {
        let chain_id = source.chain_id().await?;

        Ok(Self {
            source,
            chain,
            chain_id,
            bridge_address,
            batch_size: batch_size.max(1),
        })
    }

    /// The chain client.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The chain events are fetched from.
    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Maximal number of blocks queried at once.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Bridge events in `[from, to]`, fetching the headers of the blocks
    /// containing them for timestamps.
    pub async fn fetch_events(&self, from: u64, to: u64) -> Result<Vec<RawBridgeEvent>> {
        let mut events = vec![];
        let mut chunk_start = from;

        while chunk_start <= to {
            let chunk_end = chunk_start.saturating_add(self.batch_size - 1).min(to);

            let logs = self.logs(chunk_start, chunk_end).await?;

            let blocks: BTreeSet<u64> = logs
                .iter()
                .filter_map(|l| l.block_number.map(|n| n.as_u64()))
                .collect();

            let timestamps = join_all(blocks.into_iter().map(|n| self.source.header_by_number(n)))
                .await
                .into_iter()
                .map(|h| h.map(|h| (h.number, h.timestamp)))
                .collect::<client::Result<HashMap<_, _>>>()?;

            events.extend(self.decode(&logs, &timestamps)?);

            if chunk_end == u64::MAX {
                break;
            }
            chunk_start = chunk_end + 1;
        }

        Ok(events)
    }

    /// Bridge events in `[from, to]` given the timestamps of all blocks in the range.
    pub async fn events_in_range(
        &self,
        from: u64,
        to: u64,
        timestamps: &HashMap<u64, u64>,
    ) -> Result<Vec<RawBridgeEvent>> {
        let logs = self.logs(from, to).await?;

        self.decode(&logs, timestamps)
    }

    async fn logs(&self, from: u64, to: u64) -> Result<Vec<Log>> {
        let topics = chain_events::watched_topics(self.chain);

        Ok(self
            .source
            .filter_logs(&[self.bridge_address], &topics, from, to)
            .await?)
    }

    fn decode(&self, logs: &[Log], timestamps: &HashMap<u64, u64>) -> Result<Vec<RawBridgeEvent>> {
        let mut events = Vec::with_capacity(logs.len());

        for log in logs.iter().filter(|l| l.address == self.bridge_address) {
            if let Some(event) = chain_events::decode_log(self.chain, self.chain_id, log, timestamps)? {
                events.push(event);
            }
        }

        Ok(events)
    }
}
