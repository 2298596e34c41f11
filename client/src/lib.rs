#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

//! Interactions with the bridge chains and their on-chain contracts.

mod error;
mod metrics;

pub mod bridge_abi;
pub mod contract;

pub use contract::{AbiContract, ContractClient};
pub use error::{Error, Result};

use async_trait::async_trait;
use auto_impl::auto_impl;
use ethers::{
    providers::{JsonRpcClient, Middleware, Provider},
    types::{Address, Filter, Log, TransactionReceipt, H256},
};
use futures::future::join_all;

use metrics::CLIENT_METRICS;

/// The part of a block header the watchers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block number.
    pub number: u64,

    /// Block hash.
    pub hash: H256,

    /// Hash of the parent block.
    pub parent_hash: H256,

    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

/// Read access to a chain as needed to follow bridge events.
#[async_trait]
#[auto_impl(&, Arc, Box)]
pub trait EventSource: Send + Sync {
    /// Chain id reported by the node.
    async fn chain_id(&self) -> Result<u64>;

    /// Number of the latest block.
    async fn block_number(&self) -> Result<u64>;

    /// Header of block `number`.
    ///
    /// # Arguments
    ///
    /// * `number`: Number of the block
    async fn header_by_number(&self, number: u64) -> Result<BlockHeader>;

    /// Headers of the blocks in `[from, to]`, in ascending order.
    ///
    /// Headers are requested in parallel.
    async fn blocks_in_range(&self, from: u64, to: u64) -> Result<Vec<BlockHeader>> {
        join_all((from..=to).map(|number| self.header_by_number(number)))
            .await
            .into_iter()
            .collect()
    }

    /// Logs emitted by any of `addresses` in `[from, to]` with `topic0` among `topics`.
    async fn filter_logs(
        &self,
        addresses: &[Address],
        topics: &[H256],
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>>;

    /// Receipt of a mined transaction.
    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>>;
}

#[async_trait]
impl<P: JsonRpcClient> EventSource for Provider<P> {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.get_chainid().await?.as_u64())
    }

    async fn block_number(&self) -> Result<u64> {
        let latency = CLIENT_METRICS.call[&"eth_blockNumber"].start();
        let res = self.get_block_number().await?.as_u64();
        latency.observe();

        Ok(res)
    }

    async fn header_by_number(&self, number: u64) -> Result<BlockHeader> {
        let latency = CLIENT_METRICS.call[&"eth_getBlockByNumber"].start();
        let block = self
            .get_block(number)
            .await?
            .ok_or(Error::MissingBlock(number))?;
        latency.observe();

        Ok(BlockHeader {
            number,
            hash: block.hash.ok_or(Error::MissingBlock(number))?,
            parent_hash: block.parent_hash,
            timestamp: block.timestamp.as_u64(),
        })
    }

    async fn filter_logs(
        &self,
        addresses: &[Address],
        topics: &[H256],
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .from_block(from)
            .to_block(to)
            .address(addresses.to_vec())
            .topic0(topics.to_vec());

        let latency = CLIENT_METRICS.call[&"eth_getLogs"].start();
        let logs = self.get_logs(&filter).await?;
        latency.observe();

        Ok(logs)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(self.get_transaction_receipt(tx_hash).await?)
    }
}
