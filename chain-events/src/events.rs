//! Typed bridge contract events.

use ethers::{
    contract::EthEvent,
    types::{Address, Bytes, H256, U256},
};
use ethers_log_decode::EthLogDecode;
use storage::Chain;

/// A message queued on L1 for delivery to L2.
#[derive(Debug, Clone, PartialEq, Eq, EthEvent)]
#[ethevent(name = "QueueTransaction")]
#[allow(missing_docs)]
pub struct QueueTransactionFilter {
    #[ethevent(indexed)]
    pub sender: Address,
    #[ethevent(indexed)]
    pub target: Address,
    pub value: U256,
    #[ethevent(indexed)]
    pub nonce: U256,
    pub payload_type: u32,
    pub payload: Bytes,
}

/// A message sent on L2 for delivery to L1.
#[derive(Debug, Clone, PartialEq, Eq, EthEvent)]
#[ethevent(name = "SentMessage")]
#[allow(missing_docs)]
pub struct SentMessageFilter {
    #[ethevent(indexed)]
    pub sender: Address,
    #[ethevent(indexed)]
    pub target: Address,
    pub value: U256,
    #[ethevent(indexed)]
    pub nonce: U256,
    pub payload_type: u32,
    pub payload: Bytes,
}

/// An upward message was executed on L1.
#[derive(Debug, Clone, PartialEq, Eq, EthEvent)]
#[ethevent(name = "RelayedUpwardMessage")]
#[allow(missing_docs)]
pub struct RelayedUpwardMessageFilter {
    #[ethevent(indexed)]
    pub message_hash: H256,
    #[ethevent(indexed)]
    pub nonce: U256,
}

/// A downward message was executed on L2.
#[derive(Debug, Clone, PartialEq, Eq, EthEvent)]
#[ethevent(name = "RelayedDownwardMessage")]
#[allow(missing_docs)]
pub struct RelayedDownwardMessageFilter {
    #[ethevent(indexed)]
    pub message_hash: H256,
    #[ethevent(indexed)]
    pub nonce: U256,
}

/// Bridge events emitted on L1.
#[derive(Debug, Clone, PartialEq, Eq, EthLogDecode)]
pub enum L1BridgeEvents {
    /// A deposit was queued.
    QueueTransaction(QueueTransactionFilter),

    /// A withdrawal was executed.
    RelayedUpwardMessage(RelayedUpwardMessageFilter),
}

/// Bridge events emitted on L2.
#[derive(Debug, Clone, PartialEq, Eq, EthLogDecode)]
pub enum L2BridgeEvents {
    /// A withdrawal was sent.
    SentMessage(SentMessageFilter),

    /// A deposit was executed.
    RelayedDownwardMessage(RelayedDownwardMessageFilter),
}

/// `topic0` of the events watched on `chain`.
pub fn watched_topics(chain: Chain) -> Vec<H256> {
    match chain {
        Chain::L1 => L1BridgeEvents::signatures(),
        Chain::L2 => L2BridgeEvents::signatures(),
    }
}
