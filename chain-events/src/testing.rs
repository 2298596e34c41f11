//! Builders of bridge logs as a node would return them.

use ethers::{
    abi::{self, Token},
    contract::EthEvent,
    types::{Address, Log, H256, U256, U64},
};
use storage::Chain;

use crate::{
    events::{
        QueueTransactionFilter, RelayedDownwardMessageFilter, RelayedUpwardMessageFilter,
        SentMessageFilter,
    },
    payload::BridgePayload,
};

fn log(address: Address, block_number: u64, tx_hash: H256, topics: Vec<H256>, data: Vec<u8>) -> Log {
    Log {
        address,
        topics,
        data: data.into(),
        block_number: Some(U64::from(block_number)),
        transaction_hash: Some(tx_hash),
        log_index: Some(U256::zero()),
        removed: Some(false),
        ..Default::default()
    }
}

/// A `QueueTransaction` (L1) or `SentMessage` (L2) log carrying `payload`.
pub fn origination_log(
    chain: Chain,
    bridge: Address,
    block_number: u64,
    tx_hash: H256,
    nonce: u64,
    payload: &BridgePayload,
) -> Log {
    let topic0 = match chain {
        Chain::L1 => QueueTransactionFilter::signature(),
        Chain::L2 => SentMessageFilter::signature(),
    };
    let value = match payload {
        BridgePayload::NativeCoin { amount, .. } => *amount,
        _ => U256::zero(),
    };

    let data = abi::encode(&[
        Token::Uint(value),
        Token::Uint(U256::from(payload.payload_type() as u32)),
        Token::Bytes(payload.encode().to_vec()),
    ]);

    log(
        bridge,
        block_number,
        tx_hash,
        vec![
            topic0,
            H256::from(payload.from()),
            H256::from(payload.to()),
            H256::from_low_u64_be(nonce),
        ],
        data,
    )
}

/// A `RelayedUpwardMessage` (L1) or `RelayedDownwardMessage` (L2) log.
pub fn confirmation_log(
    chain: Chain,
    bridge: Address,
    block_number: u64,
    tx_hash: H256,
    message_hash: H256,
    nonce: u64,
) -> Log {
    let topic0 = match chain {
        Chain::L1 => RelayedUpwardMessageFilter::signature(),
        Chain::L2 => RelayedDownwardMessageFilter::signature(),
    };

    log(
        bridge,
        block_number,
        tx_hash,
        vec![topic0, message_hash, H256::from_low_u64_be(nonce)],
        vec![],
    )
}
