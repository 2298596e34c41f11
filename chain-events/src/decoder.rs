//! Turning bridge logs into [`RawBridgeEvent`]s.

use std::collections::HashMap;

use ethers::{
    abi::{self, RawLog, Token},
    contract::EthLogDecode,
    types::{Address, Bytes, Log, H256, U256},
    utils::keccak256,
};
use storage::{
    Chain, CheckStatus, EventType, ProcessStatus, RawBridgeEvent, TokenType,
};

use crate::{
    events::{watched_topics, L1BridgeEvents, L2BridgeEvents},
    metrics::CHAIN_EVENTS_METRICS,
    payload::BridgePayload,
    Error, Result,
};

/// Hash identifying a message on both chains:
/// `keccak256(abi.encode(uint32 payloadType, bytes payload, uint256 nonce))`.
pub fn message_hash(payload_type: u32, payload: &[u8], nonce: U256) -> H256 {
    H256(keccak256(abi::encode(&[
        Token::Uint(payload_type.into()),
        Token::Bytes(payload.to_vec()),
        Token::Uint(nonce),
    ])))
}

struct LogMeta {
    chain_id: u64,
    tx_hash: H256,
    block_number: u64,
    block_timestamp: u64,
}

struct Message {
    event_type: EventType,
    sender: Address,
    target: Address,
    value: U256,
    nonce: U256,
    payload_type: u32,
    payload: Bytes,
}

fn nonce_to_u64(event: &'static str, tx_hash: H256, nonce: U256) -> Result<u64> {
    if nonce > U256::from(u64::MAX) {
        return Err(Error::MalformedLog {
            event,
            tx_hash: Some(tx_hash),
            reason: format!("nonce {nonce} out of range"),
        });
    }
    Ok(nonce.as_u64())
}

fn origination_event(meta: &LogMeta, m: Message) -> Result<RawBridgeEvent> {
    let payload = BridgePayload::decode(m.payload_type, &m.payload)?;

    Ok(RawBridgeEvent {
        id: 0,
        chain_id: meta.chain_id,
        event_type: m.event_type,
        token_type: payload.payload_type().token_type(),
        tx_hash: meta.tx_hash,
        block_number: meta.block_number,
        block_timestamp: meta.block_timestamp,
        sender: payload.from(),
        receiver: payload.to(),
        message_hash: message_hash(m.payload_type, &m.payload, m.nonce),
        message_payload_type: m.payload_type,
        message_nonce: nonce_to_u64(m.event_type.as_str(), meta.tx_hash, m.nonce)?,
        message_payload: m.payload,
        message_from: m.sender,
        message_to: m.target,
        message_value: m.value,
        check_status: CheckStatus::Unchecked,
        process_status: ProcessStatus::UnProcessed,
        process_attempts: 0,
        fail_reason: None,
    })
}

fn confirmation_event(
    meta: &LogMeta,
    event_type: EventType,
    message_hash: H256,
    nonce: U256,
) -> Result<RawBridgeEvent> {
    Ok(RawBridgeEvent {
        id: 0,
        chain_id: meta.chain_id,
        event_type,
        token_type: TokenType::Unknown,
        tx_hash: meta.tx_hash,
        block_number: meta.block_number,
        block_timestamp: meta.block_timestamp,
        sender: Address::zero(),
        receiver: Address::zero(),
        message_hash,
        message_payload_type: 0,
        message_payload: Bytes::default(),
        message_nonce: nonce_to_u64(event_type.as_str(), meta.tx_hash, nonce)?,
        message_from: Address::zero(),
        message_to: Address::zero(),
        message_value: U256::zero(),
        check_status: CheckStatus::Unchecked,
        process_status: ProcessStatus::UnProcessed,
        process_attempts: 0,
        fail_reason: None,
    })
}

/// Decodes a log emitted by the bridge contract on `chain`.
///
/// Returns `Ok(None)` for removed logs and logs of events the bridge relayer
/// does not follow.
///
/// # Arguments
///
/// * `chain`: The chain the log was emitted on
/// * `chain_id`: Id of that chain
/// * `log`: The log
/// * `timestamps`: Timestamps of the blocks the logs were fetched from
pub fn decode_log(
    chain: Chain,
    chain_id: u64,
    log: &Log,
    timestamps: &HashMap<u64, u64>,
) -> Result<Option<RawBridgeEvent>> {
    if log.removed == Some(true) {
        return Ok(None);
    }

    let Some(topic0) = log.topics.first() else {
        CHAIN_EVENTS_METRICS.foreign_logs.inc();
        return Ok(None);
    };

    if !watched_topics(chain).contains(topic0) {
        CHAIN_EVENTS_METRICS.foreign_logs.inc();
        return Ok(None);
    }

    let malformed = |reason: &str| Error::MalformedLog {
        event: chain.origination_event().as_str(),
        tx_hash: log.transaction_hash,
        reason: reason.to_string(),
    };

    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| malformed("missing transaction hash"))?;
    let block_number = log
        .block_number
        .ok_or_else(|| malformed("missing block number"))?
        .as_u64();
    let block_timestamp = *timestamps
        .get(&block_number)
        .ok_or(Error::UnknownTimestamp(block_number))?;

    let meta = LogMeta {
        chain_id,
        tx_hash,
        block_number,
        block_timestamp,
    };
    let raw_log = RawLog::from(log.clone());

    let event = match chain {
        Chain::L1 => match L1BridgeEvents::decode_log(&raw_log) {
            Ok(L1BridgeEvents::QueueTransaction(e)) => origination_event(
                &meta,
                Message {
                    event_type: EventType::QueueTransaction,
                    sender: e.sender,
                    target: e.target,
                    value: e.value,
                    nonce: e.nonce,
                    payload_type: e.payload_type,
                    payload: e.payload,
                },
            ),
            Ok(L1BridgeEvents::RelayedUpwardMessage(e)) => {
                confirmation_event(&meta, EventType::L1Relayed, e.message_hash, e.nonce)
            }
            Err(e) => Err(malformed(&e.to_string())),
        },
        Chain::L2 => match L2BridgeEvents::decode_log(&raw_log) {
            Ok(L2BridgeEvents::SentMessage(e)) => origination_event(
                &meta,
                Message {
                    event_type: EventType::SentMessage,
                    sender: e.sender,
                    target: e.target,
                    value: e.value,
                    nonce: e.nonce,
                    payload_type: e.payload_type,
                    payload: e.payload,
                },
            ),
            Ok(L2BridgeEvents::RelayedDownwardMessage(e)) => {
                confirmation_event(&meta, EventType::L2Relayed, e.message_hash, e.nonce)
            }
            Err(e) => Err(malformed(&e.to_string())),
        },
    };

    match event {
        Ok(event) => {
            CHAIN_EVENTS_METRICS.decoded[&event.event_type.as_str()].inc();
            Ok(Some(event))
        }
        Err(e) => {
            CHAIN_EVENTS_METRICS.malformed_logs.inc();
            tracing::error!("failed to decode {chain} bridge log in tx {tx_hash:?}: {e}");
            Err(e)
        }
    }
}
