use chain_events::BridgePayload;
use ethers::types::{Bytes, H256};
use storage::{Chain, CrossMessage, MessageType, RawBridgeEvent, TxStatus, TxType};

/// The `Sent` cross message for a relayed originating event.
pub fn cross_message(
    event: &RawBridgeEvent,
    payload: &BridgePayload,
    relay_tx_hash: Option<H256>,
    multi_sign_proof: Vec<Bytes>,
) -> CrossMessage {
    let chain = event.event_type.chain();
    let (l1_token_address, l2_token_address) = payload.token_addresses();

    let (tx_type, l1_tx_hash, l1_block_number, l2_tx_hash, l2_block_number) = match chain {
        Chain::L1 => (
            TxType::Deposit,
            Some(event.tx_hash),
            Some(event.block_number),
            None,
            None,
        ),
        Chain::L2 => (
            TxType::Withdraw,
            None,
            None,
            Some(event.tx_hash),
            Some(event.block_number),
        ),
    };

    CrossMessage {
        id: 0,
        message_hash: event.message_hash,
        message_type: MessageType::originating_on(chain),
        tx_type,
        tx_status: TxStatus::Sent,
        token_type: payload.payload_type().token_type(),
        sender: payload.from(),
        receiver: payload.to(),
        l1_token_address,
        l2_token_address,
        token_ids: payload.token_ids(),
        token_amounts: payload.token_amounts(),
        l1_tx_hash,
        l1_block_number,
        l2_tx_hash,
        l2_block_number,
        relay_tx_hash,
        message_from: event.message_from,
        message_to: event.message_to,
        message_value: event.message_value,
        message_payload: event.message_payload.clone(),
        message_payload_type: event.message_payload_type,
        message_nonce: event.message_nonce,
        multi_sign_proof,
        block_timestamp: event.block_timestamp,
    }
}
