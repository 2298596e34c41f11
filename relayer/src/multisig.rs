//! Messages as delivered to the destination bridge and the multisignature
//! proof upward deliveries carry.

use ethers::{
    abi::{self, Token},
    signers::LocalWallet,
    types::{Bytes, Signature, H256, U256},
    utils::keccak256,
};
use storage::RawBridgeEvent;

use crate::{Error, Result};

/// A `(uint32 payloadType, bytes payload, uint256 nonce)` tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Payload type.
    pub payload_type: u32,

    /// Encoded payload.
    pub payload: Bytes,

    /// Bridge nonce.
    pub nonce: U256,
}

impl RelayMessage {
    /// The message carried by an originating event.
    pub fn from_event(event: &RawBridgeEvent) -> Self {
        Self {
            payload_type: event.message_payload_type,
            payload: event.message_payload.clone(),
            nonce: event.message_nonce.into(),
        }
    }

    fn fields(&self) -> Vec<Token> {
        vec![
            Token::Uint(self.payload_type.into()),
            Token::Bytes(self.payload.to_vec()),
            Token::Uint(self.nonce),
        ]
    }

    /// The message as a call argument.
    pub fn to_token(&self) -> Token {
        Token::Tuple(self.fields())
    }

    /// Hash identifying the message on both chains.
    pub fn hash(&self) -> H256 {
        chain_events::message_hash(self.payload_type, &self.payload, self.nonce)
    }
}

/// Bytes signed by the upward multisig: the array offset, the array length,
/// the offset of the first tuple, then every message ABI-encoded back to back.
pub fn encode_upward_preimage(messages: &[RelayMessage]) -> Vec<u8> {
    let mut preimage = abi::encode(&[
        Token::Uint(U256::from(32)),
        Token::Uint(U256::from(messages.len())),
        Token::Uint(U256::from(32)),
    ]);

    for message in messages {
        preimage.extend(abi::encode(&message.fields()));
    }

    preimage
}

/// Keccak-256 of [`encode_upward_preimage`].
pub fn upward_digest(messages: &[RelayMessage]) -> H256 {
    H256(keccak256(encode_upward_preimage(messages)))
}

/// Signs `digest` with every signer, keeping the signers' order.
pub fn sign_digest(signers: &[LocalWallet], digest: H256) -> Result<Vec<Signature>> {
    signers
        .iter()
        .map(|signer| signer.sign_hash(digest).map_err(Error::from))
        .collect()
}
