//! Bridge data model shared by the watchers, the checker and the relayers.

use std::fmt;

use ethers::types::{Address, Bytes, H256, U256};

/// One of the two chains connected by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {
    /// The parent chain.
    L1,
    /// The child chain.
    L2,
}

impl Chain {
    /// A short lowercase name, used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::L1 => "l1",
            Chain::L2 => "l2",
        }
    }

    /// The chain on the other side of the bridge.
    pub fn counterpart(&self) -> Chain {
        match self {
            Chain::L1 => Chain::L2,
            Chain::L2 => Chain::L1,
        }
    }

    /// The event type that originates a message on this chain.
    pub fn origination_event(&self) -> EventType {
        match self {
            Chain::L1 => EventType::QueueTransaction,
            Chain::L2 => EventType::SentMessage,
        }
    }

    /// The event type confirming that a message from the counterpart chain
    /// has been executed on this chain.
    pub fn confirmation_event(&self) -> EventType {
        match self {
            Chain::L1 => EventType::L1Relayed,
            Chain::L2 => EventType::L2Relayed,
        }
    }

    /// Both event types watched on this chain.
    pub fn watched_events(&self) -> [EventType; 2] {
        [self.origination_event(), self.confirmation_event()]
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l1" => Ok(Chain::L1),
            "l2" => Ok(Chain::L2),
            other => Err(format!("unknown chain {other}")),
        }
    }
}

/// Kind of a bridge log stored as a [`RawBridgeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "bridge_event_type")]
pub enum EventType {
    /// A message was queued on L1 for delivery to L2.
    #[sqlx(rename = "queue_transaction")]
    QueueTransaction,
    /// An upward message was executed on L1.
    #[sqlx(rename = "l1_relayed")]
    L1Relayed,
    /// A message was sent on L2 for delivery to L1.
    #[sqlx(rename = "sent_message")]
    SentMessage,
    /// A downward message was executed on L2.
    #[sqlx(rename = "l2_relayed")]
    L2Relayed,
}

impl EventType {
    /// The chain emitting events of this type.
    pub fn chain(&self) -> Chain {
        match self {
            EventType::QueueTransaction | EventType::L1Relayed => Chain::L1,
            EventType::SentMessage | EventType::L2Relayed => Chain::L2,
        }
    }

    /// Whether the event starts a cross-chain message rather than confirming one.
    pub fn is_origination(&self) -> bool {
        matches!(self, EventType::QueueTransaction | EventType::SentMessage)
    }

    /// Metric and log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::QueueTransaction => "queue_transaction",
            EventType::L1Relayed => "l1_relayed",
            EventType::SentMessage => "sent_message",
            EventType::L2Relayed => "l2_relayed",
        }
    }
}

/// Asset kind carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "token_type")]
pub enum TokenType {
    /// Not known, e.g. for confirmation events.
    #[sqlx(rename = "unknown")]
    Unknown,
    /// The chain's native coin.
    #[sqlx(rename = "native_coin")]
    NativeCoin,
    /// Fungible token.
    #[sqlx(rename = "erc20")]
    Erc20,
    /// Non-fungible token.
    #[sqlx(rename = "erc721")]
    Erc721,
    /// Multi-token.
    #[sqlx(rename = "erc1155")]
    Erc1155,
    /// The bridge protocol's own token.
    #[sqlx(rename = "protocol_token")]
    ProtocolToken,
}

/// Reconciliation stage of a [`RawBridgeEvent`], advanced only by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "check_status")]
pub enum CheckStatus {
    /// Freshly ingested.
    #[sqlx(rename = "unchecked")]
    Unchecked,
    /// The nonce range containing the event is known to be complete.
    #[sqlx(rename = "checked_step1")]
    CheckedStep1,
    /// A cross message for the event exists.
    #[sqlx(rename = "checked_step2")]
    CheckedStep2,
}

/// Relay stage of a [`RawBridgeEvent`], advanced only by the relayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "process_status")]
pub enum ProcessStatus {
    #[sqlx(rename = "unprocessed")]
    #[allow(missing_docs)]
    UnProcessed,
    #[sqlx(rename = "processed")]
    #[allow(missing_docs)]
    Processed,
    /// Relaying failed; retried while `process_attempts` is below the configured cap.
    #[sqlx(rename = "process_failed")]
    ProcessFailed,
}

/// Side a [`CrossMessage`] originated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "message_type")]
pub enum MessageType {
    /// Originated on L1, executed on L2.
    #[sqlx(rename = "l1_message")]
    L1Message,
    /// Originated on L2, executed on L1.
    #[sqlx(rename = "l2_message")]
    L2Message,
}

impl MessageType {
    /// Message type of messages originating on `chain`.
    pub fn originating_on(chain: Chain) -> Self {
        match chain {
            Chain::L1 => MessageType::L1Message,
            Chain::L2 => MessageType::L2Message,
        }
    }
}

/// User-facing direction of a [`CrossMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "tx_type")]
pub enum TxType {
    /// L1 to L2.
    #[sqlx(rename = "deposit")]
    Deposit,
    /// L2 to L1.
    #[sqlx(rename = "withdraw")]
    Withdraw,
}

/// Delivery status of a [`CrossMessage`].
///
/// `Sent` may move to any other status; every other status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "tx_status")]
pub enum TxStatus {
    #[sqlx(rename = "sent")]
    #[allow(missing_docs)]
    Sent,
    #[sqlx(rename = "consumed")]
    #[allow(missing_docs)]
    Consumed,
    #[sqlx(rename = "dropped")]
    #[allow(missing_docs)]
    Dropped,
    #[sqlx(rename = "ready_for_consumption")]
    #[allow(missing_docs)]
    ReadyForConsumption,
}

/// One on-chain bridge log of interest.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct RawBridgeEvent {
    /// Row id, `0` until stored.
    pub id: i64,
    pub chain_id: u64,
    pub event_type: EventType,
    pub token_type: TokenType,
    pub tx_hash: H256,
    pub block_number: u64,
    pub block_timestamp: u64,
    /// Asset owner on the source side, zero for confirmation events.
    pub sender: Address,
    /// Asset receiver on the destination side, zero for confirmation events.
    pub receiver: Address,
    pub message_hash: H256,
    pub message_payload_type: u32,
    pub message_payload: Bytes,
    pub message_nonce: u64,
    pub message_from: Address,
    pub message_to: Address,
    pub message_value: U256,
    pub check_status: CheckStatus,
    pub process_status: ProcessStatus,
    pub process_attempts: u32,
    pub fail_reason: Option<String>,
}

/// Canonical record of one bridge transfer spanning both chains.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct CrossMessage {
    /// Row id, `0` until stored.
    pub id: i64,
    pub message_hash: H256,
    pub message_type: MessageType,
    pub tx_type: TxType,
    pub tx_status: TxStatus,
    pub token_type: TokenType,
    pub sender: Address,
    pub receiver: Address,
    pub l1_token_address: Address,
    pub l2_token_address: Address,
    pub token_ids: Vec<U256>,
    pub token_amounts: Vec<U256>,
    pub l1_tx_hash: Option<H256>,
    pub l1_block_number: Option<u64>,
    pub l2_tx_hash: Option<H256>,
    pub l2_block_number: Option<u64>,
    /// Transaction submitted by the relayer on the destination chain.
    pub relay_tx_hash: Option<H256>,
    pub message_from: Address,
    pub message_to: Address,
    pub message_value: U256,
    pub message_payload: Bytes,
    pub message_payload_type: u32,
    pub message_nonce: u64,
    /// Upward messages only; in signer order.
    pub multi_sign_proof: Vec<Bytes>,
    pub block_timestamp: u64,
}

/// A contiguous nonce range missing from storage.
///
/// Block bounds are the blocks of the stored neighbours; a side without a stored
/// neighbour is reported as `0` (start) or `u64::MAX` (end).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start_nonce: u64,
    pub end_nonce: u64,
    pub start_block: u64,
    pub end_block: u64,
}

/// Identity of a message whose execution was observed on its destination chain.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayedMessage {
    pub message_hash: H256,
    /// Type of the message being confirmed, i.e. of its origin side.
    pub message_type: MessageType,
    /// Transaction executing the message on the destination chain.
    pub tx_hash: H256,
    pub block_number: u64,
}

impl RelayedMessage {
    /// Builds the relayed message identity out of a confirmation event.
    ///
    /// Returns `None` for origination events.
    pub fn from_confirmation(event: &RawBridgeEvent) -> Option<Self> {
        if event.event_type.is_origination() {
            return None;
        }

        Some(Self {
            message_hash: event.message_hash,
            message_type: MessageType::originating_on(event.event_type.chain().counterpart()),
            tx_hash: event.tx_hash,
            block_number: event.block_number,
        })
    }
}
