use ethers::types::H256;

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("Unknown payload type {0}")]
    UnknownPayloadType(u32),

    #[error("Malformed payload of type {payload_type}: {reason}")]
    MalformedPayload { payload_type: u32, reason: String },

    #[error("Malformed {event} log in tx {tx_hash:?}: {reason}")]
    MalformedLog {
        event: &'static str,
        tx_hash: Option<H256>,
        reason: String,
    },

    #[error("No timestamp known for block {0}")]
    UnknownTimestamp(u64),
}

/// The crate result type.
pub type Result<T> = std::result::Result<T, Error>;
