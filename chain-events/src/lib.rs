#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

//! Decoding of the bridge contract events on both chains.

mod decoder;
mod error;
mod events;
mod metrics;
mod payload;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use decoder::{decode_log, message_hash};
pub use error::{Error, Result};
pub use events::{
    watched_topics, L1BridgeEvents, L2BridgeEvents, QueueTransactionFilter,
    RelayedDownwardMessageFilter, RelayedUpwardMessageFilter, SentMessageFilter,
};
pub use payload::{BridgePayload, PayloadType};
