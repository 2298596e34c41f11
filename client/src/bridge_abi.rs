//! ABI of the bridge contracts deployed on both chains.

use std::path::Path;

use ethers::abi::{parse_abi, Abi};

use crate::{Error, Result};

/// Human-readable ABI of the bridge functions and events the relayer relies on.
pub const DEFAULT_BRIDGE_ABI: &[&str] = &[
    "event QueueTransaction(address indexed sender, address indexed target, uint256 value, uint256 indexed nonce, uint32 payloadType, bytes payload)",
    "event SentMessage(address indexed sender, address indexed target, uint256 value, uint256 indexed nonce, uint32 payloadType, bytes payload)",
    "event RelayedUpwardMessage(bytes32 indexed messageHash, uint256 indexed nonce)",
    "event RelayedDownwardMessage(bytes32 indexed messageHash, uint256 indexed nonce)",
    "function receiveDownwardMessages((uint32,bytes,uint256)[] messages)",
    "function receiveUpwardMessages((uint32,bytes,uint256)[] messages, bytes[] signatures)",
    "function executedMessages(bytes32 messageHash) view returns (bool)",
];

/// Parses [`DEFAULT_BRIDGE_ABI`].
pub fn default_abi() -> Result<Abi> {
    parse_abi(DEFAULT_BRIDGE_ABI).map_err(|e| Error::AbiLoad(e.to_string()))
}

/// Loads a JSON ABI, e.g. a compiler artifact's `abi` field, from `path`.
pub fn load(path: &Path) -> Result<Abi> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::AbiLoad(format!("{}: {e}", path.display())))?;

    serde_json::from_str(&raw).map_err(|e| Error::AbiLoad(format!("{}: {e}", path.display())))
}
