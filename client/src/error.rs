use ethers::{abi, providers::ProviderError, types::H256};

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error(transparent)]
    ProviderError(#[from] ProviderError),

    #[error(transparent)]
    Abi(#[from] abi::Error),

    #[error("Failed to load contract ABI: {0}")]
    AbiLoad(String),

    #[error("Call to {method} reverted: {reason}")]
    Reverted { method: String, reason: String },

    #[error("Middleware error {0}")]
    Middleware(String),

    #[error("Block {0} is not known to the node")]
    MissingBlock(u64),

    #[error("Transaction for {0} was dropped without a receipt")]
    MissingReceipt(String),

    #[error("Transaction {0:?} was mined but failed")]
    TxFailed(H256),

    #[error("Transaction for {0} was not mined in time")]
    Timedout(String),
}

impl Error {
    /// The revert reason reported by the node, if the error is a revert.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Error::Reverted { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Whether the failure lies with the node or the connection to it rather
    /// than with the call itself, so that repeating the call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ProviderError(_)
                | Error::Middleware(_)
                | Error::MissingBlock(_)
                | Error::MissingReceipt(_)
                | Error::Timedout(_)
        )
    }
}

/// The client result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_failures_are_transient() {
        assert!(Error::Middleware("connection refused".into()).is_transient());
        assert!(Error::Timedout("receiveDownwardMessages".into()).is_transient());
        assert!(Error::MissingReceipt("receiveDownwardMessages".into()).is_transient());
        assert!(Error::MissingBlock(7).is_transient());

        assert!(!Error::Reverted {
            method: "receiveDownwardMessages".into(),
            reason: "execution reverted: paused".into(),
        }
        .is_transient());
        assert!(!Error::TxFailed(H256::zero()).is_transient());
        assert!(!Error::AbiLoad("bridge.json".into()).is_transient());
    }
}
