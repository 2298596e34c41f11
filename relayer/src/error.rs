use ethers::signers::WalletError;

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error(transparent)]
    StorageError(#[from] storage::Error),

    #[error(transparent)]
    ClientError(#[from] client::Error),

    #[error(transparent)]
    DecodeError(#[from] chain_events::Error),

    #[error("Failed to sign upward messages: {0}")]
    Signing(#[from] WalletError),

    #[error("Upward relaying needs at least one signer")]
    NoSigners,

    #[error("Unexpected output of {method}: {output}")]
    UnexpectedOutput { method: &'static str, output: String },
}

impl Error {
    /// Whether the delivery failed on the way to the node, leaving the message
    /// itself untried.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::ClientError(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// The crate result type.
pub type Result<T> = std::result::Result<T, Error>;
