#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error(transparent)]
    StorageError(#[from] storage::Error),

    #[error(transparent)]
    ClientError(#[from] client::Error),

    #[error(transparent)]
    DecodeError(#[from] chain_events::Error),
}

/// The crate result type.
pub type Result<T> = std::result::Result<T, Error>;
