#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error("Invalid private key in {0}")]
    PrivateKey(&'static str),

    #[error("No upward signer keys configured")]
    NoSignerKeys,
}
