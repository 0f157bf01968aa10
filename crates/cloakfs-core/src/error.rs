use thiserror::Error;

pub type CloakResult<T> = Result<T, CloakError>;

#[derive(Debug, Error)]
pub enum CloakError {
    #[error("crypto engine error: {0}")]
    Crypto(String),

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("share registry error: {0}")]
    ShareRegistry(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
