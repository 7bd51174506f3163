use thiserror::Error;

#[derive(Debug, Error)]
pub enum CachetError {
    /// AEAD verification failed: the row was tampered with, or the caller
    /// supplied the wrong key. No plaintext is ever returned alongside this.
    #[error("authentication failed: ciphertext or associated data rejected")]
    Auth,

    /// A `put` targeted an address or file id that is already occupied.
    /// For random 32-byte keys this signals an entropy failure; callers
    /// must abort rather than retry with the same key.
    #[error("collision: {0}")]
    Collision(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    /// Local client state is unreadable or malformed. Unrecoverable without
    /// operator intervention; the server holds nothing that can rebuild it.
    #[error("client state error: {0}")]
    State(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CachetResult<T> = Result<T, CachetError>;
