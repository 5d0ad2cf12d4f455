//! Error types for the dictionary engine.

use sdict_protocol::CodecError;
use thiserror::Error;

/// Result type for dictionary operations.
pub type DictResult<T> = Result<T, DictError>;

/// Result type for snapshot cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur during dictionary operations.
#[derive(Error, Debug)]
pub enum DictError {
    /// A mutation was attempted without a write password.
    #[error("no write password configured")]
    NoWriteKey,

    /// Could not connect to the server.
    #[error("failed to connect to server")]
    ConnectFailed,

    /// Could not send a command.
    #[error("failed to send command")]
    SendFailed,

    /// Could not read a reply, or the reply was malformed.
    #[error("failed to receive reply")]
    ReceiveFailed,

    /// The server acknowledged with something else than expected.
    #[error("unexpected ack: expected {expected:?}, got {actual:?}")]
    UnexpectedAck {
        /// Expected ack text.
        expected: &'static str,
        /// Received ack text, `None` if no valid ack arrived.
        actual: Option<String>,
    },

    /// The command succeeded but the channel did not close cleanly.
    #[error("failed to close connection")]
    CloseFailed,

    /// Fetch gave up after retrying.
    #[error("fetch failed after {attempts} attempts")]
    FetchFailed {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The server sent no data.
    #[error("server returned an empty payload")]
    EmptyPayload,

    /// A payload could not be decrypted.
    #[error("failed to decrypt payload")]
    Decrypt,

    /// A key or value is too large for one command packet.
    #[error("payload too large: {len} encrypted bytes, max {max}")]
    PayloadTooLarge {
        /// Encrypted length.
        len: usize,
        /// Maximum encrypted length.
        max: usize,
    },

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Snapshot cache error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The dictionary worker is not running.
    #[error("dictionary worker unavailable")]
    WorkerUnavailable,
}

impl DictError {
    /// Returns true if the failed step may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DictError::ConnectFailed | DictError::SendFailed | DictError::ReceiveFailed
        )
    }
}

/// Errors from the snapshot cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored digest has the wrong length.
    #[error("corrupt digest file: {len} bytes")]
    CorruptDigest {
        /// Length of the digest file.
        len: usize,
    },
}
