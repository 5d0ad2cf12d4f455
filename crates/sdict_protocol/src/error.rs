//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while framing or parsing protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended in the middle of a field.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Offset where more bytes were expected.
        offset: usize,
    },

    /// A varint did not terminate within its maximum width.
    #[error("malformed varint at offset {offset}")]
    MalformedVarint {
        /// Offset of the first varint byte.
        offset: usize,
    },

    /// A value is too large to be encoded as a varint.
    #[error("value {value} does not fit in a varint")]
    VarintOverflow {
        /// The rejected value.
        value: usize,
    },

    /// The encrypted payload does not fit in the 1-byte length field.
    #[error("encrypted payload of {len} bytes exceeds {max} bytes")]
    PacketTooLarge {
        /// Encrypted length.
        len: usize,
        /// Maximum encrypted length.
        max: usize,
    },

    /// A packet is shorter than its fixed header.
    #[error("packet of {len} bytes is shorter than the header")]
    PacketTooShort {
        /// Length of the rejected packet.
        len: usize,
    },

    /// The header length byte disagrees with the body size.
    #[error("packet declares {declared} payload bytes but carries {actual}")]
    LengthMismatch {
        /// Length from the header.
        declared: usize,
        /// Actual body length.
        actual: usize,
    },

    /// Unknown command code.
    #[error("unknown command code {0}")]
    UnknownCommand(u8),
}
