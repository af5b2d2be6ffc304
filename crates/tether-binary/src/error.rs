//! Error types for the binary node codec.

use thiserror::Error;

/// Errors produced while encoding a [`crate::Node`].
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A node carries more attributes than the wire format can express.
    #[error("too many attributes: {0} (max 256)")]
    AttrCountOverflow(usize),

    /// A string or byte payload exceeds the 32-bit length field.
    #[error("string too long: {0} bytes")]
    StringTooLong(usize),

    /// A value has no representation in the wire format.
    #[error("unserializable value: {0}")]
    UnserializableValue(String),
}

/// Errors produced while decoding wire bytes into a [`crate::Node`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Input ended before the structure it promised.
    #[error("truncated input: needed {needed} more bytes")]
    Truncated {
        /// How many additional bytes were required.
        needed: usize,
    },

    /// A token byte outside the dictionary or used in an invalid position.
    #[error("unknown token: 0x{0:02X}")]
    UnknownToken(u8),

    /// A list header with an impossible element count.
    #[error("invalid list length: {0}")]
    InvalidListLength(usize),

    /// A JID whose parts do not form a valid address.
    #[error("invalid JID: {0}")]
    InvalidJid(String),

    /// Payload flag byte advertises an unsupported dictionary version.
    #[error("protocol version mismatch: got {got}, supported {supported}")]
    ProtocolVersion {
        /// Version advertised by the peer.
        got: u8,
        /// Version this build speaks.
        supported: u8,
    },

    /// Zlib-compressed payload failed to inflate.
    #[error("corrupt compressed payload: {0}")]
    Inflate(#[from] std::io::Error),
}

/// Failure to parse a textual JID.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed JID: {0}")]
pub struct JidParseError(pub String);
