//! # Tether Binary
//!
//! Codec for the binary stanza format of the tether wire protocol.
//!
//! A serialized [`Node`] is a stream of prefix tokens drawn from a fixed
//! dictionary: structural markers (lists, byte strings, addresses, packed
//! strings) and one- or two-byte references into a two-level token table.
//! The transport layer encrypts the [`encode::marshal`] output whole; the
//! flag byte in front of the tree pins the dictionary version and marks
//! zlib-compressed payloads.
//!
//! ```ignore
//! use tether_binary::{Node, encode, decode};
//!
//! let ping = Node::new("iq").attr("type", "get").attr("id", "1");
//! let bytes = encode::encode(&ping)?;
//! assert_eq!(decode::decode(&bytes)?, ping);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod decode;
pub mod encode;
pub mod error;
pub mod jid;
pub mod node;
pub mod token;

pub use decode::{decode, unmarshal, unpack};
pub use encode::{encode, marshal};
pub use error::{DecodeError, EncodeError, JidParseError};
pub use jid::{Jid, DEFAULT_USER_SERVER, GROUP_SERVER, LID_SERVER, SERVER_JID};
pub use node::{AttrValue, Attrs, Node, NodeContent};

/// Token dictionary version this build speaks, carried in the high nibble
/// of every payload flag byte and in the connection header.
pub const DICT_VERSION: u8 = 3;
