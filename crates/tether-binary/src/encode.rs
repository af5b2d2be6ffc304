//! Node serializer.
//!
//! Output is deterministic for a given node and never carries trailing
//! padding. Strings found in the token dictionary are emitted as one- or
//! two-byte references; decimal and hex strings are nibble-packed.

use crate::error::EncodeError;
use crate::jid::{DEFAULT_USER_SERVER, LID_SERVER};
use crate::node::{AttrValue, Node, NodeContent};
use crate::token::{self, TokenRef};
use crate::{Jid, DICT_VERSION};

/// Maximum attribute count one node may carry on the wire.
const MAX_ATTRS: usize = 256;
/// Longest string the nibble/hex packers accept.
const MAX_PACKED_LEN: usize = 127 * 2;

/// Serialize a node, prefixed with the payload flag byte.
///
/// This is the form the transport encrypts: flag byte (dictionary version
/// in the high nibble) followed by the encoded tree.
///
/// # Errors
///
/// Propagates [`EncodeError`] from [`encode`].
pub fn marshal(node: &Node) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(256);
    out.push(DICT_VERSION << 4);
    Encoder { out: &mut out }.write_node(node)?;
    Ok(out)
}

/// Serialize a node without the flag byte.
///
/// # Errors
///
/// Returns [`EncodeError::AttrCountOverflow`] for nodes with more than 256
/// attributes, [`EncodeError::StringTooLong`] for byte payloads beyond the
/// 32-bit length field, and [`EncodeError::UnserializableValue`] for values
/// with no wire representation (empty tags, out-of-namespace device
/// addresses, oversized child lists).
pub fn encode(node: &Node) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(256);
    Encoder { out: &mut out }.write_node(node)?;
    Ok(out)
}

struct Encoder<'a> {
    out: &'a mut Vec<u8>,
}

impl Encoder<'_> {
    fn write_node(&mut self, node: &Node) -> Result<(), EncodeError> {
        if node.tag.is_empty() {
            return Err(EncodeError::UnserializableValue("empty tag".into()));
        }
        if node.attrs.len() > MAX_ATTRS {
            return Err(EncodeError::AttrCountOverflow(node.attrs.len()));
        }

        let has_content = !matches!(node.content, NodeContent::None);
        let size = 1 + 2 * node.attrs.len() + usize::from(has_content);
        self.write_list_size(size)?;
        self.write_string(&node.tag)?;

        for (key, value) in &node.attrs {
            if key.is_empty() {
                return Err(EncodeError::UnserializableValue("empty attribute key".into()));
            }
            self.write_string(key)?;
            match value {
                AttrValue::Text(s) => self.write_string(s)?,
                AttrValue::Jid(jid) => self.write_jid(jid)?,
            }
        }

        match &node.content {
            NodeContent::None => {}
            NodeContent::Bytes(bytes) => self.write_bytes(bytes)?,
            NodeContent::Children(children) => {
                self.write_list_size(children.len())?;
                for child in children {
                    self.write_node(child)?;
                }
            }
        }
        Ok(())
    }

    fn write_list_size(&mut self, size: usize) -> Result<(), EncodeError> {
        match size {
            0 => self.out.push(token::LIST_EMPTY),
            1..=255 => {
                self.out.push(token::LIST_8);
                self.out.push(size as u8);
            }
            256..=65535 => {
                self.out.push(token::LIST_16);
                self.out.extend_from_slice(&(size as u16).to_be_bytes());
            }
            _ => {
                return Err(EncodeError::UnserializableValue(format!(
                    "list of {size} elements"
                )))
            }
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<(), EncodeError> {
        match token::lookup(s) {
            Some(TokenRef::Single(index)) => self.out.push(index),
            Some(TokenRef::Double(dict, index)) => {
                self.out.push(token::DICTIONARY_0 + dict);
                self.out.push(index);
            }
            None if is_nibble_packable(s) => self.write_packed(token::NIBBLE_8, s, nibble_value),
            None if is_hex_packable(s) => self.write_packed(token::HEX_8, s, hex_value),
            None => self.write_bytes(s.as_bytes())?,
        }
        Ok(())
    }

    fn write_packed(&mut self, marker: u8, s: &str, value_of: fn(u8) -> u8) {
        self.out.push(marker);
        let odd = s.len() % 2 == 1;
        self.out.push(u8::from(odd) << 7 | (s.len().div_ceil(2)) as u8);
        let bytes = s.as_bytes();
        for pair in bytes.chunks(2) {
            let hi = value_of(pair[0]);
            let lo = if pair.len() == 2 { value_of(pair[1]) } else { 0x0F };
            self.out.push(hi << 4 | lo);
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        match bytes.len() {
            0..=255 => {
                self.out.push(token::BINARY_8);
                self.out.push(bytes.len() as u8);
            }
            256..=0xF_FFFF => {
                let len = bytes.len() as u32;
                self.out.push(token::BINARY_20);
                self.out.push((len >> 16) as u8);
                self.out.push((len >> 8) as u8);
                self.out.push(len as u8);
            }
            len if len <= i32::MAX as usize => {
                self.out.push(token::BINARY_32);
                self.out.extend_from_slice(&(len as u32).to_be_bytes());
            }
            len => return Err(EncodeError::StringTooLong(len)),
        }
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    fn write_jid(&mut self, jid: &Jid) -> Result<(), EncodeError> {
        if jid.is_ad() {
            // Device-qualified addresses live in the user or LID namespace;
            // the server part is implied by the agent byte.
            let expected = if jid.agent == 1 { LID_SERVER } else { DEFAULT_USER_SERVER };
            if jid.server != expected {
                return Err(EncodeError::UnserializableValue(format!(
                    "device address on server {}",
                    jid.server
                )));
            }
            self.out.push(token::AD_JID);
            self.out.push(jid.agent);
            self.out.extend_from_slice(&jid.device.to_be_bytes());
            self.write_string(&jid.user)?;
        } else {
            self.out.push(token::JID_PAIR);
            if jid.user.is_empty() {
                self.out.push(token::LIST_EMPTY);
            } else {
                self.write_string(&jid.user)?;
            }
            if jid.server.is_empty() {
                return Err(EncodeError::UnserializableValue("JID without server".into()));
            }
            self.write_string(&jid.server)?;
        }
        Ok(())
    }
}

pub(crate) fn is_nibble_packable(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_PACKED_LEN
        && s.bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'.')
}

pub(crate) fn is_hex_packable(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_PACKED_LEN
        && s.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

fn nibble_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'-' => 10,
        b'.' => 11,
        _ => unreachable!("checked by is_nibble_packable"),
    }
}

fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'A'..=b'F' => c - b'A' + 10,
        _ => unreachable!("checked by is_hex_packable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Attrs;

    #[test]
    fn test_empty_tag_rejected() {
        assert!(matches!(
            encode(&Node::new("")),
            Err(EncodeError::UnserializableValue(_))
        ));
    }

    #[test]
    fn test_attr_overflow() {
        let mut attrs = Attrs::new();
        for i in 0..257 {
            attrs.insert(format!("k{i}"), AttrValue::Text("v".into()));
        }
        let node = Node {
            tag: "big".into(),
            attrs,
            content: NodeContent::None,
        };
        assert!(matches!(encode(&node), Err(EncodeError::AttrCountOverflow(257))));
    }

    #[test]
    fn test_dictionary_token_is_one_byte() {
        // <iq> with no attrs: LIST_8, size, token("iq")
        let out = encode(&Node::new("iq")).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_marshal_prefixes_version_flag() {
        let out = marshal(&Node::new("iq")).unwrap();
        assert_eq!(out[0], DICT_VERSION << 4);
    }

    #[test]
    fn test_ad_jid_wrong_server_rejected() {
        let mut jid = Jid::new_ad("1234", 0, 2);
        jid.server = "g.tether.net".into();
        let node = Node::new("message").attr("to", jid);
        assert!(matches!(
            encode(&node),
            Err(EncodeError::UnserializableValue(_))
        ));
    }

    #[test]
    fn test_packable_predicates() {
        assert!(is_nibble_packable("15551234567"));
        assert!(is_nibble_packable("1.2-3"));
        assert!(!is_nibble_packable("abc"));
        assert!(!is_nibble_packable(""));
        assert!(is_hex_packable("DEADBEEF"));
        assert!(!is_hex_packable("deadbeef"));
    }
}
