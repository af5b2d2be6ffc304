//! Strict node deserializer.
//!
//! The decoder accepts exactly the image of the encoder plus dictionary
//! references this client never emits itself. Any malformed input yields a
//! typed [`DecodeError`]; it never panics.

use crate::error::DecodeError;
use crate::jid::{DEFAULT_USER_SERVER, LID_SERVER};
use crate::node::{AttrValue, Attrs, Node, NodeContent};
use crate::token;
use crate::{Jid, DICT_VERSION};
use flate2::read::ZlibDecoder;
use std::borrow::Cow;
use std::io::Read;

/// Strip the payload flag byte and inflate the body when compressed.
///
/// The high nibble of the flag byte pins the dictionary version; bit 0x02
/// marks a zlib-deflated body.
///
/// # Errors
///
/// Returns [`DecodeError::Truncated`] on empty input,
/// [`DecodeError::ProtocolVersion`] on a dictionary mismatch and
/// [`DecodeError::Inflate`] when the compressed body is corrupt.
pub fn unpack(data: &[u8]) -> Result<Cow<'_, [u8]>, DecodeError> {
    let (&flags, body) = data
        .split_first()
        .ok_or(DecodeError::Truncated { needed: 1 })?;
    let version = flags >> 4;
    if version != DICT_VERSION {
        return Err(DecodeError::ProtocolVersion {
            got: version,
            supported: DICT_VERSION,
        });
    }
    if flags & 0x02 != 0 {
        let mut inflated = Vec::with_capacity(body.len() * 4);
        ZlibDecoder::new(body).read_to_end(&mut inflated)?;
        Ok(Cow::Owned(inflated))
    } else {
        Ok(Cow::Borrowed(body))
    }
}

/// Unpack a transport payload and decode the node inside it.
///
/// # Errors
///
/// Propagates errors from [`unpack`] and [`decode`].
pub fn unmarshal(data: &[u8]) -> Result<Node, DecodeError> {
    decode(&unpack(data)?)
}

/// Decode one node, requiring the input to be fully consumed.
///
/// # Errors
///
/// Returns a typed [`DecodeError`]; see the variants for the failure modes.
pub fn decode(data: &[u8]) -> Result<Node, DecodeError> {
    let mut decoder = Decoder { data, pos: 0 };
    let node = decoder.read_node()?;
    if decoder.pos != data.len() {
        // Trailing bytes mean the peer framed this payload wrong.
        return Err(DecodeError::UnknownToken(data[decoder.pos]));
    }
    Ok(node)
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(DecodeError::Truncated { needed: 1 })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(DecodeError::Truncated { needed: len })?;
        if end > self.data.len() {
            return Err(DecodeError::Truncated {
                needed: end - self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_node(&mut self) -> Result<Node, DecodeError> {
        let marker = self.read_byte()?;
        let size = self.read_list_size(marker)?;
        if size == 0 {
            return Err(DecodeError::InvalidListLength(0));
        }

        let tag = self.read_string()?;
        if tag.is_empty() {
            return Err(DecodeError::InvalidListLength(size));
        }

        let attr_count = (size - 1) / 2;
        let mut attrs = Attrs::new();
        for _ in 0..attr_count {
            let key = self.read_string()?;
            let value = self.read_attr_value()?;
            attrs.insert(key, value);
        }

        let content = if (size - 1) % 2 == 1 {
            self.read_content()?
        } else {
            NodeContent::None
        };

        Ok(Node { tag, attrs, content })
    }

    fn read_list_size(&mut self, marker: u8) -> Result<usize, DecodeError> {
        match marker {
            token::LIST_EMPTY => Ok(0),
            token::LIST_8 => Ok(self.read_byte()? as usize),
            token::LIST_16 => {
                let bytes = self.read_slice(2)?;
                Ok(u16::from_be_bytes([bytes[0], bytes[1]]) as usize)
            }
            other => Err(DecodeError::UnknownToken(other)),
        }
    }

    fn read_content(&mut self) -> Result<NodeContent, DecodeError> {
        let marker = self.read_byte()?;
        match marker {
            token::LIST_EMPTY | token::LIST_8 | token::LIST_16 => {
                let count = self.read_list_size(marker)?;
                let mut children = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    children.push(self.read_node()?);
                }
                Ok(NodeContent::Children(children))
            }
            token::BINARY_8 | token::BINARY_20 | token::BINARY_32 => {
                Ok(NodeContent::Bytes(self.read_binary(marker)?.to_vec()))
            }
            other => {
                // A dictionary or packed token in content position decodes
                // to its UTF-8 bytes.
                let text = self.read_string_from(other)?;
                Ok(NodeContent::Bytes(text.into_bytes()))
            }
        }
    }

    fn read_binary(&mut self, marker: u8) -> Result<&'a [u8], DecodeError> {
        let len = match marker {
            token::BINARY_8 => self.read_byte()? as usize,
            token::BINARY_20 => {
                let bytes = self.read_slice(3)?;
                ((bytes[0] as usize & 0x0F) << 16) | (bytes[1] as usize) << 8 | bytes[2] as usize
            }
            token::BINARY_32 => {
                let bytes = self.read_slice(4)?;
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
            other => return Err(DecodeError::UnknownToken(other)),
        };
        self.read_slice(len)
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        let marker = self.read_byte()?;
        self.read_string_from(marker)
    }

    fn read_string_from(&mut self, marker: u8) -> Result<String, DecodeError> {
        match marker {
            1..=235 => token::single(marker)
                .map(ToOwned::to_owned)
                .ok_or(DecodeError::UnknownToken(marker)),
            token::DICTIONARY_0..=token::DICTIONARY_3 => {
                let index = self.read_byte()?;
                token::double(marker - token::DICTIONARY_0, index)
                    .map(ToOwned::to_owned)
                    .ok_or(DecodeError::UnknownToken(index))
            }
            token::NIBBLE_8 => self.read_packed(NIBBLE_CHARS),
            token::HEX_8 => self.read_packed(HEX_CHARS),
            token::BINARY_8 | token::BINARY_20 | token::BINARY_32 => {
                let bytes = self.read_binary(marker)?;
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
            other => Err(DecodeError::UnknownToken(other)),
        }
    }

    fn read_attr_value(&mut self) -> Result<AttrValue, DecodeError> {
        let marker = self.read_byte()?;
        match marker {
            token::JID_PAIR => Ok(AttrValue::Jid(self.read_jid_pair()?)),
            token::AD_JID => Ok(AttrValue::Jid(self.read_ad_jid()?)),
            other => Ok(AttrValue::Text(self.read_string_from(other)?)),
        }
    }

    fn read_jid_pair(&mut self) -> Result<Jid, DecodeError> {
        let marker = self.read_byte()?;
        let user = if marker == token::LIST_EMPTY {
            String::new()
        } else {
            self.read_string_from(marker)?
        };
        let server = self.read_string()?;
        if server.is_empty() {
            return Err(DecodeError::InvalidJid(format!("{user}@")));
        }
        Ok(Jid::new(user, server))
    }

    fn read_ad_jid(&mut self) -> Result<Jid, DecodeError> {
        let agent = self.read_byte()?;
        let device_bytes = self.read_slice(2)?;
        let device = u16::from_be_bytes([device_bytes[0], device_bytes[1]]);
        let user = self.read_string()?;
        if user.is_empty() {
            return Err(DecodeError::InvalidJid(format!(".{agent}:{device}")));
        }
        let server = if agent == 1 { LID_SERVER } else { DEFAULT_USER_SERVER };
        Ok(Jid {
            user,
            server: server.to_owned(),
            agent,
            device,
        })
    }

    fn read_packed(&mut self, charset: &[u8; 16]) -> Result<String, DecodeError> {
        let header = self.read_byte()?;
        let odd = header & 0x80 != 0;
        let byte_len = (header & 0x7F) as usize;
        let packed = self.read_slice(byte_len)?;

        let mut out = String::with_capacity(byte_len * 2);
        for (i, &byte) in packed.iter().enumerate() {
            let last = i == byte_len - 1;
            for (j, nibble) in [byte >> 4, byte & 0x0F].into_iter().enumerate() {
                if odd && last && j == 1 {
                    if nibble != 0x0F {
                        return Err(DecodeError::UnknownToken(nibble));
                    }
                    continue;
                }
                let c = charset[nibble as usize];
                if c == 0 {
                    return Err(DecodeError::UnknownToken(nibble));
                }
                out.push(c as char);
            }
        }
        Ok(out)
    }
}

/// Nibble alphabet; zero bytes mark invalid nibbles.
const NIBBLE_CHARS: &[u8; 16] = b"0123456789-.\0\0\0\0";
/// Hex alphabet.
const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";
