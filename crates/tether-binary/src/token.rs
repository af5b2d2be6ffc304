//! Token dictionary for the binary stanza format.
//!
//! Strings that appear in the dictionaries are emitted as one byte (or a
//! two-byte secondary-dictionary reference); everything else is emitted as
//! length-prefixed bytes. The dictionary is pinned by [`crate::DICT_VERSION`]
//! at the transport layer.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Empty child list.
pub const LIST_EMPTY: u8 = 0;
/// Secondary dictionary selectors, index 0..=3.
pub const DICTIONARY_0: u8 = 236;
/// Secondary dictionary 1.
pub const DICTIONARY_1: u8 = 237;
/// Secondary dictionary 2.
pub const DICTIONARY_2: u8 = 238;
/// Secondary dictionary 3.
pub const DICTIONARY_3: u8 = 239;
/// Device-qualified address marker.
pub const AD_JID: u8 = 247;
/// List with a one-byte element count.
pub const LIST_8: u8 = 248;
/// List with a two-byte element count.
pub const LIST_16: u8 = 249;
/// `user@server` address pair.
pub const JID_PAIR: u8 = 250;
/// Hex-packed string.
pub const HEX_8: u8 = 251;
/// Byte string with one-byte length.
pub const BINARY_8: u8 = 252;
/// Byte string with 20-bit length.
pub const BINARY_20: u8 = 253;
/// Byte string with four-byte length.
pub const BINARY_32: u8 = 254;
/// Nibble-packed decimal string.
pub const NIBBLE_8: u8 = 255;

/// Primary dictionary. A string's index is its wire byte; indices at and
/// above [`DICTIONARY_0`] are structural markers and never looked up here.
pub static SINGLE_BYTE: &[&str] = &[
    "",
    "xmlstreamstart",
    "xmlstreamend",
    "s.tether.net",
    "type",
    "participant",
    "from",
    "receipt",
    "id",
    "broadcast",
    "status",
    "jid",
    "user",
    "devices",
    "device_hash",
    "to",
    "offline",
    "message",
    "result",
    "class",
    "xmlns",
    "duration",
    "notify",
    "iq",
    "t",
    "ack",
    "g.tether.net",
    "enc",
    "presence",
    "config_value",
    "picture",
    "verified_name",
    "config_code",
    "key-index-list",
    "contacts",
    "available",
    "error",
    "interactive",
    "sync",
    "aborted",
    "index",
    "internal-server-error",
    "config",
    "unavailable",
    "device-list",
    "count",
    "image",
    "business",
    "add",
    "remove",
    "update",
    "profile",
    "notification",
    "chatstate",
    "composing",
    "paused",
    "recording",
    "call",
    "offer",
    "accept",
    "reject",
    "terminate",
    "ib",
    "stream:error",
    "success",
    "failure",
    "ping",
    "pong",
    "active",
    "pair-device",
    "pair-success",
    "pair-device-sign",
    "device-identity",
    "device",
    "platform",
    "ref",
    "biz",
    "name",
    "key-index",
    "get",
    "set",
    "urn:xmpp:ping",
    "w:profile:picture",
    "w:stats",
    "w:p",
    "encrypt",
    "registration",
    "identity",
    "skey",
    "key",
    "value",
    "signature",
    "list",
    "retry",
    "delivery",
    "read",
    "played",
    "inactive",
    "delete",
    "location",
    "lid",
    "code",
    "text",
    "reason",
    "conflict",
    "replaced",
    "device_removed",
    "stream:features",
    "mechanism",
    "props",
    "prop",
    "version",
    "group",
    "subject",
    "creator",
    "admin",
    "member",
    "invite",
    "leave",
    "promote",
    "demote",
    "pkmsg",
    "msg",
    "skmsg",
    "v",
    "category",
    "unknown",
    "last",
    "before",
    "after",
    "state",
    "mute",
    "pin",
    "archive",
    "chat",
    "background",
    "true",
    "false",
];

/// Secondary dictionaries, selected by `DICTIONARY_0 + i`.
pub static DOUBLE_BYTE: &[&[&str]] = &[
    &[
        "media",
        "media_conn",
        "hostname",
        "fallback_hostname",
        "fallback_ip4",
        "fallback_ip6",
        "ip4",
        "ip6",
        "auth_ttl",
        "max_buckets",
        "ttl",
        "upload",
        "download",
        "thumbnail",
        "sticker",
        "document",
        "audio",
        "video",
        "gif",
        "ptt",
    ],
    &[
        "appdata",
        "app_state",
        "collection",
        "patch",
        "snapshot",
        "mutation",
        "record",
        "critical_block",
        "critical_unblock_low",
        "regular_low",
        "regular_high",
        "regular",
        "set_value",
        "remove_value",
        "keys",
        "key_id",
        "fingerprint",
        "mac",
        "ltHash",
        "expected",
    ],
    &[
        "history",
        "history_sync",
        "recent",
        "full",
        "push_name",
        "on_demand",
        "peer_data_operation",
        "placeholder",
        "resend",
        "revoke",
        "edit",
        "reaction",
        "poll",
        "vote",
        "order",
        "payment",
        "invoice",
        "catalog",
        "product",
        "cart",
    ],
    &[
        "privacy",
        "blocklist",
        "block",
        "unblock",
        "last_seen",
        "online",
        "groupadd",
        "disappearing_mode",
        "ephemeral",
        "expiration",
        "default",
        "all",
        "match_last_seen",
        "known",
        "none",
        "report",
        "spam",
        "abuse",
        "safety",
        "account",
    ],
];

/// A dictionary hit: either a primary index or `(dictionary, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRef {
    /// Single-byte primary-dictionary token.
    Single(u8),
    /// Two-byte secondary-dictionary token.
    Double(u8, u8),
}

fn index() -> &'static HashMap<&'static str, TokenRef> {
    static INDEX: OnceLock<HashMap<&'static str, TokenRef>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut map = HashMap::new();
        for (i, token) in SINGLE_BYTE.iter().enumerate().skip(1) {
            map.insert(*token, TokenRef::Single(i as u8));
        }
        for (dict, tokens) in DOUBLE_BYTE.iter().enumerate() {
            for (i, token) in tokens.iter().enumerate() {
                // Primary dictionary wins on duplicates.
                map.entry(*token)
                    .or_insert(TokenRef::Double(dict as u8, i as u8));
            }
        }
        map
    })
}

/// Look a string up in the two-level dictionary.
#[must_use]
pub fn lookup(s: &str) -> Option<TokenRef> {
    index().get(s).copied()
}

/// Resolve a primary-dictionary byte.
#[must_use]
pub fn single(index: u8) -> Option<&'static str> {
    // Index 0 is the LIST_EMPTY marker, never a string token.
    if index == 0 {
        return None;
    }
    SINGLE_BYTE.get(index as usize).copied()
}

/// Resolve a secondary-dictionary reference.
#[must_use]
pub fn double(dict: u8, index: u8) -> Option<&'static str> {
    DOUBLE_BYTE.get(dict as usize)?.get(index as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_dictionary_fits_marker_space() {
        assert!(SINGLE_BYTE.len() <= DICTIONARY_0 as usize);
    }

    #[test]
    fn test_secondary_dictionaries_fit_one_byte() {
        for dict in DOUBLE_BYTE {
            assert!(dict.len() <= 256);
        }
    }

    #[test]
    fn test_lookup_roundtrip() {
        for (i, token) in SINGLE_BYTE.iter().enumerate().skip(1) {
            assert_eq!(lookup(token), Some(TokenRef::Single(i as u8)), "{token}");
            assert_eq!(single(i as u8), Some(*token));
        }
        // Secondary entries resolve back to themselves unless shadowed.
        for (d, tokens) in DOUBLE_BYTE.iter().enumerate() {
            for (i, token) in tokens.iter().enumerate() {
                assert_eq!(double(d as u8, i as u8), Some(*token));
            }
        }
    }

    #[test]
    fn test_no_duplicate_primary_tokens() {
        let mut seen = std::collections::HashSet::new();
        for token in SINGLE_BYTE.iter().skip(1) {
            assert!(seen.insert(*token), "duplicate token {token}");
        }
    }

    #[test]
    fn test_unknown_string_misses() {
        assert_eq!(lookup("definitely-not-a-token"), None);
        assert_eq!(single(0), None);
        assert_eq!(single(240), None);
        assert_eq!(double(4, 0), None);
    }
}
