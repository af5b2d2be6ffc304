//! The decoded form of one wire stanza.

use crate::jid::Jid;
use std::collections::BTreeMap;
use std::fmt;

/// One attribute value.
///
/// The wire format carries attribute values as strings or addresses;
/// numeric and boolean attributes are canonical decimal / `true`/`false`
/// text recovered through the typed accessors on [`Node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Plain text value.
    Text(String),
    /// Address value.
    Jid(Jid),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Jid> for AttrValue {
    fn from(jid: Jid) -> Self {
        Self::Jid(jid)
    }
}

impl From<u64> for AttrValue {
    fn from(n: u64) -> Self {
        Self::Text(n.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::Text(n.to_string())
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Text(if b { "true" } else { "false" }.to_owned())
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Jid(jid) => write!(f, "{jid}"),
        }
    }
}

/// Attribute map with unique keys and deterministic iteration order.
pub type Attrs = BTreeMap<String, AttrValue>;

/// Node content: exactly one of empty, raw bytes, or ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeContent {
    /// No content slot on the wire.
    #[default]
    None,
    /// Raw byte payload.
    Bytes(Vec<u8>),
    /// Ordered child nodes.
    Children(Vec<Node>),
}

/// A tree-shaped stanza: tag, attributes and content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    /// Stanza tag.
    pub tag: String,
    /// Attribute mapping, keys unique.
    pub attrs: Attrs,
    /// Content slot.
    pub content: NodeContent,
}

impl Node {
    /// New empty node with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Attrs::new(),
            content: NodeContent::None,
        }
    }

    /// Add one attribute (builder style).
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Set byte content (builder style).
    #[must_use]
    pub fn bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.content = NodeContent::Bytes(bytes.into());
        self
    }

    /// Set child nodes (builder style).
    #[must_use]
    pub fn children(mut self, children: impl Into<Vec<Node>>) -> Self {
        self.content = NodeContent::Children(children.into());
        self
    }

    /// Child nodes, empty slice when content is not a child list.
    #[must_use]
    pub fn child_nodes(&self) -> &[Node] {
        match &self.content {
            NodeContent::Children(children) => children,
            _ => &[],
        }
    }

    /// First child with the given tag.
    #[must_use]
    pub fn child_by_tag(&self, tag: &str) -> Option<&Node> {
        self.child_nodes().iter().find(|child| child.tag == tag)
    }

    /// Byte content, if any.
    #[must_use]
    pub fn content_bytes(&self) -> Option<&[u8]> {
        match &self.content {
            NodeContent::Bytes(bytes) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    /// Attribute as text (addresses render canonically).
    #[must_use]
    pub fn get_attr(&self, key: &str) -> Option<String> {
        self.attrs.get(key).map(ToString::to_string)
    }

    /// Attribute as an address.
    ///
    /// Decoded JID values are returned directly; text values are parsed.
    #[must_use]
    pub fn get_attr_jid(&self, key: &str) -> Option<Jid> {
        match self.attrs.get(key)? {
            AttrValue::Jid(jid) => Some(jid.clone()),
            AttrValue::Text(s) => s.parse().ok(),
        }
    }

    /// Attribute parsed as an unsigned integer.
    #[must_use]
    pub fn get_attr_u64(&self, key: &str) -> Option<u64> {
        match self.attrs.get(key)? {
            AttrValue::Text(s) => s.parse().ok(),
            AttrValue::Jid(_) => None,
        }
    }

    /// Attribute parsed as a boolean.
    #[must_use]
    pub fn get_attr_bool(&self, key: &str) -> Option<bool> {
        match self.attrs.get(key)? {
            AttrValue::Text(s) => s.parse().ok(),
            AttrValue::Jid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_accessors() {
        let node = Node::new("iq")
            .attr("id", "42")
            .attr("to", Jid::server_jid())
            .attr("type", "result")
            .children(vec![Node::new("ping")]);

        assert_eq!(node.get_attr("id").as_deref(), Some("42"));
        assert_eq!(node.get_attr_u64("id"), Some(42));
        assert_eq!(node.get_attr_jid("to"), Some(Jid::server_jid()));
        assert!(node.child_by_tag("ping").is_some());
        assert!(node.child_by_tag("pong").is_none());
        assert!(node.content_bytes().is_none());
    }

    #[test]
    fn test_attr_normalization() {
        let node = Node::new("x").attr("count", 7u64).attr("on", true);
        assert_eq!(node.get_attr("count").as_deref(), Some("7"));
        assert_eq!(node.get_attr_u64("count"), Some(7));
        assert_eq!(node.get_attr_bool("on"), Some(true));
    }
}
