//! Property tests: decode is a left inverse of encode over the value
//! domain, and arbitrary input never panics the decoder.

use proptest::prelude::*;
use tether_binary::{decode, encode, AttrValue, Attrs, Jid, Node, NodeContent, DEFAULT_USER_SERVER};

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        // Dictionary hits
        Just("result".to_owned()),
        Just("message".to_owned()),
        Just("media_conn".to_owned()),
        // Nibble- and hex-packable
        "[0-9]{1,20}",
        "[0-9A-F]{2,16}",
        // Arbitrary text
        "[a-zA-Z0-9 _:/@.-]{0,40}",
    ]
}

fn arb_jid() -> impl Strategy<Value = Jid> {
    prop_oneof![
        // Plain user@server
        ("[0-9]{6,15}", prop_oneof![
            Just(DEFAULT_USER_SERVER.to_owned()),
            Just("g.tether.net".to_owned()),
        ])
            .prop_map(|(user, server)| Jid::new(user, server)),
        // Device-qualified
        ("[0-9]{6,15}", 0u8..=1, 0u16..=99)
            .prop_map(|(user, agent, device)| Jid::new_ad(user, agent, device)),
    ]
}

fn arb_attr_value() -> impl Strategy<Value = AttrValue> {
    prop_oneof![
        arb_text().prop_map(AttrValue::Text),
        arb_jid().prop_map(AttrValue::Jid),
    ]
}

fn arb_attrs() -> impl Strategy<Value = Attrs> {
    prop::collection::btree_map("[a-z_-]{1,12}", arb_attr_value(), 0..6)
}

fn arb_node() -> impl Strategy<Value = Node> {
    let leaf = ("[a-z:_-]{1,16}", arb_attrs(), arb_leaf_content()).prop_map(
        |(tag, attrs, content)| Node { tag, attrs, content },
    );
    leaf.prop_recursive(3, 24, 4, |inner| {
        (
            "[a-z:_-]{1,16}",
            arb_attrs(),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(tag, attrs, children)| Node {
                tag,
                attrs,
                content: NodeContent::Children(children),
            })
    })
}

fn arb_leaf_content() -> impl Strategy<Value = NodeContent> {
    prop_oneof![
        Just(NodeContent::None),
        prop::collection::vec(any::<u8>(), 0..300).prop_map(NodeContent::Bytes),
    ]
}

proptest! {
    #[test]
    fn roundtrip(node in arb_node()) {
        let encoded = encode(&node).unwrap();
        let decoded = decode(&encoded).unwrap();
        prop_assert_eq!(decoded, node);
    }

    #[test]
    fn decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        // Either a node or a typed error; a panic fails the test harness.
        let _ = decode(&data);
    }

    #[test]
    fn encode_is_deterministic(node in arb_node()) {
        prop_assert_eq!(encode(&node).unwrap(), encode(&node).unwrap());
    }
}
