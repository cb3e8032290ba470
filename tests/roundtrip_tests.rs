//! Property tests: whatever a message holds comes back unchanged from
//! encode followed by decode.

use proptest::prelude::*;
use protodyn::codec::wire::{self, Reader};
use protodyn::{load_proto, Builder, DynamicMessage, MessageType, ProtoValue};
use std::collections::HashMap;

const SCHEMA: &str = r#"
syntax = "proto2";
package rt;

enum Mood { CALM = 0; HAPPY = 1; GRUMPY = -3; }

message Scalars {
    optional int32 i32 = 1;
    optional int64 i64 = 2;
    optional uint32 u32 = 3;
    optional uint64 u64 = 4;
    optional sint32 s32 = 5;
    optional sint64 s64 = 6;
    optional fixed32 f32 = 7;
    optional fixed64 f64 = 8;
    optional sfixed32 sf32 = 9;
    optional sfixed64 sf64 = 10;
    optional float flt = 11;
    optional double dbl = 12;
    optional bool flag = 13;
    optional string text = 14;
    optional bytes raw = 15;
    optional Mood mood = 16;
}

message Lists {
    repeated sint32 packed = 1 [packed = true];
    repeated int64 plain = 2;
    repeated double doubles = 3 [packed = true];
    repeated string words = 4;
}

message Tables {
    map<string, int64> counts = 1;
    map<sint32, string> labels = 2;
}

message Node {
    optional int32 value = 1;
    repeated Node children = 2;
}
"#;

const PROTO3: &str = r#"
syntax = "proto3";
package rt3;

message Flat {
    int32 a = 1;
    string b = 2;
    repeated uint64 c = 3;
    optional bool d = 4;
}
"#;

fn message_type(builder: &Builder, name: &str) -> MessageType {
    builder.message_type(name).unwrap()
}

fn word() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-zA-Z0-9 äß_]{0,12}").unwrap()
}

fn roundtrip(msg: &DynamicMessage) -> DynamicMessage {
    let bytes = msg.encode().unwrap();
    assert_eq!(bytes.len(), msg.encoded_len().unwrap());
    msg.message_type().decode(&bytes).unwrap()
}

proptest! {
    #[test]
    fn varint_roundtrip(v in any::<u64>()) {
        let mut buf = Vec::new();
        wire::write_varint(&mut buf, v);
        prop_assert_eq!(buf.len(), wire::varint_len(v));
        prop_assert!(buf[..buf.len() - 1].iter().all(|b| b & 0x80 != 0));
        let mut reader = Reader::new(&buf);
        prop_assert_eq!(reader.read_varint().unwrap(), v);
        prop_assert!(reader.is_empty());
    }

    #[test]
    fn zigzag_roundtrip(a in any::<i32>(), b in any::<i64>()) {
        prop_assert_eq!(wire::zigzag_decode32(wire::zigzag_encode32(a)), a);
        prop_assert_eq!(wire::zigzag_decode64(wire::zigzag_encode64(b)), b);
        // small magnitudes stay small
        if (-64..64).contains(&b) {
            prop_assert!(wire::zigzag_encode64(b) < 128);
        }
    }

    #[test]
    fn scalars_roundtrip(
        ints in (any::<i32>(), any::<i64>(), any::<u32>(), any::<u64>()),
        zigzag in (any::<i32>(), any::<i64>()),
        fixed in (any::<u32>(), any::<u64>(), any::<i32>(), any::<i64>()),
        floats in (-1.0e6f32..1.0e6f32, -1.0e12f64..1.0e12f64),
        flag in any::<bool>(),
        text in word(),
        raw in proptest::collection::vec(any::<u8>(), 0..32),
        mood in prop_oneof![Just(0), Just(1), Just(-3)],
    ) {
        let builder = load_proto(SCHEMA).unwrap();
        let ty = message_type(&builder, "rt.Scalars");
        let mut msg = ty.new_message();
        msg.set("i32", ints.0).unwrap()
            .set("i64", ints.1).unwrap()
            .set("u32", ints.2).unwrap()
            .set("u64", ints.3).unwrap()
            .set("s32", zigzag.0).unwrap()
            .set("s64", zigzag.1).unwrap()
            .set("f32", fixed.0).unwrap()
            .set("f64", fixed.1).unwrap()
            .set("sf32", fixed.2).unwrap()
            .set("sf64", fixed.3).unwrap()
            .set("flt", floats.0).unwrap()
            .set("dbl", floats.1).unwrap()
            .set("flag", flag).unwrap()
            .set("text", text).unwrap()
            .set("raw", raw).unwrap()
            .set("mood", ProtoValue::Enum(mood)).unwrap();

        prop_assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn lists_roundtrip(
        packed in proptest::collection::vec(any::<i32>(), 0..16),
        plain in proptest::collection::vec(any::<i64>(), 0..16),
        doubles in proptest::collection::vec(-1.0e9f64..1.0e9f64, 0..8),
        words in proptest::collection::vec(word(), 0..6),
    ) {
        let builder = load_proto(SCHEMA).unwrap();
        let ty = message_type(&builder, "rt.Lists");
        let mut msg = ty.new_message();
        for v in &packed {
            msg.add("packed", *v).unwrap();
        }
        for v in &plain {
            msg.add("plain", *v).unwrap();
        }
        for v in &doubles {
            msg.add("doubles", *v).unwrap();
        }
        for w in &words {
            msg.add("words", w.as_str()).unwrap();
        }

        let decoded = roundtrip(&msg);
        prop_assert_eq!(&decoded, &msg);
        let len = decoded.get("packed").and_then(ProtoValue::as_list).map_or(0, |l| l.len());
        prop_assert_eq!(len, packed.len());
    }

    #[test]
    fn maps_roundtrip(
        counts in proptest::collection::hash_map(word(), any::<i64>(), 0..8),
        labels in proptest::collection::hash_map(any::<i32>(), word(), 0..8),
    ) {
        let builder = load_proto(SCHEMA).unwrap();
        let ty = message_type(&builder, "rt.Tables");
        let mut msg = ty.new_message();
        for (k, v) in &counts {
            msg.map_mut("counts").unwrap().set(k.as_str(), *v).unwrap();
        }
        for (k, v) in &labels {
            msg.map_mut("labels").unwrap().set(*k, v.as_str()).unwrap();
        }

        let decoded = roundtrip(&msg);
        prop_assert_eq!(&decoded, &msg);

        let decoded_counts: HashMap<String, i64> = decoded
            .get("counts")
            .and_then(ProtoValue::as_map)
            .map(|m| {
                m.entries()
                    .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_i64()?)))
                    .collect()
            })
            .unwrap_or_default();
        prop_assert_eq!(decoded_counts, counts);
    }

    #[test]
    fn nested_messages_roundtrip(
        tree in proptest::collection::vec(
            (any::<i32>(), proptest::collection::vec(any::<i32>(), 0..4)),
            0..6,
        ),
    ) {
        let builder = load_proto(SCHEMA).unwrap();
        let node = message_type(&builder, "rt.Node");
        let mut root = node.from_fields([("value", 0)]).unwrap();
        for (value, leaves) in &tree {
            let mut child = node.from_fields([("value", *value)]).unwrap();
            for leaf in leaves {
                child.add("children", node.from_fields([("value", *leaf)]).unwrap()).unwrap();
            }
            root.add("children", child).unwrap();
        }

        prop_assert_eq!(roundtrip(&root), root);
    }

    #[test]
    fn proto3_roundtrip(
        a in any::<i32>(),
        b in word(),
        c in proptest::collection::vec(any::<u64>(), 0..8),
        d in proptest::option::of(any::<bool>()),
    ) {
        let builder = load_proto(PROTO3).unwrap();
        let ty = message_type(&builder, "rt3.Flat");
        let mut msg = ty.new_message();
        msg.set("a", a).unwrap().set("b", b).unwrap();
        for v in &c {
            msg.add("c", *v).unwrap();
        }
        if let Some(d) = d {
            msg.set("d", d).unwrap();
        }

        prop_assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn delimited_stream_roundtrip(values in proptest::collection::vec(any::<i32>(), 0..10)) {
        let builder = load_proto(SCHEMA).unwrap();
        let node = message_type(&builder, "rt.Node");
        let messages: Vec<DynamicMessage> = values
            .iter()
            .map(|v| node.from_fields([("value", *v)]).unwrap())
            .collect();

        let mut stream = Vec::new();
        for msg in &messages {
            stream.extend(msg.encode_delimited().unwrap());
        }

        let mut decoded = Vec::new();
        let mut rest = &stream[..];
        while let Some((msg, used)) = node.decode_delimited(rest).unwrap() {
            decoded.push(msg);
            rest = &rest[used..];
        }
        prop_assert!(rest.is_empty());
        prop_assert_eq!(decoded, messages);
    }
}
