//! Decoding tests over hand-written wire data.

use pretty_assertions::assert_eq;
use protodyn::codec::wire::{write_varint, RECURSION_LIMIT};
use protodyn::{load_proto, Builder, DecodeError, ProtoValue};

fn schema() -> Builder {
    load_proto(
        r#"
        syntax = "proto2";
        package dec;

        enum Color { RED = 1; GREEN = 2; }

        message Test1 { optional int32 a = 1; }
        message Test3 { optional Test1 c = 3; }
        message Numbers {
            repeated int32 d = 4;
            repeated sint32 z = 5 [packed = true];
        }
        message Defaults {
            optional int32 n = 1 [default = 42];
            optional Color color = 2 [default = GREEN];
            required string name = 3 [default = "anon"];
        }
        message Req {
            required int32 a = 1;
            optional int32 b = 2;
        }
        message Choice {
            oneof value {
                int32 num = 1;
                string text = 2;
            }
        }
        message WithGroup {
            repeated group Item = 1 { optional string name = 2; }
        }
        message Chain { optional Chain child = 1; }
        "#,
    )
    .unwrap()
}

#[test]
fn test_decode_varint() {
    let builder = schema();
    let ty = builder.message_type("dec.Test1").unwrap();
    let msg = ty.decode(&[0x08, 0x96, 0x01]).unwrap();
    assert_eq!(msg.get("a"), Some(&ProtoValue::I32(150)));
}

#[test]
fn test_decode_nested() {
    let builder = schema();
    let ty = builder.message_type("dec.Test3").unwrap();
    let msg = ty.decode(&[0x1a, 0x03, 0x08, 0x96, 0x01]).unwrap();
    let inner = msg.get("c").and_then(ProtoValue::as_message).unwrap();
    assert_eq!(inner.message_type().fqn(), ".dec.Test1");
    assert_eq!(inner.get("a"), Some(&ProtoValue::I32(150)));
}

#[test]
fn test_packed_and_unpacked_both_accepted() {
    let builder = schema();
    let ty = builder.message_type("dec.Numbers").unwrap();
    let expected = vec![ProtoValue::I32(1), ProtoValue::I32(2), ProtoValue::I32(300)];

    let packed = ty.decode(&[0x22, 0x04, 0x01, 0x02, 0xac, 0x02]).unwrap();
    assert_eq!(packed.get("d"), Some(&ProtoValue::List(expected.clone())));

    let unpacked = ty
        .decode(&[0x20, 0x01, 0x20, 0x02, 0x20, 0xac, 0x02])
        .unwrap();
    assert_eq!(unpacked.get("d"), Some(&ProtoValue::List(expected)));

    // a packed field written unpacked
    let msg = ty.decode(&[0x28, 0x01, 0x28, 0x02]).unwrap();
    assert_eq!(
        msg.get("z"),
        Some(&ProtoValue::List(vec![ProtoValue::I32(-1), ProtoValue::I32(1)]))
    );
}

#[test]
fn test_negative_int32_from_ten_bytes() {
    let builder = schema();
    let ty = builder.message_type("dec.Test1").unwrap();
    let mut data = vec![0x08];
    data.extend([0xff; 9]);
    data.push(0x01);
    let msg = ty.decode(&data).unwrap();
    assert_eq!(msg.get("a"), Some(&ProtoValue::I32(-1)));
}

#[test]
fn test_unknown_fields_skipped() {
    let builder = schema();
    let ty = builder.message_type("dec.Test1").unwrap();
    let data = [
        0x10, 0x05, // varint 2
        0x1a, 0x02, 0xaa, 0xbb, // bytes 3
        0x25, 0x01, 0x02, 0x03, 0x04, // fixed32 4
        0x29, 0, 0, 0, 0, 0, 0, 0, 0, // fixed64 5
        0x33, 0x38, 0x01, 0x34, // group 6 holding varint 7
        0x08, 0x07,
    ];
    let msg = ty.decode(&data).unwrap();
    assert_eq!(msg.get("a"), Some(&ProtoValue::I32(7)));
    assert_eq!(msg.fields().len(), 1);
}

#[test]
fn test_last_value_wins_for_singular_field() {
    let builder = schema();
    let ty = builder.message_type("dec.Test1").unwrap();
    let msg = ty.decode(&[0x08, 0x01, 0x08, 0x02]).unwrap();
    assert_eq!(msg.get("a"), Some(&ProtoValue::I32(2)));
}

#[test]
fn test_defaults_populated_after_decode() {
    let builder = schema();
    let ty = builder.message_type("dec.Defaults").unwrap();
    let msg = ty.decode(&[0x1a, 0x01, 0x78]).unwrap();
    assert_eq!(msg.get("name"), Some(&ProtoValue::String("x".into())));
    // optional fields stay absent but report their declared default
    assert!(!msg.has("n"));
    assert_eq!(msg.get_or_default("n"), Some(ProtoValue::I32(42)));
    assert_eq!(msg.get_or_default("color"), Some(ProtoValue::Enum(2)));
}

#[test]
fn test_missing_required_returns_partial_message() {
    let builder = schema();
    let ty = builder.message_type("dec.Req").unwrap();
    let err = ty.decode(&[0x10, 0x05]).unwrap_err();
    match &err {
        DecodeError::MissingRequired { missing, decoded, .. } => {
            assert_eq!(missing, &vec![".dec.Req.a".to_string()]);
            assert_eq!(decoded.get("b"), Some(&ProtoValue::I32(5)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.partial().is_some());
}

#[test]
fn test_required_with_default_is_still_missing() {
    let builder = schema();
    let ty = builder.message_type("dec.Defaults").unwrap();
    let err = ty.decode(&[]).unwrap_err();
    let partial = err.into_partial().unwrap();
    // the default is filled in once the check has run
    assert_eq!(partial.get("name"), Some(&ProtoValue::String("anon".into())));
}

#[test]
fn test_oneof_last_member_wins() {
    let builder = schema();
    let ty = builder.message_type("dec.Choice").unwrap();
    let msg = ty.decode(&[0x08, 0x01, 0x12, 0x01, 0x61]).unwrap();
    assert_eq!(msg.which_oneof("value"), Some("text"));
    assert!(!msg.has("num"));
}

#[test]
fn test_repeated_group() {
    let builder = schema();
    let ty = builder.message_type("dec.WithGroup").unwrap();
    let data = [0x0b, 0x12, 0x01, 0x61, 0x0c, 0x0b, 0x12, 0x01, 0x62, 0x0c];
    let msg = ty.decode(&data).unwrap();
    let items = msg.get("item").and_then(ProtoValue::as_list).unwrap();
    assert_eq!(items.len(), 2);
    let names: Vec<_> = items
        .iter()
        .filter_map(|item| item.as_message()?.get("name")?.as_str())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_unterminated_group_is_error() {
    let builder = schema();
    let ty = builder.message_type("dec.WithGroup").unwrap();
    let err = ty.decode(&[0x0b, 0x12, 0x01, 0x61]).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidData(_)));
}

#[test]
fn test_truncated_data() {
    let builder = schema();
    let ty = builder.message_type("dec.Test1").unwrap();
    assert!(matches!(
        ty.decode(&[0x08, 0x96]),
        Err(DecodeError::Truncated { .. })
    ));

    let ty = builder.message_type("dec.Test3").unwrap();
    assert!(matches!(
        ty.decode(&[0x1a, 0x05, 0x08]),
        Err(DecodeError::Truncated { .. })
    ));
}

#[test]
fn test_wire_type_mismatch() {
    let builder = schema();
    let ty = builder.message_type("dec.Test1").unwrap();
    let err = ty.decode(&[0x0d, 0x01, 0x00, 0x00, 0x00]).unwrap_err();
    assert!(matches!(err, DecodeError::WireTypeMismatch { ref field, .. } if field == "a"));
}

#[test]
fn test_invalid_utf8() {
    let builder = load_proto("syntax = \"proto3\"; message S { string s = 1; bytes b = 2; }").unwrap();
    let ty = builder.message_type("S").unwrap();
    let err = ty.decode(&[0x0a, 0x02, 0xc3, 0x28]).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidUtf8 { ref field, .. } if field == "s"));
    // bytes fields take anything
    let msg = ty.decode(&[0x12, 0x02, 0xc3, 0x28]).unwrap();
    assert_eq!(msg.get("b"), Some(&ProtoValue::Bytes(vec![0xc3, 0x28])));
}

#[test]
fn test_illegal_wire_type_and_field_id() {
    let builder = schema();
    let ty = builder.message_type("dec.Test1").unwrap();
    assert!(matches!(ty.decode(&[0x0e]), Err(DecodeError::InvalidData(_))));
    assert!(matches!(ty.decode(&[0x00, 0x01]), Err(DecodeError::InvalidData(_))));
}

#[test]
fn test_decode_delimited_stream() {
    let builder = schema();
    let ty = builder.message_type("dec.Test1").unwrap();
    let stream = [0x03, 0x08, 0x96, 0x01, 0x02, 0x08, 0x01];

    let (first, used) = ty.decode_delimited(&stream).unwrap().unwrap();
    assert_eq!(used, 4);
    assert_eq!(first.get("a"), Some(&ProtoValue::I32(150)));

    let (second, used) = ty.decode_delimited(&stream[4..]).unwrap().unwrap();
    assert_eq!(used, 3);
    assert_eq!(second.get("a"), Some(&ProtoValue::I32(1)));

    assert!(ty.decode_delimited(&stream[..2]).unwrap().is_none());
    assert!(ty.decode_delimited(&[]).unwrap().is_none());
}

#[test]
fn test_proto3_implicit_defaults() {
    let builder = load_proto(
        r#"
        syntax = "proto3";
        enum E { E_UNSPECIFIED = 0; E_ONE = 1; }
        message P {
            int32 a = 1;
            string b = 2;
            E e = 3;
            optional int32 c = 4;
            P child = 5;
        }
        "#,
    )
    .unwrap();
    let ty = builder.message_type("P").unwrap();
    let msg = ty.decode(&[]).unwrap();
    assert_eq!(msg.get("a"), Some(&ProtoValue::I32(0)));
    assert_eq!(msg.get("b"), Some(&ProtoValue::String(String::new())));
    assert_eq!(msg.get("e"), Some(&ProtoValue::Enum(0)));
    assert!(!msg.has("c"));
    assert!(!msg.has("child"));

    // open enum keeps unknown values
    let msg = ty.decode(&[0x18, 0x07]).unwrap();
    assert_eq!(msg.get("e"), Some(&ProtoValue::Enum(7)));
}

/// `depth` levels of `Chain.child`, innermost first.
fn chain(depth: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for _ in 0..depth {
        let mut outer = vec![0x0a];
        write_varint(&mut outer, data.len() as u64);
        outer.extend(data);
        data = outer;
    }
    data
}

#[test]
fn test_nesting_up_to_limit() {
    let builder = schema();
    let ty = builder.message_type("dec.Chain").unwrap();
    let mut msg = ty.decode(&chain(RECURSION_LIMIT)).unwrap();
    let mut depth = 0;
    while let Some(ProtoValue::Message(child)) = msg.get("child").cloned() {
        msg = child;
        depth += 1;
    }
    assert_eq!(depth, RECURSION_LIMIT);
}

#[test]
fn test_nesting_past_limit_is_error() {
    let builder = schema();
    let ty = builder.message_type("dec.Chain").unwrap();
    let err = ty.decode(&chain(RECURSION_LIMIT + 1)).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidData(ref msg) if msg == "recursion limit exceeded"));

    let err = ty.decode(&chain(5_000)).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidData(_)));
}

#[test]
fn test_deep_unknown_groups_are_error() {
    let builder = schema();
    let ty = builder.message_type("dec.Test1").unwrap();
    // field 2 start-group, over and over
    let err = ty.decode(&vec![0x13; 2_000_000]).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidData(ref msg) if msg == "recursion limit exceeded"));
}

#[test]
fn test_delimited_missing_required_reports_consumed() {
    let builder = schema();
    let ty = builder.message_type("dec.Req").unwrap();
    let stream = [0x02, 0x10, 0x05, 0x02, 0x08, 0x01];

    let err = ty.decode_delimited(&stream).unwrap_err();
    assert_eq!(err.consumed(), Some(3));
    assert_eq!(err.partial().and_then(|m| m.get("b")), Some(&ProtoValue::I32(5)));

    let (next, used) = ty.decode_delimited(&stream[3..]).unwrap().unwrap();
    assert_eq!(used, 3);
    assert_eq!(next.get("a"), Some(&ProtoValue::I32(1)));

    // plain decoding has no frame to report
    assert_eq!(ty.decode(&[0x10, 0x05]).unwrap_err().consumed(), None);
}
