//! Map field tests: container behaviour, wire format and message values.

use pretty_assertions::assert_eq;
use protodyn::{load_proto, Builder, FieldType, ProtoMap, ProtoValue, ScalarType, ValueError};

fn schema() -> Builder {
    load_proto(
        r#"
        syntax = "proto3";
        package maps;

        enum Level { LOW = 0; HIGH = 1; }
        message Item { string label = 1; }

        message Holder {
            map<string, int32> counts = 1;
            map<int64, string> names = 2;
            map<bool, Level> flags = 3;
            map<uint32, Item> items = 4;
        }
        "#,
    )
    .unwrap()
}

#[test]
fn test_map_entry_wire_format() {
    let builder = schema();
    let ty = builder.message_type("maps.Holder").unwrap();
    let mut msg = ty.new_message();
    msg.map_mut("counts").unwrap().set("a", 1).unwrap();
    assert_eq!(
        msg.encode().unwrap(),
        vec![0x0a, 0x05, 0x0a, 0x01, 0x61, 0x10, 0x01]
    );
}

#[test]
fn test_map_roundtrip_all_kinds() {
    let builder = schema();
    let ty = builder.message_type("maps.Holder").unwrap();
    let item = builder.message_type("maps.Item").unwrap();

    let mut msg = ty.new_message();
    msg.map_mut("counts")
        .unwrap()
        .set("x", 1)
        .unwrap()
        .set("y", -5)
        .unwrap();
    msg.map_mut("names").unwrap().set(-7i64, "neg").unwrap();
    msg.map_mut("flags").unwrap().set(true, 1).unwrap();
    msg.map_mut("items")
        .unwrap()
        .set(3u32, item.from_fields([("label", "three")]).unwrap())
        .unwrap();

    let decoded = ty.decode(&msg.encode().unwrap()).unwrap();
    assert_eq!(decoded, msg);

    let names = decoded.get("names").and_then(ProtoValue::as_map).unwrap();
    assert_eq!(names.get(-7i64), Some(&ProtoValue::String("neg".into())));
    let flags = decoded.get("flags").and_then(ProtoValue::as_map).unwrap();
    assert_eq!(flags.get(true), Some(&ProtoValue::Enum(1)));
    let items = decoded.get("items").and_then(ProtoValue::as_map).unwrap();
    let three = items.get(3u32).and_then(ProtoValue::as_message).unwrap();
    assert_eq!(three.get("label"), Some(&ProtoValue::String("three".into())));
}

#[test]
fn test_missing_entry_halves_use_zero_values() {
    let builder = schema();
    let ty = builder.message_type("maps.Holder").unwrap();

    // counts entry with only a value, names entry with only a key
    let msg = ty
        .decode(&[0x0a, 0x02, 0x10, 0x04, 0x12, 0x02, 0x08, 0x02])
        .unwrap();
    let counts = msg.get("counts").and_then(ProtoValue::as_map).unwrap();
    assert_eq!(counts.get(""), Some(&ProtoValue::I32(4)));
    let names = msg.get("names").and_then(ProtoValue::as_map).unwrap();
    assert_eq!(names.get(2i64), Some(&ProtoValue::String(String::new())));
}

#[test]
fn test_duplicate_keys_last_wins() {
    let builder = schema();
    let ty = builder.message_type("maps.Holder").unwrap();
    let data = [
        0x0a, 0x05, 0x0a, 0x01, 0x61, 0x10, 0x01, // a -> 1
        0x0a, 0x05, 0x0a, 0x01, 0x61, 0x10, 0x02, // a -> 2
    ];
    let msg = ty.decode(&data).unwrap();
    let counts = msg.get("counts").and_then(ProtoValue::as_map).unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get("a"), Some(&ProtoValue::I32(2)));
}

#[test]
fn test_encoding_is_ordered_by_key() {
    let builder = schema();
    let ty = builder.message_type("maps.Holder").unwrap();

    let mut first = ty.new_message();
    first.map_mut("counts").unwrap().set("b", 2).unwrap().set("a", 1).unwrap();
    let mut second = ty.new_message();
    second.map_mut("counts").unwrap().set("a", 1).unwrap().set("b", 2).unwrap();

    assert_eq!(first.encode().unwrap(), second.encode().unwrap());
}

#[test]
fn test_map_rejects_illegal_values() {
    let builder = schema();
    let ty = builder.message_type("maps.Holder").unwrap();
    let mut msg = ty.new_message();

    let counts = msg.map_mut("counts").unwrap();
    assert!(matches!(counts.set(1, 1), Err(ValueError::IllegalValue { .. })));
    assert!(matches!(counts.set("a", "b"), Err(ValueError::IllegalValue { .. })));

    let items = msg.map_mut("items").unwrap();
    let wrong = builder.message_type("maps.Holder").unwrap().new_message();
    assert!(items.set(1u32, wrong).is_err());

    assert!(matches!(msg.map_mut("missing"), Err(ValueError::NoSuchField { .. })));
}

#[test]
fn test_map_field_requires_map_value() {
    let builder = schema();
    let ty = builder.message_type("maps.Holder").unwrap();
    let mut msg = ty.new_message();

    let mut matching = ProtoMap::new(ScalarType::String, FieldType::Scalar(ScalarType::Int32));
    matching.set("k", 9).unwrap();
    msg.set("counts", matching).unwrap();
    assert_eq!(
        msg.get("counts")
            .and_then(ProtoValue::as_map)
            .and_then(|m| m.get("k")),
        Some(&ProtoValue::I32(9))
    );

    let other = ProtoMap::new(ScalarType::Int32, FieldType::Scalar(ScalarType::Int32));
    assert!(msg.set("counts", other).is_err());
    assert!(msg.set("counts", 1).is_err());
    assert!(matches!(msg.add("counts", 1), Err(ValueError::NotRepeated { .. })));
}

#[test]
fn test_empty_map_equals_absent() {
    let builder = schema();
    let ty = builder.message_type("maps.Holder").unwrap();
    let mut with_empty = ty.new_message();
    with_empty.map_mut("counts").unwrap();
    assert_eq!(with_empty, ty.new_message());
    assert!(with_empty.encode().unwrap().is_empty());
}

#[test]
fn test_map_enum_values_follow_field_rules() {
    let builder = load_proto(
        r#"
        syntax = "proto2";
        package closed;
        enum Color { RED = 1; GREEN = 2; }
        message Palette {
            optional Color main = 1;
            map<string, Color> named = 2;
        }
        "#,
    )
    .unwrap();
    let ty = builder.message_type("closed.Palette").unwrap();
    let mut msg = ty.new_message();

    let named = msg.map_mut("named").unwrap();
    named.set("leaf", "GREEN").unwrap();
    assert_eq!(named.get("leaf"), Some(&ProtoValue::Enum(2)));
    assert!(matches!(named.set("sky", 99), Err(ValueError::IllegalValue { .. })));
    assert!(matches!(named.set("sky", "BLUE"), Err(ValueError::IllegalValue { .. })));
    assert!(!named.has("sky"));

    // a detached map is checked once it is set on the message
    let mut detached = ProtoMap::new(ScalarType::String, msg.map_mut("named").unwrap().value_type());
    detached.set("sky", 99).unwrap();
    assert!(matches!(msg.set("named", detached), Err(ValueError::IllegalValue { .. })));
    assert!(matches!(msg.set("main", 99), Err(ValueError::IllegalValue { .. })));
}
