use libnvlist::{Encoding, NvList, Value, pack, unpack};
use proptest::collection::vec;
use proptest::prelude::*;

fn text() -> impl Strategy<Value = String> {
    "[^\\x00]{0,12}"
}

fn key() -> impl Strategy<Value = String> {
    "[a-z_@:.-]{1,16}"
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Boolean),
        any::<bool>().prop_map(Value::BooleanValue),
        any::<u8>().prop_map(Value::Byte),
        any::<i8>().prop_map(Value::Int8),
        any::<u8>().prop_map(Value::Uint8),
        any::<i16>().prop_map(Value::Int16),
        any::<u16>().prop_map(Value::Uint16),
        any::<i32>().prop_map(Value::Int32),
        any::<u32>().prop_map(Value::Uint32),
        any::<i64>().prop_map(Value::Int64),
        any::<u64>().prop_map(Value::Uint64),
        any::<i64>().prop_map(Value::Hrtime),
        text().prop_map(Value::String),
        vec(any::<u8>(), 0..9).prop_map(Value::ByteArray),
        vec(any::<bool>(), 0..5).prop_map(Value::BooleanArray),
        vec(any::<i8>(), 0..9).prop_map(Value::Int8Array),
        vec(any::<u8>(), 0..9).prop_map(Value::Uint8Array),
        vec(any::<i16>(), 0..5).prop_map(Value::Int16Array),
        vec(any::<u16>(), 0..5).prop_map(Value::Uint16Array),
        vec(any::<i32>(), 0..5).prop_map(Value::Int32Array),
        vec(any::<u32>(), 0..5).prop_map(Value::Uint32Array),
        vec(any::<i64>(), 0..5).prop_map(Value::Int64Array),
        vec(any::<u64>(), 0..5).prop_map(Value::Uint64Array),
        vec(text(), 0..4).prop_map(Value::StringArray),
    ]
}

fn list_of(values: impl Strategy<Value = Value> + 'static) -> BoxedStrategy<NvList> {
    vec((key(), values), 0..6)
        .prop_map(|pairs| pairs.into_iter().collect())
        .boxed()
}

fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(4, 48, 6, |inner| {
        let list = list_of(inner);
        prop_oneof![
            list.clone().prop_map(Value::NvList),
            vec(list, 0..3).prop_map(Value::NvListArray),
        ]
    })
}

proptest! {
    #[test]
    fn xdr_roundtrip(list in list_of(value())) {
        let bytes = pack(&list, Encoding::Xdr).unwrap();
        prop_assert_eq!(unpack(&bytes).unwrap(), list);
    }

    #[test]
    fn native_roundtrip(list in list_of(value())) {
        let bytes = pack(&list, Encoding::Native).unwrap();
        prop_assert_eq!(unpack(&bytes).unwrap(), list);
    }

    #[test]
    fn encodings_are_4_and_8_aligned(list in list_of(value())) {
        let xdr = pack(&list, Encoding::Xdr).unwrap();
        prop_assert_eq!(xdr.len() % 4, 0);
        // header + list header + 8-aligned pairs + terminator
        let native = pack(&list, Encoding::Native).unwrap();
        prop_assert_eq!((native.len() - 4) % 4, 0);
    }

    #[test]
    fn truncated_input_never_panics(list in list_of(value()), cut in any::<prop::sample::Index>()) {
        for encoding in [Encoding::Xdr, Encoding::Native] {
            let bytes = pack(&list, encoding).unwrap();
            let at = cut.index(bytes.len());
            prop_assert!(unpack(&bytes[..at]).is_err());
        }
    }
}
