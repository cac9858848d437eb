#![forbid(unsafe_code)]

//! Property tests for the golden artifact format.

use ox_conformance::GoldenStore;
use ox_conformance::golden::{decode, encode};
use ox_conformance::{SlotDType, capture_dtypes, cast_as};
use ox_core::{ALL_DTYPES, DType, TensorValue, Value};
use ox_test_utils::property_test_case_count;
use ox_test_utils::strategies::{arb_tensor, arb_values};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(property_test_case_count()))]

    #[test]
    fn encode_decode_preserves_values(inputs in arb_values(), outputs in arb_values()) {
        let (bytes, manifest) = encode(&inputs, &outputs).expect("encode");
        prop_assert_eq!(manifest.inputs.len(), inputs.len());
        prop_assert_eq!(manifest.outputs.len(), outputs.len());
        let decoded = decode(&bytes).expect("decode");
        prop_assert_eq!(decoded.inputs, inputs);
        prop_assert_eq!(decoded.outputs, outputs);
    }

    #[test]
    fn recasting_to_captured_dtypes_is_a_no_op(values in arb_values()) {
        let manifest = capture_dtypes(&values);
        let cast = cast_as(values.clone(), &manifest).expect("cast");
        prop_assert_eq!(cast, values);
    }

    #[test]
    fn any_single_flipped_byte_is_rejected(
        inputs in arb_values(),
        tensor in arb_tensor(),
        flip in any::<prop::sample::Index>(),
    ) {
        let outputs = vec![Value::Tensor(tensor)];
        let (mut bytes, _) = encode(&inputs, &outputs).expect("encode");
        let at = flip.index(bytes.len());
        bytes[at] ^= 0x5a;
        prop_assert!(decode(&bytes).is_err());
    }
}

#[test]
fn store_round_trip_on_disk_for_every_dtype() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = GoldenStore::new(dir.path());
    let values = ALL_DTYPES
        .iter()
        .map(|dtype| {
            Value::Tensor(
                TensorValue::from_i64(DType::I64, &[3], &[0, 1, -1])
                    .expect("tensor")
                    .cast(*dtype),
            )
        })
        .collect::<Vec<_>>();
    store.save("all_dtypes", &values, &values).expect("save");
    let loaded = store.load("all_dtypes").expect("load");
    assert_eq!(loaded.inputs, values);
    assert_eq!(
        capture_dtypes(&loaded.outputs),
        ALL_DTYPES.iter().copied().map(SlotDType::Tensor).collect::<Vec<_>>()
    );
}
