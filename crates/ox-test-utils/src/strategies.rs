//! Proptest strategies over the value model.

use ox_core::{ALL_DTYPES, DType, Literal, Shape, TensorValue, Value};
use proptest::prelude::*;

pub fn arb_dtype() -> impl Strategy<Value = DType> {
    proptest::sample::select(ALL_DTYPES.to_vec())
}

/// Finite literals drawn from the domain of `dtype`.
pub fn arb_literal(dtype: DType) -> BoxedStrategy<Literal> {
    match dtype {
        DType::F32 => (-1.0e6_f32..1.0e6).prop_map(Literal::from_f32).boxed(),
        DType::F64 => (-1.0e12_f64..1.0e12).prop_map(Literal::from_f64).boxed(),
        DType::I8 => any::<i8>().prop_map(|v| Literal::I64(v.into())).boxed(),
        DType::I16 => any::<i16>().prop_map(|v| Literal::I64(v.into())).boxed(),
        DType::I32 => any::<i32>().prop_map(|v| Literal::I64(v.into())).boxed(),
        DType::I64 => any::<i64>().prop_map(Literal::I64).boxed(),
        DType::U8 => any::<u8>().prop_map(|v| Literal::U64(v.into())).boxed(),
        DType::U16 => any::<u16>().prop_map(|v| Literal::U64(v.into())).boxed(),
        DType::U32 => any::<u32>().prop_map(|v| Literal::U64(v.into())).boxed(),
        DType::U64 => any::<u64>().prop_map(Literal::U64).boxed(),
        DType::Bool => any::<bool>().prop_map(Literal::Bool).boxed(),
    }
}

pub fn arb_shape() -> impl Strategy<Value = Shape> {
    proptest::collection::vec(0_u32..4, 0..=3).prop_map(|dims| Shape { dims })
}

pub fn arb_tensor() -> impl Strategy<Value = TensorValue> {
    (arb_dtype(), arb_shape()).prop_flat_map(|(dtype, shape)| {
        let count = shape.dims.iter().product::<u32>() as usize;
        proptest::collection::vec(arb_literal(dtype), count).prop_filter_map(
            "elements must fit the shape",
            move |elements| TensorValue::new(dtype, shape.clone(), elements).ok(),
        )
    })
}

/// Tensors and sequences of up to three tensors, including empty sequences.
pub fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        arb_tensor().prop_map(Value::Tensor),
        proptest::collection::vec(arb_tensor(), 0..3).prop_map(Value::Sequence),
    ]
}

pub fn arb_values() -> impl Strategy<Value = Vec<Value>> {
    proptest::collection::vec(arb_value(), 0..4)
}
