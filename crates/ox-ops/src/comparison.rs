use std::cmp::Ordering;

use ox_core::{Attributes, DType, Literal, TensorValue, Value, ValueKind};

use crate::broadcast::broadcast_offsets;
use crate::{OpError, Operator, reject_unknown_attributes, require_opset};

/// Orders two elements of the same dtype. Integers compare exactly; floats
/// compare as `f64`, so NaN is unordered.
fn order_literals(lhs: Literal, rhs: Literal) -> Option<Ordering> {
    match (lhs.as_i128(), rhs.as_i128()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => lhs.as_f64().partial_cmp(&rhs.as_f64()),
    }
}

fn tensor_input<'a>(
    op_type: &'static str,
    inputs: &'a [Value],
    index: usize,
) -> Result<&'a TensorValue, OpError> {
    match &inputs[index] {
        Value::Tensor(tensor) => Ok(tensor),
        other => Err(OpError::KindMismatch {
            op_type,
            index,
            expected: ValueKind::Tensor,
            actual: other.kind(),
        }),
    }
}

/// Broadcasting element-wise comparison producing a bool tensor.
fn eval_comparison(
    op_type: &'static str,
    inputs: &[Value],
    accepts_bool: bool,
    predicate: impl Fn(Option<Ordering>) -> bool,
) -> Result<Vec<Value>, OpError> {
    if inputs.len() != 2 {
        return Err(OpError::ArityMismatch {
            op_type,
            expected: "2",
            actual: inputs.len(),
        });
    }
    let lhs = tensor_input(op_type, inputs, 0)?;
    let rhs = tensor_input(op_type, inputs, 1)?;

    if lhs.dtype != rhs.dtype {
        return Err(OpError::TypeMismatch {
            op_type,
            detail: format!("operands have dtypes {} and {}", lhs.dtype, rhs.dtype),
        });
    }
    if lhs.dtype == DType::Bool && !accepts_bool {
        return Err(OpError::UnsupportedDType {
            op_type,
            dtype: DType::Bool,
        });
    }

    let shape = lhs
        .shape
        .broadcast(&rhs.shape)
        .ok_or_else(|| OpError::BroadcastMismatch {
            op_type,
            left: lhs.shape.clone(),
            right: rhs.shape.clone(),
        })?;

    let elements = broadcast_offsets(&lhs.shape, &shape)
        .into_iter()
        .zip(broadcast_offsets(&rhs.shape, &shape))
        .map(|(l, r)| Literal::Bool(predicate(order_literals(lhs.elements[l], rhs.elements[r]))))
        .collect();

    Ok(vec![Value::Tensor(TensorValue::new(
        DType::Bool,
        shape,
        elements,
    )?)])
}

macro_rules! comparison_operator {
    ($(#[$doc:meta])* $name:ident, $since:expr, $accepts_bool:expr, $predicate:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name;

        impl Operator for $name {
            const OP_TYPE: &'static str = stringify!($name);
            const SINCE_VERSION: u32 = $since;

            fn new(opset_version: u32, attrs: &Attributes) -> Result<Self, OpError> {
                require_opset(Self::OP_TYPE, Self::SINCE_VERSION, opset_version)?;
                reject_unknown_attributes(Self::OP_TYPE, attrs, &[])?;
                Ok(Self)
            }

            fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, OpError> {
                eval_comparison(Self::OP_TYPE, inputs, $accepts_bool, $predicate)
            }
        }
    };
}

comparison_operator!(
    /// `a < b` with broadcasting.
    Less,
    7,
    false,
    |ord| ord == Some(Ordering::Less)
);
comparison_operator!(
    /// `a <= b` with broadcasting.
    LessOrEqual,
    12,
    false,
    |ord| matches!(ord, Some(Ordering::Less | Ordering::Equal))
);
comparison_operator!(
    Greater,
    7,
    false,
    |ord| ord == Some(Ordering::Greater)
);
comparison_operator!(
    GreaterOrEqual,
    12,
    false,
    |ord| matches!(ord, Some(Ordering::Greater | Ordering::Equal))
);
comparison_operator!(
    /// Element equality; the only comparison that accepts bool operands.
    Equal,
    7,
    true,
    |ord| ord == Some(Ordering::Equal)
);

#[cfg(test)]
mod tests {
    use super::{Equal, Greater, Less, LessOrEqual};
    use crate::{OpError, Operator};
    use ox_core::{Attributes, DType, Shape, TensorValue, Value};
    use proptest::prelude::*;

    fn f32_value(dims: &[u32], values: &[f32]) -> Value {
        Value::Tensor(TensorValue::from_f32(dims, values).expect("tensor"))
    }

    fn run_le(lhs: Value, rhs: Value) -> Result<Vec<Value>, OpError> {
        LessOrEqual::new(13, &Attributes::new())
            .expect("op should build")
            .run(&[lhs, rhs])
    }

    #[test]
    fn less_or_equal_same_shape() {
        let out = run_le(
            f32_value(&[4], &[1.0, 2.0, 3.0, f32::NAN]),
            f32_value(&[4], &[1.0, 1.0, 4.0, 0.0]),
        )
        .expect("should run");
        let expected = TensorValue::from_bool(&[4], &[true, false, true, false]).expect("tensor");
        assert_eq!(out, vec![Value::Tensor(expected)]);
    }

    #[test]
    fn less_or_equal_broadcasts_trailing_vector() {
        let out = run_le(
            f32_value(&[2, 3], &[0.0, 5.0, 2.0, 9.0, -1.0, 3.0]),
            f32_value(&[3], &[1.0, 1.0, 2.0]),
        )
        .expect("should run");
        let tensor = out[0].as_tensor().expect("tensor");
        assert_eq!(tensor.shape, Shape::from_dims(&[2, 3]));
        assert_eq!(
            tensor.to_bool_vec(),
            Some(vec![true, false, true, false, true, false])
        );
    }

    #[test]
    fn less_or_equal_needs_opset_12() {
        let err = LessOrEqual::new(11, &Attributes::new()).expect_err("should fail");
        assert!(matches!(err, OpError::UnsupportedOpset { .. }));
    }

    #[test]
    fn incompatible_shapes_are_rejected() {
        let err = run_le(f32_value(&[2, 3], &[0.0; 6]), f32_value(&[2], &[0.0; 2]))
            .expect_err("should fail");
        assert!(matches!(err, OpError::BroadcastMismatch { .. }));
    }

    #[test]
    fn mixed_dtypes_are_rejected() {
        let ints = Value::Tensor(TensorValue::from_i64(DType::I64, &[1], &[1]).expect("tensor"));
        let err = run_le(f32_value(&[1], &[1.0]), ints).expect_err("should fail");
        assert!(matches!(err, OpError::TypeMismatch { .. }));
    }

    #[test]
    fn integer_comparison_is_exact() {
        let lhs = Value::Tensor(
            TensorValue::from_i64(DType::I64, &[2], &[i64::MAX, i64::MAX - 1]).expect("tensor"),
        );
        let rhs =
            Value::Tensor(TensorValue::from_i64(DType::I64, &[1], &[i64::MAX - 1]).expect("tensor"));
        let out = Greater::new(13, &Attributes::new())
            .expect("op should build")
            .run(&[lhs, rhs])
            .expect("should run");
        assert_eq!(out[0].as_tensor().and_then(TensorValue::to_bool_vec), Some(vec![true, false]));
    }

    #[test]
    fn equal_accepts_bool_but_less_does_not() {
        let flags = Value::Tensor(TensorValue::from_bool(&[2], &[true, false]).expect("tensor"));
        let out = Equal::new(13, &Attributes::new())
            .expect("op should build")
            .run(&[flags.clone(), flags.clone()])
            .expect("should run");
        assert_eq!(out[0].as_tensor().and_then(TensorValue::to_bool_vec), Some(vec![true, true]));

        let err = Less::new(13, &Attributes::new())
            .expect("op should build")
            .run(&[flags.clone(), flags])
            .expect_err("should fail");
        assert_eq!(
            err,
            OpError::UnsupportedDType {
                op_type: "Less",
                dtype: DType::Bool,
            }
        );
    }

    proptest! {
        #[test]
        fn prop_less_or_equal_matches_scalar_rule(
            pairs in proptest::collection::vec((-100.0f32..100.0, -100.0f32..100.0), 1..32),
        ) {
            let len = pairs.len() as u32;
            let xs: Vec<f32> = pairs.iter().map(|(x, _)| *x).collect();
            let ys: Vec<f32> = pairs.iter().map(|(_, y)| *y).collect();
            let out = run_le(f32_value(&[len], &xs), f32_value(&[len], &ys)).expect("should run");
            let flags = out[0].as_tensor().and_then(TensorValue::to_bool_vec).expect("bool output");
            for ((x, y), flag) in pairs.iter().zip(flags) {
                prop_assert_eq!(flag, x <= y);
            }
        }
    }
}
