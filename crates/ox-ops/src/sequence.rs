use ox_core::{Attributes, DType, TensorValue, Value, ValueKind};

use crate::{OpError, Operator, reject_unknown_attributes, require_opset};

/// Packs one or more tensors of a single dtype into a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceConstruct;

impl Operator for SequenceConstruct {
    const OP_TYPE: &'static str = "SequenceConstruct";
    const SINCE_VERSION: u32 = 11;

    fn new(opset_version: u32, attrs: &Attributes) -> Result<Self, OpError> {
        require_opset(Self::OP_TYPE, Self::SINCE_VERSION, opset_version)?;
        reject_unknown_attributes(Self::OP_TYPE, attrs, &[])?;
        Ok(Self)
    }

    fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, OpError> {
        if inputs.is_empty() {
            return Err(OpError::ArityMismatch {
                op_type: Self::OP_TYPE,
                expected: "at least 1",
                actual: 0,
            });
        }

        let mut items = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let Value::Tensor(tensor) = input else {
                return Err(OpError::KindMismatch {
                    op_type: Self::OP_TYPE,
                    index,
                    expected: ValueKind::Tensor,
                    actual: input.kind(),
                });
            };
            if let Some(first) = items.first().map(|t: &TensorValue| t.dtype)
                && first != tensor.dtype
            {
                return Err(OpError::TypeMismatch {
                    op_type: Self::OP_TYPE,
                    detail: format!("input {index} is {} but input 0 is {first}", tensor.dtype),
                });
            }
            items.push(tensor.clone());
        }
        Ok(vec![Value::Sequence(items)])
    }
}

/// Selects one tensor from a sequence; negative positions count from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceAt;

impl Operator for SequenceAt {
    const OP_TYPE: &'static str = "SequenceAt";
    const SINCE_VERSION: u32 = 11;

    fn new(opset_version: u32, attrs: &Attributes) -> Result<Self, OpError> {
        require_opset(Self::OP_TYPE, Self::SINCE_VERSION, opset_version)?;
        reject_unknown_attributes(Self::OP_TYPE, attrs, &[])?;
        Ok(Self)
    }

    fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, OpError> {
        let [sequence, position] = inputs else {
            return Err(OpError::ArityMismatch {
                op_type: Self::OP_TYPE,
                expected: "2",
                actual: inputs.len(),
            });
        };
        let Value::Sequence(items) = sequence else {
            return Err(OpError::KindMismatch {
                op_type: Self::OP_TYPE,
                index: 0,
                expected: ValueKind::Sequence,
                actual: sequence.kind(),
            });
        };
        let Value::Tensor(position) = position else {
            return Err(OpError::KindMismatch {
                op_type: Self::OP_TYPE,
                index: 1,
                expected: ValueKind::Tensor,
                actual: position.kind(),
            });
        };
        if !matches!(position.dtype, DType::I32 | DType::I64) {
            return Err(OpError::UnsupportedDType {
                op_type: Self::OP_TYPE,
                dtype: position.dtype,
            });
        }
        let [element] = position.elements.as_slice() else {
            return Err(OpError::TypeMismatch {
                op_type: Self::OP_TYPE,
                detail: format!("position must hold one element, got shape {}", position.shape),
            });
        };
        let index = element
            .as_i128()
            .and_then(|v| i64::try_from(v).ok())
            .unwrap_or(i64::MIN);

        let len = items.len();
        let resolved = if index < 0 {
            i64::try_from(len).ok().map(|n| n + index)
        } else {
            Some(index)
        };
        match resolved.and_then(|i| usize::try_from(i).ok()) {
            Some(i) if i < len => Ok(vec![Value::Tensor(items[i].clone())]),
            _ => Err(OpError::IndexOutOfRange {
                op_type: Self::OP_TYPE,
                index,
                len,
            }),
        }
    }
}
