use ox_core::{Attributes, DType, Value, ValueKind};

use crate::{OpError, Operator, reject_unknown_attributes, require_opset};

/// Element-type conversion to the dtype named by the `to` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cast {
    to: DType,
}

impl Cast {
    #[must_use]
    pub fn target(&self) -> DType {
        self.to
    }
}

impl Operator for Cast {
    const OP_TYPE: &'static str = "Cast";
    const SINCE_VERSION: u32 = 6;

    fn new(opset_version: u32, attrs: &Attributes) -> Result<Self, OpError> {
        require_opset(Self::OP_TYPE, Self::SINCE_VERSION, opset_version)?;
        let known: &[&str] = if opset_version >= 19 {
            &["to", "saturate"]
        } else {
            &["to"]
        };
        reject_unknown_attributes(Self::OP_TYPE, attrs, known)?;

        let attr = attrs.get("to").ok_or(OpError::MissingAttribute {
            op_type: Self::OP_TYPE,
            name: "to",
        })?;
        let code = attr.as_int().ok_or_else(|| OpError::InvalidAttribute {
            op_type: Self::OP_TYPE,
            name: "to".to_owned(),
            detail: format!("expected int, got {}", attr.type_name()),
        })?;
        let to = DType::from_onnx_code(code).map_err(|err| OpError::InvalidAttribute {
            op_type: Self::OP_TYPE,
            name: "to".to_owned(),
            detail: err.to_string(),
        })?;

        // saturate only changes float8 targets, none of which are supported
        if let Some(saturate) = attrs.get("saturate")
            && saturate.as_int().is_none()
        {
            return Err(OpError::InvalidAttribute {
                op_type: Self::OP_TYPE,
                name: "saturate".to_owned(),
                detail: format!("expected int, got {}", saturate.type_name()),
            });
        }

        Ok(Self { to })
    }

    fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, OpError> {
        let [input] = inputs else {
            return Err(OpError::ArityMismatch {
                op_type: Self::OP_TYPE,
                expected: "1",
                actual: inputs.len(),
            });
        };
        let Value::Tensor(tensor) = input else {
            return Err(OpError::KindMismatch {
                op_type: Self::OP_TYPE,
                index: 0,
                expected: ValueKind::Tensor,
                actual: input.kind(),
            });
        };
        Ok(vec![Value::Tensor(tensor.cast(self.to))])
    }
}
