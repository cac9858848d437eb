#![forbid(unsafe_code)]

mod broadcast;
mod cast;
mod comparison;
mod sequence;

pub use cast::Cast;
pub use comparison::{Equal, Greater, GreaterOrEqual, Less, LessOrEqual};
pub use sequence::{SequenceAt, SequenceConstruct};

use ox_core::{Attributes, DType, Shape, Value, ValueError, ValueKind};

/// An operator instantiated for one opset version and attribute set.
///
/// Construction validates the attributes once; `run` may then be called any
/// number of times.
pub trait Operator: Sized {
    const OP_TYPE: &'static str;
    /// First opset version whose semantics this implementation follows.
    const SINCE_VERSION: u32;

    fn new(opset_version: u32, attrs: &Attributes) -> Result<Self, OpError>;

    fn run(&self, inputs: &[Value]) -> Result<Vec<Value>, OpError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpError {
    UnsupportedOpset {
        op_type: &'static str,
        opset_version: u32,
        since_version: u32,
    },
    MissingAttribute {
        op_type: &'static str,
        name: &'static str,
    },
    InvalidAttribute {
        op_type: &'static str,
        name: String,
        detail: String,
    },
    ArityMismatch {
        op_type: &'static str,
        expected: &'static str,
        actual: usize,
    },
    KindMismatch {
        op_type: &'static str,
        index: usize,
        expected: ValueKind,
        actual: ValueKind,
    },
    TypeMismatch {
        op_type: &'static str,
        detail: String,
    },
    UnsupportedDType {
        op_type: &'static str,
        dtype: DType,
    },
    BroadcastMismatch {
        op_type: &'static str,
        left: Shape,
        right: Shape,
    },
    IndexOutOfRange {
        op_type: &'static str,
        index: i64,
        len: usize,
    },
    InvalidTensor(ValueError),
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedOpset {
                op_type,
                opset_version,
                since_version,
            } => write!(
                f,
                "{op_type} is not defined at opset {opset_version} (available since {since_version})"
            ),
            Self::MissingAttribute { op_type, name } => {
                write!(f, "{op_type} requires attribute '{name}'")
            }
            Self::InvalidAttribute {
                op_type,
                name,
                detail,
            } => write!(f, "{op_type} attribute '{name}' is invalid: {detail}"),
            Self::ArityMismatch {
                op_type,
                expected,
                actual,
            } => write!(
                f,
                "arity mismatch for {op_type}: expected {expected} inputs, got {actual}"
            ),
            Self::KindMismatch {
                op_type,
                index,
                expected,
                actual,
            } => write!(
                f,
                "{op_type} input {index} must be a {}, got a {}",
                expected.as_str(),
                actual.as_str()
            ),
            Self::TypeMismatch { op_type, detail } => {
                write!(f, "type mismatch for {op_type}: {detail}")
            }
            Self::UnsupportedDType { op_type, dtype } => {
                write!(f, "{op_type} does not accept {dtype} inputs")
            }
            Self::BroadcastMismatch {
                op_type,
                left,
                right,
            } => write!(
                f,
                "{op_type} operands are not broadcast-compatible: {left} vs {right}"
            ),
            Self::IndexOutOfRange {
                op_type,
                index,
                len,
            } => write!(
                f,
                "{op_type} position {index} is out of range for length {len}"
            ),
            Self::InvalidTensor(err) => write!(f, "invalid tensor: {err}"),
        }
    }
}

impl std::error::Error for OpError {}

impl From<ValueError> for OpError {
    fn from(value: ValueError) -> Self {
        Self::InvalidTensor(value)
    }
}

pub(crate) fn require_opset(
    op_type: &'static str,
    since_version: u32,
    opset_version: u32,
) -> Result<(), OpError> {
    if opset_version < since_version {
        return Err(OpError::UnsupportedOpset {
            op_type,
            opset_version,
            since_version,
        });
    }
    Ok(())
}

/// Rejects attribute names outside `known`.
pub(crate) fn reject_unknown_attributes(
    op_type: &'static str,
    attrs: &Attributes,
    known: &[&str],
) -> Result<(), OpError> {
    if let Some(name) = attrs.keys().find(|name| !known.contains(&name.as_str())) {
        return Err(OpError::InvalidAttribute {
            op_type,
            name: name.clone(),
            detail: "unknown attribute".to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{OpError, require_opset};

    #[test]
    fn opset_gate_reports_since_version() {
        assert_eq!(require_opset("LessOrEqual", 12, 13), Ok(()));
        let err = require_opset("LessOrEqual", 12, 11).expect_err("should fail");
        assert_eq!(
            err,
            OpError::UnsupportedOpset {
                op_type: "LessOrEqual",
                opset_version: 11,
                since_version: 12,
            }
        );
        assert!(err.to_string().contains("since 12"));
    }
}
