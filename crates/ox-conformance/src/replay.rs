//! Replay-time type restoration.
//!
//! Golden artifacts store elements at their recorded dtypes. Before replay,
//! each decoded slot is cast back to the dtype the live inputs of the test
//! case carry, so the operator under test sees exactly the element types it
//! saw when the artifact was captured.

use ox_core::{DType, TensorValue, Value, ValueKind};
use serde::{Deserialize, Serialize};

/// Element-type manifest of one slot, mirroring its nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "dtypes", rename_all = "snake_case")]
pub enum SlotDType {
    Tensor(DType),
    Sequence(Vec<DType>),
}

impl SlotDType {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Tensor(_) => ValueKind::Tensor,
            Self::Sequence(_) => ValueKind::Sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayCastError {
    SlotCountMismatch {
        expected: usize,
        actual: usize,
    },
    KindMismatch {
        slot: usize,
        expected: ValueKind,
        actual: ValueKind,
    },
    SequenceLengthMismatch {
        slot: usize,
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for ReplayCastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SlotCountMismatch { expected, actual } => write!(
                f,
                "dtype manifest covers {expected} slots, golden data holds {actual}"
            ),
            Self::KindMismatch {
                slot,
                expected,
                actual,
            } => write!(
                f,
                "slot {slot}: dtype manifest expects a {}, golden data holds a {}",
                expected.as_str(),
                actual.as_str()
            ),
            Self::SequenceLengthMismatch {
                slot,
                expected,
                actual,
            } => write!(
                f,
                "slot {slot}: dtype manifest expects {expected} sequence elements, golden data holds {actual}"
            ),
        }
    }
}

impl std::error::Error for ReplayCastError {}

/// Records the dtype of every tensor in `values`, keeping sequence nesting.
#[must_use]
pub fn capture_dtypes(values: &[Value]) -> Vec<SlotDType> {
    values
        .iter()
        .map(|value| match value {
            Value::Tensor(tensor) => SlotDType::Tensor(tensor.dtype),
            Value::Sequence(items) => {
                SlotDType::Sequence(items.iter().map(|tensor| tensor.dtype).collect())
            }
        })
        .collect()
}

/// Casts each slot of `values` to the dtypes in `manifest`.
///
/// The two lists must have the same length and the same nesting at every
/// slot; any disagreement is an error and nothing is partially cast.
pub fn cast_as(values: Vec<Value>, manifest: &[SlotDType]) -> Result<Vec<Value>, ReplayCastError> {
    if values.len() != manifest.len() {
        return Err(ReplayCastError::SlotCountMismatch {
            expected: manifest.len(),
            actual: values.len(),
        });
    }

    values
        .into_iter()
        .zip(manifest)
        .enumerate()
        .map(|(slot, (value, dtypes))| match (value, dtypes) {
            (Value::Tensor(tensor), SlotDType::Tensor(dtype)) => {
                Ok(Value::Tensor(recast(tensor, *dtype)))
            }
            (Value::Sequence(items), SlotDType::Sequence(dtypes)) => {
                if items.len() != dtypes.len() {
                    return Err(ReplayCastError::SequenceLengthMismatch {
                        slot,
                        expected: dtypes.len(),
                        actual: items.len(),
                    });
                }
                Ok(Value::Sequence(
                    items
                        .into_iter()
                        .zip(dtypes)
                        .map(|(tensor, dtype)| recast(tensor, *dtype))
                        .collect(),
                ))
            }
            (value, dtypes) => Err(ReplayCastError::KindMismatch {
                slot,
                expected: dtypes.kind(),
                actual: value.kind(),
            }),
        })
        .collect()
}

fn recast(tensor: TensorValue, dtype: DType) -> TensorValue {
    if tensor.dtype == dtype {
        tensor
    } else {
        tensor.cast(dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::{ReplayCastError, SlotDType, capture_dtypes, cast_as};
    use ox_core::{DType, Literal, TensorValue, Value, ValueKind};

    fn f64_tensor(values: &[f64]) -> TensorValue {
        TensorValue::from_f64(&[values.len() as u32], values).expect("tensor")
    }

    #[test]
    fn capture_keeps_nesting() {
        let values = vec![
            Value::Tensor(f64_tensor(&[1.0])),
            Value::Sequence(vec![
                TensorValue::from_i64(DType::I32, &[1], &[3]).expect("tensor"),
                TensorValue::from_bool(&[1], &[true]).expect("tensor"),
            ]),
            Value::Sequence(Vec::new()),
        ];
        assert_eq!(
            capture_dtypes(&values),
            vec![
                SlotDType::Tensor(DType::F64),
                SlotDType::Sequence(vec![DType::I32, DType::Bool]),
                SlotDType::Sequence(Vec::new()),
            ]
        );
    }

    #[test]
    fn casts_tensor_and_sequence_slots() {
        let values = vec![
            Value::Tensor(f64_tensor(&[1.5, -2.5])),
            Value::Sequence(vec![f64_tensor(&[0.0, 3.0])]),
        ];
        let manifest = vec![
            SlotDType::Tensor(DType::F32),
            SlotDType::Sequence(vec![DType::Bool]),
        ];
        let cast = cast_as(values, &manifest).expect("cast should succeed");
        assert_eq!(capture_dtypes(&cast), manifest);
        let flags = cast[1].as_sequence().expect("sequence")[0]
            .to_bool_vec()
            .expect("bool tensor");
        assert_eq!(flags, vec![false, true]);
        assert_eq!(
            cast[0].as_tensor().expect("tensor").elements[0],
            Literal::from_f32(1.5)
        );
    }

    #[test]
    fn plain_tensor_where_sequence_expected_fails() {
        let values = vec![Value::Tensor(f64_tensor(&[1.0]))];
        let manifest = vec![SlotDType::Sequence(vec![DType::F64])];
        assert_eq!(
            cast_as(values, &manifest),
            Err(ReplayCastError::KindMismatch {
                slot: 0,
                expected: ValueKind::Sequence,
                actual: ValueKind::Tensor,
            })
        );
    }

    #[test]
    fn slot_and_sequence_lengths_must_agree() {
        let manifest = vec![SlotDType::Tensor(DType::F64)];
        assert!(matches!(
            cast_as(Vec::new(), &manifest),
            Err(ReplayCastError::SlotCountMismatch {
                expected: 1,
                actual: 0
            })
        ));

        let values = vec![Value::Sequence(vec![f64_tensor(&[1.0])])];
        let manifest = vec![SlotDType::Sequence(Vec::new())];
        assert!(matches!(
            cast_as(values, &manifest),
            Err(ReplayCastError::SequenceLengthMismatch { slot: 0, .. })
        ));
    }
}
