//! Tolerance comparison of output lists.
//!
//! Kind, dtype and shape must match exactly at every slot. Boolean elements
//! must be equal. Numeric elements pass when their absolute difference is
//! strictly below `max_error`; integer differences are computed exactly, and
//! NaN never compares equal to anything.

use ox_core::{DType, Literal, Shape, TensorValue, Value, ValueKind};

pub const DEFAULT_MAX_ERROR: f64 = 1e-4;

/// Position of a tensor inside an output list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorLocation {
    pub slot: usize,
    /// Element index within a sequence slot.
    pub item: Option<usize>,
}

impl std::fmt::Display for TensorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.item {
            Some(item) => write!(f, "output {}[{item}]", self.slot),
            None => write!(f, "output {}", self.slot),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonError {
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
    DTypeMismatch {
        at: TensorLocation,
        expected: DType,
        actual: DType,
    },
    ShapeMismatch {
        at: TensorLocation,
        expected: Shape,
        actual: Shape,
    },
    BoolMismatch {
        at: TensorLocation,
        element: usize,
        expected: bool,
        actual: bool,
    },
    ValueMismatch {
        at: TensorLocation,
        element: usize,
        expected: f64,
        actual: f64,
        abs_error: f64,
        max_error: f64,
    },
}

impl std::fmt::Display for ComparisonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SlotCountMismatch { expected, actual } => {
                write!(f, "expected {expected} outputs, got {actual}")
            }
            Self::KindMismatch {
                slot,
                expected,
                actual,
            } => write!(
                f,
                "output {slot}: expected a {}, got a {}",
                expected.as_str(),
                actual.as_str()
            ),
            Self::SequenceLengthMismatch {
                slot,
                expected,
                actual,
            } => write!(
                f,
                "output {slot}: expected {expected} sequence elements, got {actual}"
            ),
            Self::DTypeMismatch {
                at,
                expected,
                actual,
            } => write!(f, "{at}: expected dtype {expected}, got {actual}"),
            Self::ShapeMismatch {
                at,
                expected,
                actual,
            } => write!(f, "{at}: expected shape {expected}, got {actual}"),
            Self::BoolMismatch {
                at,
                element,
                expected,
                actual,
            } => write!(f, "{at}, element {element}: expected {expected}, got {actual}"),
            Self::ValueMismatch {
                at,
                element,
                expected,
                actual,
                abs_error,
                max_error,
            } => write!(
                f,
                "{at}, element {element}: expected {expected}, got {actual} (abs error {abs_error:e}, max {max_error:e})"
            ),
        }
    }
}

impl std::error::Error for ComparisonError {}

/// Summary of a passing comparison.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComparisonStats {
    pub compared_elements: usize,
    pub max_abs_error: f64,
}

/// Compares `actual` against `expected`, reporting the first mismatch.
pub fn compare_values(
    expected: &[Value],
    actual: &[Value],
    max_error: f64,
) -> Result<ComparisonStats, ComparisonError> {
    if expected.len() != actual.len() {
        return Err(ComparisonError::SlotCountMismatch {
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    let mut stats = ComparisonStats::default();
    for (slot, (want, got)) in expected.iter().zip(actual).enumerate() {
        match (want, got) {
            (Value::Tensor(want), Value::Tensor(got)) => {
                let at = TensorLocation { slot, item: None };
                compare_tensors(at, want, got, max_error, &mut stats)?;
            }
            (Value::Sequence(want), Value::Sequence(got)) => {
                if want.len() != got.len() {
                    return Err(ComparisonError::SequenceLengthMismatch {
                        slot,
                        expected: want.len(),
                        actual: got.len(),
                    });
                }
                for (item, (want, got)) in want.iter().zip(got).enumerate() {
                    let at = TensorLocation {
                        slot,
                        item: Some(item),
                    };
                    compare_tensors(at, want, got, max_error, &mut stats)?;
                }
            }
            (want, got) => {
                return Err(ComparisonError::KindMismatch {
                    slot,
                    expected: want.kind(),
                    actual: got.kind(),
                });
            }
        }
    }
    Ok(stats)
}

/// Panicking form of [`compare_values`] for use inside tests.
#[track_caller]
pub fn assert_equal(expected: &[Value], actual: &[Value], max_error: f64) {
    if let Err(err) = compare_values(expected, actual, max_error) {
        panic!("outputs differ: {err}");
    }
}

fn compare_tensors(
    at: TensorLocation,
    expected: &TensorValue,
    actual: &TensorValue,
    max_error: f64,
    stats: &mut ComparisonStats,
) -> Result<(), ComparisonError> {
    if expected.dtype != actual.dtype {
        return Err(ComparisonError::DTypeMismatch {
            at,
            expected: expected.dtype,
            actual: actual.dtype,
        });
    }
    if expected.shape != actual.shape {
        return Err(ComparisonError::ShapeMismatch {
            at,
            expected: expected.shape.clone(),
            actual: actual.shape.clone(),
        });
    }

    for (element, (want, got)) in expected.elements.iter().zip(&actual.elements).enumerate() {
        if expected.dtype == DType::Bool {
            if want.is_truthy() != got.is_truthy() {
                return Err(ComparisonError::BoolMismatch {
                    at,
                    element,
                    expected: want.is_truthy(),
                    actual: got.is_truthy(),
                });
            }
        } else {
            let abs_error = abs_difference(*want, *got);
            if abs_error.is_nan() || abs_error >= max_error {
                return Err(ComparisonError::ValueMismatch {
                    at,
                    element,
                    expected: want.as_f64(),
                    actual: got.as_f64(),
                    abs_error,
                    max_error,
                });
            }
            stats.max_abs_error = stats.max_abs_error.max(abs_error);
        }
        stats.compared_elements += 1;
    }
    Ok(())
}

fn abs_difference(lhs: Literal, rhs: Literal) -> f64 {
    match (lhs.as_i128(), rhs.as_i128()) {
        (Some(lhs), Some(rhs)) => (lhs - rhs).unsigned_abs() as f64,
        _ => (lhs.as_f64() - rhs.as_f64()).abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::{ComparisonError, DEFAULT_MAX_ERROR, assert_equal, compare_values};
    use ox_core::{DType, TensorValue, Value};

    fn f32_value(dims: &[u32], values: &[f32]) -> Value {
        Value::Tensor(TensorValue::from_f32(dims, values).expect("tensor"))
    }

    #[test]
    fn identical_outputs_pass() {
        let outputs = vec![
            f32_value(&[2], &[1.0, 2.0]),
            Value::Sequence(vec![TensorValue::from_bool(&[1], &[true]).expect("tensor")]),
        ];
        let stats = compare_values(&outputs, &outputs, DEFAULT_MAX_ERROR).expect("should match");
        assert_eq!(stats.compared_elements, 3);
        assert_eq!(stats.max_abs_error, 0.0);
    }

    #[test]
    fn tolerance_bound_is_strict() {
        let expected = vec![Value::Tensor(TensorValue::from_f64(&[1], &[1.0]).expect("tensor"))];
        let within = vec![Value::Tensor(TensorValue::from_f64(&[1], &[1.00005]).expect("tensor"))];
        let at_bound = vec![Value::Tensor(TensorValue::from_f64(&[1], &[1.5]).expect("tensor"))];
        assert!(compare_values(&expected, &within, DEFAULT_MAX_ERROR).is_ok());
        assert!(matches!(
            compare_values(&expected, &at_bound, 0.5),
            Err(ComparisonError::ValueMismatch { element: 0, .. })
        ));
    }

    #[test]
    fn nan_never_matches() {
        let nan = vec![f32_value(&[1], &[f32::NAN])];
        assert!(matches!(
            compare_values(&nan, &nan, DEFAULT_MAX_ERROR),
            Err(ComparisonError::ValueMismatch { .. })
        ));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let expected = vec![Value::Tensor(
            TensorValue::from_i64(DType::I64, &[1], &[i64::MAX]).expect("tensor"),
        )];
        let actual = vec![Value::Tensor(
            TensorValue::from_i64(DType::I64, &[1], &[i64::MAX - 1]).expect("tensor"),
        )];
        assert!(matches!(
            compare_values(&expected, &actual, 0.5),
            Err(ComparisonError::ValueMismatch { abs_error, .. }) if abs_error == 1.0
        ));
    }

    #[test]
    fn dtype_and_shape_must_match_exactly() {
        let expected = vec![f32_value(&[2], &[1.0, 2.0])];
        let wrong_dtype = vec![Value::Tensor(
            TensorValue::from_f64(&[2], &[1.0, 2.0]).expect("tensor"),
        )];
        let wrong_shape = vec![f32_value(&[2, 1], &[1.0, 2.0])];
        assert!(matches!(
            compare_values(&expected, &wrong_dtype, DEFAULT_MAX_ERROR),
            Err(ComparisonError::DTypeMismatch { .. })
        ));
        assert!(matches!(
            compare_values(&expected, &wrong_shape, DEFAULT_MAX_ERROR),
            Err(ComparisonError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn bool_mismatch_reports_element() {
        let expected = vec![Value::Tensor(
            TensorValue::from_bool(&[3], &[true, false, true]).expect("tensor"),
        )];
        let actual = vec![Value::Tensor(
            TensorValue::from_bool(&[3], &[true, true, true]).expect("tensor"),
        )];
        let err = compare_values(&expected, &actual, DEFAULT_MAX_ERROR).expect_err("should differ");
        assert!(matches!(
            err,
            ComparisonError::BoolMismatch {
                element: 1,
                expected: false,
                actual: true,
                ..
            }
        ));
        assert!(err.to_string().contains("element 1"));

        // Tolerance never applies to bool elements.
        assert!(matches!(
            compare_values(&expected, &actual, 1e9),
            Err(ComparisonError::BoolMismatch { element: 1, .. })
        ));
    }

    #[test]
    fn nesting_and_counts_must_match() {
        let tensor = vec![f32_value(&[1], &[1.0])];
        let sequence = vec![Value::Sequence(Vec::new())];
        assert!(matches!(
            compare_values(&tensor, &sequence, DEFAULT_MAX_ERROR),
            Err(ComparisonError::KindMismatch { slot: 0, .. })
        ));
        assert!(matches!(
            compare_values(&tensor, &[], DEFAULT_MAX_ERROR),
            Err(ComparisonError::SlotCountMismatch { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "outputs differ")]
    fn assert_equal_panics_on_mismatch() {
        assert_equal(
            &[f32_value(&[1], &[1.0])],
            &[f32_value(&[1], &[2.0])],
            DEFAULT_MAX_ERROR,
        );
    }
}
