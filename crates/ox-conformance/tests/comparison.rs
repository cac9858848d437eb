#![forbid(unsafe_code)]

//! Broadcasting comparison operators against the reference oracle.

use ox_conformance::{CheckReport, Harness, TestCase};
use ox_core::{Attributes, DType, TensorValue, Value};
use ox_ops::{Equal, Greater, LessOrEqual, Operator};
use ox_test_utils::{init_test_logging, randn_f32, seeded_rng, test_name};

fn random_pair(name: &str, x_dims: &[u32], y_dims: &[u32]) -> TestCase {
    let mut rng = seeded_rng(name);
    let x = randn_f32(&mut rng, x_dims).expect("random tensor");
    let y = randn_f32(&mut rng, y_dims).expect("random tensor");
    TestCase::new(
        name,
        13,
        Attributes::new(),
        vec![Value::Tensor(x), Value::Tensor(y)],
    )
}

fn check<Op: Operator>(case: &TestCase) -> CheckReport {
    init_test_logging();
    let harness = Harness::from_environment().expect("harness");
    harness
        .check::<Op>(case)
        .unwrap_or_else(|err| panic!("{}: {err}", case.name))
}

fn run<Op: Operator>(case: &TestCase) -> TensorValue {
    let mut outputs = Op::new(case.opset_version, &case.attrs)
        .expect("operator")
        .run(&case.inputs)
        .expect("run");
    match outputs.pop() {
        Some(Value::Tensor(tensor)) if outputs.is_empty() => tensor,
        other => panic!("expected one tensor output, got {other:?}"),
    }
}

// ── LessOrEqual ─────────────────────────────────────────────────────

#[test]
fn less_or_equal_same_shape() {
    let case = random_pair(test_name!(), &[3, 4, 5], &[3, 4, 5]);
    let report = check::<LessOrEqual>(&case);
    assert_eq!(report.stats.compared_elements, 60);

    let z = run::<LessOrEqual>(&case);
    assert_eq!(z.dtype, DType::Bool);
    assert_eq!(z.shape.dims, vec![3, 4, 5]);
    let x = case.inputs[0].as_tensor().expect("tensor").to_f64_vec();
    let y = case.inputs[1].as_tensor().expect("tensor").to_f64_vec();
    let z = z.to_bool_vec().expect("bool tensor");
    for i in 0..60 {
        assert_eq!(z[i], x[i] <= y[i], "element {i}");
    }
}

#[test]
fn less_or_equal_broadcasts_trailing_axis() {
    let case = random_pair(test_name!(), &[3, 4, 5], &[5]);
    check::<LessOrEqual>(&case);

    let z = run::<LessOrEqual>(&case);
    assert_eq!(z.shape.dims, vec![3, 4, 5]);
    let x = case.inputs[0].as_tensor().expect("tensor").to_f64_vec();
    let y = case.inputs[1].as_tensor().expect("tensor").to_f64_vec();
    let z = z.to_bool_vec().expect("bool tensor");
    for i in 0..60 {
        assert_eq!(z[i], x[i] <= y[i % 5], "element {i}");
    }
}

#[test]
fn less_or_equal_needs_opset_12() {
    let case = random_pair(test_name!(), &[2], &[2]);
    assert!(LessOrEqual::new(11, &case.attrs).is_err());
}

// ── Greater / Equal ─────────────────────────────────────────────────

#[test]
fn greater_broadcasts_column_against_row() {
    let case = random_pair(test_name!(), &[4, 1], &[1, 3]);
    let report = check::<Greater>(&case);
    assert_eq!(report.stats.compared_elements, 12);
}

#[test]
fn equal_on_integers() {
    let x = TensorValue::from_i64(DType::I32, &[2, 3], &[1, 2, 3, 4, 5, 6]).expect("tensor");
    let y = TensorValue::from_i64(DType::I32, &[3], &[1, 5, 3]).expect("tensor");
    let case = TestCase::new(
        test_name!(),
        13,
        Attributes::new(),
        vec![Value::Tensor(x), Value::Tensor(y)],
    );
    check::<Equal>(&case);

    let z = run::<Equal>(&case).to_bool_vec().expect("bool tensor");
    assert_eq!(z, vec![true, false, true, false, true, false]);
}
