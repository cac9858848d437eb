#![forbid(unsafe_code)]

//! Tensor-sequence operators: sequence-typed outputs and inputs.

use ox_conformance::{Harness, TestCase};
use ox_core::{Attributes, DType, TensorValue, Value};
use ox_ops::{Operator, SequenceAt, SequenceConstruct};
use ox_test_utils::{init_test_logging, randn_f32, seeded_rng, test_name};

fn harness() -> Harness {
    init_test_logging();
    Harness::from_environment().expect("harness")
}

fn random_tensors(name: &str, count: usize, dims: &[u32]) -> Vec<TensorValue> {
    let mut rng = seeded_rng(name);
    (0..count)
        .map(|_| randn_f32(&mut rng, dims).expect("random tensor"))
        .collect()
}

#[test]
fn sequence_construct_collects_inputs() {
    let name = test_name!();
    let tensors = random_tensors(name, 3, &[2, 3]);
    let case = TestCase::new(
        name,
        11,
        Attributes::new(),
        tensors.iter().cloned().map(Value::Tensor).collect(),
    );
    let report = harness()
        .check::<SequenceConstruct>(&case)
        .unwrap_or_else(|err| panic!("{name}: {err}"));
    assert_eq!(report.stats.compared_elements, 18);

    let outputs = SequenceConstruct::new(11, &case.attrs)
        .expect("operator")
        .run(&case.inputs)
        .expect("run");
    assert_eq!(outputs, vec![Value::Sequence(tensors)]);
}

#[test]
fn sequence_at_negative_position() {
    let name = test_name!();
    let tensors = random_tensors(name, 4, &[5]);
    let position = TensorValue::from_i64(DType::I64, &[], &[-1]).expect("tensor");
    let case = TestCase::new(
        name,
        11,
        Attributes::new(),
        vec![Value::Sequence(tensors.clone()), Value::Tensor(position)],
    );
    harness()
        .check::<SequenceAt>(&case)
        .unwrap_or_else(|err| panic!("{name}: {err}"));

    let outputs = SequenceAt::new(11, &case.attrs)
        .expect("operator")
        .run(&case.inputs)
        .expect("run");
    assert_eq!(outputs, vec![Value::Tensor(tensors[3].clone())]);
}

#[test]
fn sequence_at_rejects_out_of_range_position() {
    let tensors = random_tensors(test_name!(), 2, &[1]);
    let position = TensorValue::from_i64(DType::I32, &[], &[2]).expect("tensor");
    let op = SequenceAt::new(11, &Attributes::new()).expect("operator");
    assert!(
        op.run(&[Value::Sequence(tensors), Value::Tensor(position)])
            .is_err()
    );
}
