//! In-process reference interpreter.
//!
//! The kernels here are written against the operator definitions directly and
//! share nothing with `ox-ops` beyond the value model, so agreement between the
//! two is evidence rather than tautology.

use ox_core::{AttrValue, DType, Literal, Shape, TensorValue, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::checker::check_model;
use crate::model::{ModelDef, NodeDef, TypeDef};
use crate::{CheckerError, EngineError, ReferenceEngine};

#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Interpreter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluates an already loaded model.
    pub fn run_model(
        &self,
        model: &ModelDef,
        feeds: &BTreeMap<String, Value>,
        output_names: &[String],
    ) -> Result<Vec<Value>, EngineError> {
        check_model(model)?;
        let opset_version = model.default_opset().ok_or(CheckerError::MissingDefaultOpset)?;
        let graph = &model.graph;

        let mut env: BTreeMap<&str, Value> = BTreeMap::new();
        for info in &graph.inputs {
            let value = feeds
                .get(&info.name)
                .ok_or_else(|| EngineError::MissingFeed {
                    name: info.name.clone(),
                })?;
            conform(&info.value_type, value).map_err(|detail| EngineError::FeedTypeMismatch {
                name: info.name.clone(),
                detail,
            })?;
            env.insert(info.name.as_str(), value.clone());
        }

        for node in &graph.nodes {
            let mut args = Vec::with_capacity(node.inputs.len());
            for name in &node.inputs {
                let value = env.get(name.as_str()).ok_or_else(|| EngineError::UnknownValue {
                    name: name.clone(),
                })?;
                args.push(value.clone());
            }
            let results = eval_node(node, opset_version, &args).map_err(|detail| {
                EngineError::Kernel {
                    op_type: node.op_type.clone(),
                    detail,
                }
            })?;
            for (name, value) in node.outputs.iter().zip(results) {
                env.insert(name.as_str(), value);
            }
        }

        for info in &graph.outputs {
            let value = env
                .get(info.name.as_str())
                .ok_or_else(|| EngineError::UnknownValue {
                    name: info.name.clone(),
                })?;
            conform(&info.value_type, value).map_err(|detail| EngineError::OutputTypeMismatch {
                name: info.name.clone(),
                detail,
            })?;
        }

        output_names
            .iter()
            .map(|name| {
                env.get(name.as_str())
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownValue { name: name.clone() })
            })
            .collect()
    }
}

impl ReferenceEngine for Interpreter {
    fn name(&self) -> &str {
        "ox-reference-interpreter"
    }

    fn check_model(&self, model: &ModelDef) -> Result<(), CheckerError> {
        check_model(model)
    }

    fn execute(
        &self,
        model_path: &Path,
        feeds: &BTreeMap<String, Value>,
        output_names: &[String],
    ) -> Result<Vec<Value>, EngineError> {
        let model = ModelDef::read_from(model_path)?;
        tracing::debug!(
            path = %model_path.display(),
            nodes = model.graph.nodes.len(),
            "interpreter loaded staged model"
        );
        self.run_model(&model, feeds, output_names)
    }
}

/// Checks `value` against a declared type. Tensor slots must match dtype and
/// shape; sequence elements must match the element dtype only.
fn conform(declared: &TypeDef, value: &Value) -> Result<(), String> {
    match (declared, value) {
        (TypeDef::Tensor { elem_type, shape }, Value::Tensor(tensor)) => {
            if tensor.dtype.onnx_code() != *elem_type {
                return Err(format!(
                    "declared {}, got {}",
                    declared.describe(),
                    tensor.dtype
                ));
            }
            if &tensor.shape.dims != shape {
                return Err(format!(
                    "declared {}, got shape {}",
                    declared.describe(),
                    tensor.shape
                ));
            }
            Ok(())
        }
        (TypeDef::Sequence { elem }, Value::Sequence(items)) => {
            let elem_type = match elem.as_ref() {
                TypeDef::Tensor { elem_type, .. } => *elem_type,
                TypeDef::Sequence { .. } => {
                    return Err("nested sequences are not supported".to_owned());
                }
            };
            match items
                .iter()
                .position(|item| item.dtype.onnx_code() != elem_type)
            {
                Some(index) => Err(format!(
                    "declared {}, element {index} is {}",
                    declared.describe(),
                    items[index].dtype
                )),
                None => Ok(()),
            }
        }
        (TypeDef::Tensor { .. }, Value::Sequence(_)) => {
            Err(format!("declared {}, got a sequence", declared.describe()))
        }
        (TypeDef::Sequence { .. }, Value::Tensor(_)) => {
            Err(format!("declared {}, got a tensor", declared.describe()))
        }
    }
}

fn eval_node(node: &NodeDef, opset_version: u32, args: &[Value]) -> Result<Vec<Value>, String> {
    let value = match node.op_type.as_str() {
        "Cast" => {
            let to = match node.attributes.get("to") {
                Some(AttrValue::Int(code)) => DType::from_onnx_code(*code).map_err(|e| e.to_string())?,
                Some(other) => return Err(format!("'to' must be int, got {}", other.type_name())),
                None => return Err("missing attribute 'to'".to_owned()),
            };
            if node.attributes.contains_key("saturate") && opset_version < 19 {
                return Err("'saturate' requires opset 19".to_owned());
            }
            let input = tensor_arg(args, 0)?;
            let elements = input
                .elements
                .iter()
                .map(|lit| cast_element(*lit, to))
                .collect();
            Value::Tensor(TensorValue::new(to, input.shape.clone(), elements).map_err(|e| e.to_string())?)
        }
        "Less" => compare(args, false, |l, r| l < r)?,
        "LessOrEqual" => compare(args, false, |l, r| l <= r)?,
        "Greater" => compare(args, false, |l, r| l > r)?,
        "GreaterOrEqual" => compare(args, false, |l, r| l >= r)?,
        "Equal" => compare(args, true, |l, r| l == r)?,
        "SequenceConstruct" => {
            let mut items = Vec::with_capacity(args.len());
            for index in 0..args.len() {
                items.push(tensor_arg(args, index)?.clone());
            }
            if items.windows(2).any(|pair| pair[0].dtype != pair[1].dtype) {
                return Err("sequence elements must share one dtype".to_owned());
            }
            Value::Sequence(items)
        }
        "SequenceAt" => {
            let Some(Value::Sequence(items)) = args.first() else {
                return Err("input 0 must be a sequence".to_owned());
            };
            let position = tensor_arg(args, 1)?;
            if !matches!(position.dtype, DType::I32 | DType::I64) || position.len() != 1 {
                return Err("position must be a single int32/int64 element".to_owned());
            }
            let raw = position.elements[0].as_i128().unwrap_or(i128::MIN);
            let len = items.len() as i128;
            let index = if raw < 0 { raw + len } else { raw };
            if index < 0 || index >= len {
                return Err(format!("position {raw} out of range for length {len}"));
            }
            Value::Tensor(items[index as usize].clone())
        }
        other => return Err(format!("no kernel for {other}")),
    };
    Ok(vec![value])
}

fn tensor_arg(args: &[Value], index: usize) -> Result<&TensorValue, String> {
    match args.get(index) {
        Some(Value::Tensor(tensor)) => Ok(tensor),
        Some(Value::Sequence(_)) => Err(format!("input {index} must be a tensor")),
        None => Err(format!("missing input {index}")),
    }
}

/// Numeric value used for ordering. Integers stay exact.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Scalar {
    Int(i128),
    Float(f64),
}

fn scalar_of(lit: Literal) -> Scalar {
    match lit.as_i128() {
        Some(value) => Scalar::Int(value),
        None => Scalar::Float(lit.as_f64()),
    }
}

fn compare(
    args: &[Value],
    accepts_bool: bool,
    predicate: impl Fn(Scalar, Scalar) -> bool,
) -> Result<Value, String> {
    if args.len() != 2 {
        return Err(format!("expected 2 inputs, got {}", args.len()));
    }
    let lhs = tensor_arg(args, 0)?;
    let rhs = tensor_arg(args, 1)?;
    if lhs.dtype != rhs.dtype {
        return Err(format!("operand dtypes differ: {} vs {}", lhs.dtype, rhs.dtype));
    }
    if lhs.dtype == DType::Bool && !accepts_bool {
        return Err("bool operands are not accepted".to_owned());
    }

    let out_shape = broadcast_shape(&lhs.shape, &rhs.shape)?;
    let count = out_shape.iter().product::<usize>();
    let mut elements = Vec::with_capacity(count);
    let mut index = vec![0_usize; out_shape.len()];
    for flat in 0..count {
        unravel(flat, &out_shape, &mut index);
        let l = scalar_of(lhs.elements[ravel_broadcast(&index, &lhs.shape)]);
        let r = scalar_of(rhs.elements[ravel_broadcast(&index, &rhs.shape)]);
        elements.push(Literal::Bool(predicate(l, r)));
    }

    let dims = out_shape.iter().map(|d| *d as u32).collect::<Vec<_>>();
    TensorValue::new(DType::Bool, Shape { dims }, elements)
        .map(Value::Tensor)
        .map_err(|e| e.to_string())
}

fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> Result<Vec<usize>, String> {
    let rank = lhs.rank().max(rhs.rank());
    let pad = |shape: &Shape| {
        let mut dims = vec![1_usize; rank - shape.rank()];
        dims.extend(shape.dims.iter().map(|d| *d as usize));
        dims
    };
    let (l, r) = (pad(lhs), pad(rhs));
    l.iter()
        .zip(r.iter())
        .map(|(&a, &b)| {
            if a == b || b == 1 {
                Ok(a)
            } else if a == 1 {
                Ok(b)
            } else {
                Err(format!("shapes {lhs} and {rhs} do not broadcast"))
            }
        })
        .collect()
}

fn unravel(mut flat: usize, shape: &[usize], index: &mut [usize]) {
    for axis in (0..shape.len()).rev() {
        index[axis] = flat % shape[axis];
        flat /= shape[axis];
    }
}

/// Flat offset into `shape` for an output multi-index, taking index 0 along
/// padded and unit axes.
fn ravel_broadcast(index: &[usize], shape: &Shape) -> usize {
    let pad = index.len() - shape.rank();
    shape
        .dims
        .iter()
        .enumerate()
        .fold(0_usize, |offset, (axis, dim)| {
            let dim = *dim as usize;
            let i = if dim == 1 { 0 } else { index[axis + pad] };
            offset * dim + i
        })
}

fn cast_element(lit: Literal, to: DType) -> Literal {
    let exact = lit.as_i128();
    match to {
        DType::Bool => Literal::Bool(match exact {
            Some(v) => v != 0,
            None => lit.as_f64() != 0.0,
        }),
        DType::F64 => Literal::from_f64(match exact {
            Some(v) => v as f64,
            None => lit.as_f64(),
        }),
        DType::F32 => Literal::from_f32(match exact {
            Some(v) => (v as f64) as f32,
            None => lit.as_f64() as f32,
        }),
        _ => {
            let bits = (to.size_bytes() * 8) as u32;
            let signed = to.is_signed_int();
            let value = match exact {
                Some(v) => wrap_to_width(v, bits, signed),
                None => {
                    let f = lit.as_f64();
                    if f.is_nan() {
                        0
                    } else {
                        let (min, max) = int_bounds(bits, signed);
                        (f.trunc() as i128).clamp(min, max)
                    }
                }
            };
            if signed {
                Literal::I64(value as i64)
            } else {
                Literal::U64(value as u64)
            }
        }
    }
}

fn int_bounds(bits: u32, signed: bool) -> (i128, i128) {
    if signed {
        (-(1_i128 << (bits - 1)), (1_i128 << (bits - 1)) - 1)
    } else {
        (0, (1_i128 << bits) - 1)
    }
}

fn wrap_to_width(value: i128, bits: u32, signed: bool) -> i128 {
    let modulus = 1_i128 << bits;
    let wrapped = value.rem_euclid(modulus);
    if signed && wrapped >= modulus / 2 {
        wrapped - modulus
    } else {
        wrapped
    }
}
