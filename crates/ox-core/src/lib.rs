#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Element type tag of a tensor.
///
/// The tag is carried explicitly with every tensor and is never inferred from
/// the element values: graph typing and comparison both depend on the exact
/// numeric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
}

pub const ALL_DTYPES: [DType; 11] = [
    DType::F32,
    DType::F64,
    DType::I8,
    DType::I16,
    DType::I32,
    DType::I64,
    DType::U8,
    DType::U16,
    DType::U32,
    DType::U64,
    DType::Bool,
];

impl DType {
    /// Standardized tensor element code (`TensorProto.DataType`).
    #[must_use]
    pub const fn onnx_code(self) -> i64 {
        match self {
            Self::F32 => 1,
            Self::U8 => 2,
            Self::I8 => 3,
            Self::U16 => 4,
            Self::I16 => 5,
            Self::I32 => 6,
            Self::I64 => 7,
            Self::Bool => 9,
            Self::F64 => 11,
            Self::U32 => 12,
            Self::U64 => 13,
        }
    }

    pub fn from_onnx_code(code: i64) -> Result<Self, ValueError> {
        ALL_DTYPES
            .iter()
            .copied()
            .find(|dtype| dtype.onnx_code() == code)
            .ok_or(ValueError::UnsupportedElementType { code })
    }

    #[must_use]
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I16 | Self::U16 => 2,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 | Self::I64 | Self::U64 => 8,
        }
    }

    #[must_use]
    pub const fn is_signed_int(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::Bool => "bool",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub dims: Vec<u32>,
}

impl Shape {
    #[must_use]
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    #[must_use]
    pub fn vector(len: u32) -> Self {
        Self { dims: vec![len] }
    }

    #[must_use]
    pub fn from_dims(dims: &[u32]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn element_count(&self) -> Option<u64> {
        self.dims
            .iter()
            .try_fold(1_u64, |acc, dim| acc.checked_mul(u64::from(*dim)))
    }

    /// Multidirectional broadcast of two shapes, aligned on trailing axes.
    /// Returns `None` when a pair of axes is neither equal nor 1.
    #[must_use]
    pub fn broadcast(&self, other: &Shape) -> Option<Shape> {
        let rank = self.rank().max(other.rank());
        let mut dims = Vec::with_capacity(rank);
        for axis in 0..rank {
            let lhs = axis_from_end(&self.dims, rank - 1 - axis);
            let rhs = axis_from_end(&other.dims, rank - 1 - axis);
            let dim = match (lhs, rhs) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                _ => return None,
            };
            dims.push(dim);
        }
        Some(Shape { dims })
    }
}

fn axis_from_end(dims: &[u32], offset: usize) -> u32 {
    if offset < dims.len() {
        dims[dims.len() - 1 - offset]
    } else {
        1
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

/// A single tensor element.
///
/// Signed integers widen to `I64`, unsigned to `U64`, and both float widths
/// to `F64Bits`. An `F32` element is the exact `f64` image of an `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64Bits(u64),
}

impl Literal {
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        Self::F64Bits(value.to_bits())
    }

    #[must_use]
    pub fn from_f32(value: f32) -> Self {
        Self::F64Bits(f64::from(value).to_bits())
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(value) => {
                if value {
                    1.0
                } else {
                    0.0
                }
            }
            Self::I64(value) => value as f64,
            Self::U64(value) => value as f64,
            Self::F64Bits(bits) => f64::from_bits(bits),
        }
    }

    /// Exact integer view; `None` for float elements.
    #[must_use]
    pub fn as_i128(self) -> Option<i128> {
        match self {
            Self::Bool(value) => Some(i128::from(value)),
            Self::I64(value) => Some(i128::from(value)),
            Self::U64(value) => Some(i128::from(value)),
            Self::F64Bits(_) => None,
        }
    }

    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_truthy(self) -> bool {
        match self {
            Self::Bool(value) => value,
            Self::I64(value) => value != 0,
            Self::U64(value) => value != 0,
            Self::F64Bits(bits) => f64::from_bits(bits) != 0.0,
        }
    }

    /// Whether this literal is a legal element of a tensor tagged `dtype`.
    #[must_use]
    pub fn fits(self, dtype: DType) -> bool {
        match (self, dtype) {
            (Self::Bool(_), DType::Bool) => true,
            (Self::F64Bits(_), DType::F64) => true,
            (Self::F64Bits(bits), DType::F32) => {
                let value = f64::from_bits(bits);
                value.is_nan() || f64::from(value as f32) == value
            }
            (Self::I64(value), DType::I8) => i8::try_from(value).is_ok(),
            (Self::I64(value), DType::I16) => i16::try_from(value).is_ok(),
            (Self::I64(value), DType::I32) => i32::try_from(value).is_ok(),
            (Self::I64(_), DType::I64) => true,
            (Self::U64(value), DType::U8) => u8::try_from(value).is_ok(),
            (Self::U64(value), DType::U16) => u16::try_from(value).is_ok(),
            (Self::U64(value), DType::U32) => u32::try_from(value).is_ok(),
            (Self::U64(_), DType::U64) => true,
            _ => false,
        }
    }

    /// Converts with numeric-array `astype` rules: floats truncate toward zero
    /// and saturate at the target bounds (NaN becomes 0), integers wrap to the
    /// target width, and anything non-zero becomes `true`.
    #[must_use]
    pub fn convert(self, dtype: DType) -> Self {
        match dtype {
            DType::Bool => Self::Bool(self.is_truthy()),
            DType::F64 => Self::from_f64(self.as_f64()),
            DType::F32 => Self::from_f32(self.as_f64() as f32),
            DType::I8 | DType::I16 | DType::I32 | DType::I64 => Self::I64(self.to_signed(dtype)),
            DType::U8 | DType::U16 | DType::U32 | DType::U64 => Self::U64(self.to_unsigned(dtype)),
        }
    }

    fn to_signed(self, dtype: DType) -> i64 {
        if let Some(value) = self.as_i128() {
            return match dtype {
                DType::I8 => i64::from(value as i8),
                DType::I16 => i64::from(value as i16),
                DType::I32 => i64::from(value as i32),
                _ => value as i64,
            };
        }
        let value = self.as_f64();
        match dtype {
            DType::I8 => i64::from(value as i8),
            DType::I16 => i64::from(value as i16),
            DType::I32 => i64::from(value as i32),
            _ => value as i64,
        }
    }

    fn to_unsigned(self, dtype: DType) -> u64 {
        if let Some(value) = self.as_i128() {
            return match dtype {
                DType::U8 => u64::from(value as u8),
                DType::U16 => u64::from(value as u16),
                DType::U32 => u64::from(value as u32),
                _ => value as u64,
            };
        }
        let value = self.as_f64();
        match dtype {
            DType::U8 => u64::from(value as u8),
            DType::U16 => u64::from(value as u16),
            DType::U32 => u64::from(value as u32),
            _ => value as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorValue {
    pub dtype: DType,
    pub shape: Shape,
    pub elements: Vec<Literal>,
}

impl TensorValue {
    pub fn new(dtype: DType, shape: Shape, elements: Vec<Literal>) -> Result<Self, ValueError> {
        let expected_count = shape.element_count().ok_or(ValueError::ShapeOverflow {
            shape: shape.clone(),
        })?;

        if expected_count != elements.len() as u64 {
            return Err(ValueError::ElementCountMismatch {
                shape,
                expected_count,
                actual_count: elements.len(),
            });
        }

        if let Some(index) = elements.iter().position(|lit| !lit.fits(dtype)) {
            return Err(ValueError::LiteralOutOfDomain { dtype, index });
        }

        Ok(Self {
            dtype,
            shape,
            elements,
        })
    }

    pub fn from_f32(dims: &[u32], values: &[f32]) -> Result<Self, ValueError> {
        let elements = values.iter().copied().map(Literal::from_f32).collect();
        Self::new(DType::F32, Shape::from_dims(dims), elements)
    }

    pub fn from_f64(dims: &[u32], values: &[f64]) -> Result<Self, ValueError> {
        let elements = values.iter().copied().map(Literal::from_f64).collect();
        Self::new(DType::F64, Shape::from_dims(dims), elements)
    }

    /// Builds a signed-integer tensor; values must fit `dtype`.
    pub fn from_i64(dtype: DType, dims: &[u32], values: &[i64]) -> Result<Self, ValueError> {
        let elements = values.iter().copied().map(Literal::I64).collect();
        Self::new(dtype, Shape::from_dims(dims), elements)
    }

    /// Builds an unsigned-integer tensor; values must fit `dtype`.
    pub fn from_u64(dtype: DType, dims: &[u32], values: &[u64]) -> Result<Self, ValueError> {
        let elements = values.iter().copied().map(Literal::U64).collect();
        Self::new(dtype, Shape::from_dims(dims), elements)
    }

    pub fn from_bool(dims: &[u32], values: &[bool]) -> Result<Self, ValueError> {
        let elements = values.iter().copied().map(Literal::Bool).collect();
        Self::new(DType::Bool, Shape::from_dims(dims), elements)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Element-wise `astype`. Casting to the current dtype returns an equal
    /// tensor.
    #[must_use]
    pub fn cast(&self, dtype: DType) -> Self {
        if dtype == self.dtype {
            return self.clone();
        }
        Self {
            dtype,
            shape: self.shape.clone(),
            elements: self
                .elements
                .iter()
                .map(|lit| lit.convert(dtype))
                .collect(),
        }
    }

    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.elements.iter().copied().map(Literal::as_f64).collect()
    }

    pub fn to_bool_vec(&self) -> Option<Vec<bool>> {
        self.elements.iter().copied().map(Literal::as_bool).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Tensor,
    Sequence,
}

impl ValueKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tensor => "tensor",
            Self::Sequence => "sequence",
        }
    }
}

/// An operator input or output slot: one tensor, or an ordered tensor
/// sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Tensor(TensorValue),
    Sequence(Vec<TensorValue>),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Tensor(_) => ValueKind::Tensor,
            Self::Sequence(_) => ValueKind::Sequence,
        }
    }

    #[must_use]
    pub fn as_tensor(&self) -> Option<&TensorValue> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            Self::Sequence(_) => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&[TensorValue]> {
        match self {
            Self::Tensor(_) => None,
            Self::Sequence(items) => Some(items),
        }
    }

    /// The tensor that determines this slot's declared type: the tensor
    /// itself, or the first element of a sequence.
    #[must_use]
    pub fn type_exemplar(&self) -> Option<&TensorValue> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            Self::Sequence(items) => items.first(),
        }
    }
}

impl From<TensorValue> for Value {
    fn from(value: TensorValue) -> Self {
        Self::Tensor(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
    Tensor(TensorValue),
}

impl AttrValue {
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Ints(_) => "ints",
            Self::Floats(_) => "floats",
            Self::Strings(_) => "strings",
            Self::Tensor(_) => "tensor",
        }
    }
}

/// Operator attributes by name.
pub type Attributes = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    ShapeOverflow {
        shape: Shape,
    },
    ElementCountMismatch {
        shape: Shape,
        expected_count: u64,
        actual_count: usize,
    },
    LiteralOutOfDomain {
        dtype: DType,
        index: usize,
    },
    UnsupportedElementType {
        code: i64,
    },
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeOverflow { shape } => {
                write!(f, "shape element count overflowed: {:?}", shape.dims)
            }
            Self::ElementCountMismatch {
                shape,
                expected_count,
                actual_count,
            } => {
                write!(
                    f,
                    "tensor element count mismatch for shape {:?}: expected {}, got {}",
                    shape.dims, expected_count, actual_count
                )
            }
            Self::LiteralOutOfDomain { dtype, index } => {
                write!(f, "element {index} is not a valid {dtype} value")
            }
            Self::UnsupportedElementType { code } => {
                write!(f, "unsupported tensor element type code {code}")
            }
        }
    }
}

impl std::error::Error for ValueError {}
