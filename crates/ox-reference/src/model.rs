//! Serializable graph definitions.
//!
//! A `ModelDef` is what the harness hands to a reference engine: one graph,
//! its typed formal inputs and outputs, and the opset imports it is evaluated
//! against. Models round-trip through JSON so they can be staged on disk.

use ox_core::{Attributes, DType};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::EngineError;

pub const IR_VERSION: i64 = 8;
pub const DEFAULT_DOMAIN: &str = "";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpsetImport {
    pub domain: String,
    pub version: u32,
}

impl OpsetImport {
    #[must_use]
    pub fn default_domain(version: u32) -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_owned(),
            version,
        }
    }
}

/// Formal type of a graph input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDef {
    Tensor { elem_type: i64, shape: Vec<u32> },
    Sequence { elem: Box<TypeDef> },
}

impl TypeDef {
    #[must_use]
    pub fn tensor(dtype: DType, shape: &[u32]) -> Self {
        Self::Tensor {
            elem_type: dtype.onnx_code(),
            shape: shape.to_vec(),
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Tensor { elem_type, shape } => match DType::from_onnx_code(*elem_type) {
                Ok(dtype) => format!("tensor({dtype}){shape:?}"),
                Err(_) => format!("tensor(<{elem_type}>){shape:?}"),
            },
            Self::Sequence { elem } => format!("seq({})", elem.describe()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub name: String,
    pub value_type: TypeDef,
}

impl ValueInfo {
    #[must_use]
    pub fn tensor(name: impl Into<String>, dtype: DType, shape: &[u32]) -> Self {
        Self {
            name: name.into(),
            value_type: TypeDef::tensor(dtype, shape),
        }
    }

    #[must_use]
    pub fn tensor_sequence(name: impl Into<String>, dtype: DType, shape: &[u32]) -> Self {
        Self {
            name: name.into(),
            value_type: TypeDef::Sequence {
                elem: Box::new(TypeDef::tensor(dtype, shape)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub op_type: String,
    #[serde(default)]
    pub domain: String,
    pub inputs: SmallVec<[String; 4]>,
    pub outputs: SmallVec<[String; 2]>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl NodeDef {
    #[must_use]
    pub fn new(
        op_type: impl Into<String>,
        inputs: impl IntoIterator<Item = String>,
        outputs: impl IntoIterator<Item = String>,
        attributes: Attributes,
    ) -> Self {
        Self {
            op_type: op_type.into(),
            domain: DEFAULT_DOMAIN.to_owned(),
            inputs: inputs.into_iter().collect(),
            outputs: outputs.into_iter().collect(),
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
    pub name: String,
    pub nodes: Vec<NodeDef>,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub ir_version: i64,
    pub opset_imports: Vec<OpsetImport>,
    pub graph: GraphDef,
}

impl ModelDef {
    #[must_use]
    pub fn new(graph: GraphDef, opset_imports: Vec<OpsetImport>) -> Self {
        Self {
            ir_version: IR_VERSION,
            opset_imports,
            graph,
        }
    }

    /// Version imported for the default operator domain, if any.
    #[must_use]
    pub fn default_opset(&self) -> Option<u32> {
        self.opset_imports
            .iter()
            .find(|import| import.domain == DEFAULT_DOMAIN)
            .map(|import| import.version)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), EngineError> {
        let mut writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, EngineError> {
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::{GraphDef, ModelDef, NodeDef, OpsetImport, TypeDef, ValueInfo};
    use ox_core::{AttrValue, Attributes, DType};

    fn cast_model() -> ModelDef {
        let attrs = Attributes::from([("to".to_owned(), AttrValue::Int(11))]);
        let node = NodeDef::new(
            "Cast",
            ["input0".to_owned()],
            ["output0".to_owned()],
            attrs,
        );
        let graph = GraphDef {
            name: "test_graph".to_owned(),
            nodes: vec![node],
            inputs: vec![ValueInfo::tensor("input0", DType::F32, &[3, 5])],
            outputs: vec![ValueInfo::tensor("output0", DType::F64, &[3, 5])],
        };
        ModelDef::new(graph, vec![OpsetImport::default_domain(13)])
    }

    #[test]
    fn model_round_trips_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        let model = cast_model();
        model.write_to(&path).expect("write should succeed");
        let loaded = ModelDef::read_from(&path).expect("read should succeed");
        assert_eq!(loaded, model);
        assert_eq!(loaded.default_opset(), Some(13));
    }

    #[test]
    fn written_model_is_complete_json_on_return() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        let model = cast_model();
        model.write_to(&path).expect("write should succeed");
        let bytes = std::fs::read(&path).expect("read bytes");
        let parsed: ModelDef = serde_json::from_slice(&bytes).expect("complete json");
        assert_eq!(parsed, model);
    }

    #[test]
    fn sequence_type_describes_element() {
        let info = ValueInfo::tensor_sequence("input0", DType::F32, &[2]);
        assert_eq!(info.value_type.describe(), "seq(tensor(float32)[2])");
        assert!(matches!(info.value_type, TypeDef::Sequence { .. }));
    }
}
