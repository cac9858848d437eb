//! Reference oracle: wraps a single operator invocation in a one-node model,
//! validates it and runs it on a trusted [`ReferenceEngine`].

use ox_core::{Attributes, Value};
use ox_reference::{
    CheckerError, EngineError, GraphDef, Interpreter, ModelDef, NodeDef, OpsetImport,
    ReferenceEngine, ValueInfo,
};
use std::collections::BTreeMap;

pub const ORACLE_GRAPH_NAME: &str = "test_graph";

#[derive(Debug)]
pub enum OracleError {
    /// A sequence slot with no elements has no element type to declare.
    EmptySequence { name: String },
    Validation(CheckerError),
    Staging(EngineError),
    Execution(EngineError),
    OutputCount { expected: usize, actual: usize },
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySequence { name } => write!(
                f,
                "cannot declare a type for '{name}': empty sequences carry no element type"
            ),
            Self::Validation(err) => write!(f, "reference model failed validation: {err}"),
            Self::Staging(err) => write!(f, "failed to stage reference model: {err}"),
            Self::Execution(err) => write!(f, "reference execution failed: {err}"),
            Self::OutputCount { expected, actual } => write!(
                f,
                "reference produced {actual} outputs, model declares {expected}"
            ),
        }
    }
}

impl std::error::Error for OracleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Staging(err) | Self::Execution(err) => Some(err),
            _ => None,
        }
    }
}

/// A one-node model together with the names bound to its inputs and outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleOpModel {
    pub model: ModelDef,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
}

/// Builds the model `op_type(input0, input1, ...) -> (output0, ...)`.
///
/// Inputs are declared with the dtype and shape of the values fed to them and
/// outputs with those of `output_hints`. A sequence slot is declared as a
/// sequence of its first element's type.
pub fn build_model(
    op_type: &str,
    attrs: &Attributes,
    inputs: &[Value],
    output_hints: &[Value],
    opset_version: u32,
) -> Result<SingleOpModel, OracleError> {
    let input_names = (0..inputs.len()).map(|i| format!("input{i}")).collect::<Vec<_>>();
    let output_names = (0..output_hints.len())
        .map(|i| format!("output{i}"))
        .collect::<Vec<_>>();

    let input_infos = declare(&input_names, inputs)?;
    let output_infos = declare(&output_names, output_hints)?;
    let node = NodeDef::new(
        op_type,
        input_names.iter().cloned(),
        output_names.iter().cloned(),
        attrs.clone(),
    );
    let graph = GraphDef {
        name: ORACLE_GRAPH_NAME.to_owned(),
        nodes: vec![node],
        inputs: input_infos,
        outputs: output_infos,
    };
    Ok(SingleOpModel {
        model: ModelDef::new(graph, vec![OpsetImport::default_domain(opset_version)]),
        input_names,
        output_names,
    })
}

fn declare(names: &[String], values: &[Value]) -> Result<Vec<ValueInfo>, OracleError> {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| {
            let exemplar = value
                .type_exemplar()
                .ok_or_else(|| OracleError::EmptySequence { name: name.clone() })?;
            Ok(match value {
                Value::Tensor(_) => ValueInfo::tensor(name, exemplar.dtype, &exemplar.shape.dims),
                Value::Sequence(_) => {
                    ValueInfo::tensor_sequence(name, exemplar.dtype, &exemplar.shape.dims)
                }
            })
        })
        .collect()
}

/// Capability object for obtaining expected outputs.
pub struct ReferenceOracle {
    engine: Box<dyn ReferenceEngine>,
}

impl std::fmt::Debug for ReferenceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceOracle")
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl ReferenceOracle {
    #[must_use]
    pub fn new(engine: impl ReferenceEngine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    /// Oracle backed by the in-tree reference interpreter.
    #[must_use]
    pub fn interpreter() -> Self {
        Self::new(Interpreter::new())
    }

    /// Runs `op_type` on `inputs` through the reference engine.
    ///
    /// The model is checked in memory, written to a temporary file that is
    /// removed when this call returns, and executed from that file.
    pub fn evaluate(
        &self,
        op_type: &str,
        attrs: &Attributes,
        inputs: &[Value],
        output_hints: &[Value],
        opset_version: u32,
    ) -> Result<Vec<Value>, OracleError> {
        let SingleOpModel {
            model,
            input_names,
            output_names,
        } = build_model(op_type, attrs, inputs, output_hints, opset_version)?;
        self.engine
            .check_model(&model)
            .map_err(OracleError::Validation)?;

        let staged = tempfile::Builder::new()
            .prefix("ox-oracle-")
            .suffix(".json")
            .tempfile()
            .map_err(|err| OracleError::Staging(EngineError::Io(err)))?;
        model
            .write_to(staged.path())
            .map_err(OracleError::Staging)?;
        tracing::debug!(path = %staged.path().display(), op_type, "staged reference model");

        let feeds = input_names
            .into_iter()
            .zip(inputs.iter().cloned())
            .collect::<BTreeMap<_, _>>();
        let outputs = self
            .engine
            .execute(staged.path(), &feeds, &output_names)
            .map_err(OracleError::Execution)?;
        if outputs.len() != output_names.len() {
            return Err(OracleError::OutputCount {
                expected: output_names.len(),
                actual: outputs.len(),
            });
        }
        tracing::info!(
            engine = self.engine.name(),
            op_type,
            opset_version,
            outputs = outputs.len(),
            "reference evaluation complete"
        );
        Ok(outputs)
    }
}
