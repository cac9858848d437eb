//! Structural validation of single-graph models.

use ox_core::DType;
use std::collections::BTreeSet;

use crate::model::{DEFAULT_DOMAIN, ModelDef, TypeDef};

/// Oldest and newest default-domain opset the interpreter evaluates.
pub const MIN_OPSET: u32 = 1;
pub const MAX_OPSET: u32 = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSchema {
    pub op_type: &'static str,
    pub since_version: u32,
    pub min_inputs: usize,
    pub max_inputs: usize,
    pub outputs: usize,
}

pub const SCHEMAS: &[OpSchema] = &[
    OpSchema {
        op_type: "Cast",
        since_version: 6,
        min_inputs: 1,
        max_inputs: 1,
        outputs: 1,
    },
    OpSchema {
        op_type: "Equal",
        since_version: 7,
        min_inputs: 2,
        max_inputs: 2,
        outputs: 1,
    },
    OpSchema {
        op_type: "Greater",
        since_version: 7,
        min_inputs: 2,
        max_inputs: 2,
        outputs: 1,
    },
    OpSchema {
        op_type: "GreaterOrEqual",
        since_version: 12,
        min_inputs: 2,
        max_inputs: 2,
        outputs: 1,
    },
    OpSchema {
        op_type: "Less",
        since_version: 7,
        min_inputs: 2,
        max_inputs: 2,
        outputs: 1,
    },
    OpSchema {
        op_type: "LessOrEqual",
        since_version: 12,
        min_inputs: 2,
        max_inputs: 2,
        outputs: 1,
    },
    OpSchema {
        op_type: "SequenceAt",
        since_version: 11,
        min_inputs: 2,
        max_inputs: 2,
        outputs: 1,
    },
    OpSchema {
        op_type: "SequenceConstruct",
        since_version: 11,
        min_inputs: 1,
        max_inputs: usize::MAX,
        outputs: 1,
    },
];

/// Schema of `op_type` in effect at `opset_version`.
#[must_use]
pub fn find_schema(op_type: &str, opset_version: u32) -> Option<&'static OpSchema> {
    SCHEMAS
        .iter()
        .find(|schema| schema.op_type == op_type && schema.since_version <= opset_version)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerError {
    MissingDefaultOpset,
    DuplicateOpsetImport {
        domain: String,
    },
    UnsupportedOpset {
        version: u32,
    },
    EmptyName {
        section: &'static str,
    },
    DuplicateName {
        section: &'static str,
        name: String,
    },
    InvalidElementType {
        name: String,
        code: i64,
    },
    UnknownOperator {
        op_type: String,
        domain: String,
        opset_version: u32,
    },
    ArityMismatch {
        node_index: usize,
        op_type: String,
        direction: &'static str,
        expected: String,
        actual: usize,
    },
    UnboundInput {
        node_index: usize,
        name: String,
    },
    OutputShadowsBinding {
        node_index: usize,
        name: String,
    },
    UndefinedGraphOutput {
        name: String,
    },
    EmptyAttributeName {
        node_index: usize,
    },
}

impl std::fmt::Display for CheckerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDefaultOpset => write!(f, "model does not import the default domain"),
            Self::DuplicateOpsetImport { domain } => {
                write!(f, "domain '{domain}' is imported more than once")
            }
            Self::UnsupportedOpset { version } => write!(
                f,
                "opset version {version} is outside the supported range {MIN_OPSET}..={MAX_OPSET}"
            ),
            Self::EmptyName { section } => write!(f, "empty value name in {section}"),
            Self::DuplicateName { section, name } => {
                write!(f, "duplicate name '{name}' in {section}")
            }
            Self::InvalidElementType { name, code } => {
                write!(f, "value '{name}' declares invalid element type {code}")
            }
            Self::UnknownOperator {
                op_type,
                domain,
                opset_version,
            } => write!(
                f,
                "no operator registered for {op_type} with domain '{domain}' at opset {opset_version}"
            ),
            Self::ArityMismatch {
                node_index,
                op_type,
                direction,
                expected,
                actual,
            } => write!(
                f,
                "node {node_index} ({op_type}) has {actual} {direction}, expected {expected}"
            ),
            Self::UnboundInput { node_index, name } => {
                write!(f, "node {node_index} consumes unbound value '{name}'")
            }
            Self::OutputShadowsBinding { node_index, name } => {
                write!(f, "node {node_index} output '{name}' shadows an existing binding")
            }
            Self::UndefinedGraphOutput { name } => {
                write!(f, "graph output '{name}' is not produced by any node or input")
            }
            Self::EmptyAttributeName { node_index } => {
                write!(f, "node {node_index} has an attribute with an empty name")
            }
        }
    }
}

impl std::error::Error for CheckerError {}

fn check_type(name: &str, value_type: &TypeDef) -> Result<(), CheckerError> {
    match value_type {
        TypeDef::Tensor { elem_type, .. } => DType::from_onnx_code(*elem_type)
            .map(|_| ())
            .map_err(|_| CheckerError::InvalidElementType {
                name: name.to_owned(),
                code: *elem_type,
            }),
        TypeDef::Sequence { elem } => check_type(name, elem),
    }
}

fn arity_bound(min: usize, max: usize) -> String {
    if min == max {
        min.to_string()
    } else if max == usize::MAX {
        format!("at least {min}")
    } else {
        format!("{min}..={max}")
    }
}

/// Validates imports, naming, typing, operator registration and dataflow of
/// `model`.
pub fn check_model(model: &ModelDef) -> Result<(), CheckerError> {
    let mut domains = BTreeSet::new();
    for import in &model.opset_imports {
        if !domains.insert(import.domain.as_str()) {
            return Err(CheckerError::DuplicateOpsetImport {
                domain: import.domain.clone(),
            });
        }
    }
    let opset_version = model
        .default_opset()
        .ok_or(CheckerError::MissingDefaultOpset)?;
    if !(MIN_OPSET..=MAX_OPSET).contains(&opset_version) {
        return Err(CheckerError::UnsupportedOpset {
            version: opset_version,
        });
    }

    let graph = &model.graph;
    let mut bindings = BTreeSet::new();
    for info in &graph.inputs {
        if info.name.is_empty() {
            return Err(CheckerError::EmptyName {
                section: "graph inputs",
            });
        }
        if !bindings.insert(info.name.as_str()) {
            return Err(CheckerError::DuplicateName {
                section: "graph inputs",
                name: info.name.clone(),
            });
        }
        check_type(&info.name, &info.value_type)?;
    }

    for (node_index, node) in graph.nodes.iter().enumerate() {
        if node.domain != DEFAULT_DOMAIN {
            return Err(CheckerError::UnknownOperator {
                op_type: node.op_type.clone(),
                domain: node.domain.clone(),
                opset_version,
            });
        }
        let schema =
            find_schema(&node.op_type, opset_version).ok_or_else(|| CheckerError::UnknownOperator {
                op_type: node.op_type.clone(),
                domain: node.domain.clone(),
                opset_version,
            })?;

        if node.inputs.len() < schema.min_inputs || node.inputs.len() > schema.max_inputs {
            return Err(CheckerError::ArityMismatch {
                node_index,
                op_type: node.op_type.clone(),
                direction: "inputs",
                expected: arity_bound(schema.min_inputs, schema.max_inputs),
                actual: node.inputs.len(),
            });
        }
        if node.outputs.len() != schema.outputs {
            return Err(CheckerError::ArityMismatch {
                node_index,
                op_type: node.op_type.clone(),
                direction: "outputs",
                expected: schema.outputs.to_string(),
                actual: node.outputs.len(),
            });
        }
        if node.attributes.keys().any(String::is_empty) {
            return Err(CheckerError::EmptyAttributeName { node_index });
        }

        for name in &node.inputs {
            if !bindings.contains(name.as_str()) {
                return Err(CheckerError::UnboundInput {
                    node_index,
                    name: name.clone(),
                });
            }
        }
        for name in &node.outputs {
            if name.is_empty() {
                return Err(CheckerError::EmptyName {
                    section: "node outputs",
                });
            }
            if !bindings.insert(name.as_str()) {
                return Err(CheckerError::OutputShadowsBinding {
                    node_index,
                    name: name.clone(),
                });
            }
        }
    }

    let mut seen_outputs = BTreeSet::new();
    for info in &graph.outputs {
        if !seen_outputs.insert(info.name.as_str()) {
            return Err(CheckerError::DuplicateName {
                section: "graph outputs",
                name: info.name.clone(),
            });
        }
        if !bindings.contains(info.name.as_str()) {
            return Err(CheckerError::UndefinedGraphOutput {
                name: info.name.clone(),
            });
        }
        check_type(&info.name, &info.value_type)?;
    }

    Ok(())
}
