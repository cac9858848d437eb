#![forbid(unsafe_code)]

pub mod checker;
pub mod interpreter;
pub mod model;

pub use checker::{CheckerError, MAX_OPSET, MIN_OPSET, OpSchema, check_model, find_schema};
pub use interpreter::Interpreter;
pub use model::{GraphDef, ModelDef, NodeDef, OpsetImport, TypeDef, ValueInfo};

use ox_core::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Trusted engine that evaluates single-operator models.
///
/// Models are validated in memory with `check_model` and executed from a
/// staged file, so engines that only accept serialized models fit behind the
/// same surface.
pub trait ReferenceEngine {
    fn name(&self) -> &str;

    fn check_model(&self, model: &ModelDef) -> Result<(), CheckerError>;

    /// Executes the model stored at `model_path`, returning the values named
    /// by `output_names` in that order.
    fn execute(
        &self,
        model_path: &Path,
        feeds: &BTreeMap<String, Value>,
        output_names: &[String],
    ) -> Result<Vec<Value>, EngineError>;
}

#[derive(Debug)]
pub enum EngineError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Checker(CheckerError),
    MissingFeed { name: String },
    FeedTypeMismatch { name: String, detail: String },
    UnknownValue { name: String },
    OutputTypeMismatch { name: String, detail: String },
    Kernel { op_type: String, detail: String },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Json(err) => write!(f, "model decode error: {err}"),
            Self::Checker(err) => write!(f, "model check failed: {err}"),
            Self::MissingFeed { name } => write!(f, "no value fed for graph input '{name}'"),
            Self::FeedTypeMismatch { name, detail } => {
                write!(f, "feed '{name}' does not match its declaration: {detail}")
            }
            Self::UnknownValue { name } => write!(f, "value '{name}' was never produced"),
            Self::OutputTypeMismatch { name, detail } => {
                write!(f, "output '{name}' does not match its declaration: {detail}")
            }
            Self::Kernel { op_type, detail } => write!(f, "{op_type} failed: {detail}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<CheckerError> for EngineError {
    fn from(value: CheckerError) -> Self {
        Self::Checker(value)
    }
}
