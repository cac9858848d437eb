//! Dual-mode verification of one operator invocation.
//!
//! In live mode the operator under test runs next to the reference oracle and
//! the oracle's outputs become the new golden truth. In replay mode the
//! golden artifact stands in for the oracle.

use ox_core::{Attributes, Value};
use ox_ops::Operator;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::compare::{ComparisonStats, compare_values};
use crate::golden::GoldenStore;
use crate::oracle::ReferenceOracle;
use crate::replay::{capture_dtypes, cast_as};
use crate::{CheckError, HarnessConfig};

/// Environment variable forcing replay (non-zero integer) or live (zero).
pub const REPLAY_ENV_VAR: &str = "OX_REPLAY_GOLDEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    Live,
    Replay,
}

impl VerificationMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Replay => "replay",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeError {
    UnknownArchitecture { arch: String },
}

impl std::fmt::Display for ModeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownArchitecture { arch } => write!(
                f,
                "cannot choose a verification mode for architecture '{arch}'; set {REPLAY_ENV_VAR}"
            ),
        }
    }
}

impl std::error::Error for ModeError {}

/// Source of the live/replay decision.
pub trait ModeProbe {
    fn probe(&self) -> Result<VerificationMode, ModeError>;
}

/// Always yields the wrapped mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMode(pub VerificationMode);

impl ModeProbe for FixedMode {
    fn probe(&self) -> Result<VerificationMode, ModeError> {
        Ok(self.0)
    }
}

/// Override value first, then the target architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvArchProbe {
    pub override_value: Option<String>,
    pub arch: String,
}

impl EnvArchProbe {
    #[must_use]
    pub fn new(override_value: Option<String>, arch: impl Into<String>) -> Self {
        Self {
            override_value,
            arch: arch.into(),
        }
    }

    /// Reads `OX_REPLAY_GOLDEN` and the compile-target architecture.
    #[must_use]
    pub fn from_environment() -> Self {
        Self::new(std::env::var(REPLAY_ENV_VAR).ok(), std::env::consts::ARCH)
    }
}

impl ModeProbe for EnvArchProbe {
    fn probe(&self) -> Result<VerificationMode, ModeError> {
        // An unparsable override is ignored, not an error.
        if let Some(flag) = self
            .override_value
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
        {
            return Ok(if flag != 0 {
                VerificationMode::Replay
            } else {
                VerificationMode::Live
            });
        }
        match self.arch.as_str() {
            "x86_64" | "aarch64" => Ok(VerificationMode::Live),
            "arm" => Ok(VerificationMode::Replay),
            other => Err(ModeError::UnknownArchitecture {
                arch: other.to_owned(),
            }),
        }
    }
}

/// One operator invocation, keyed by `name` in the golden store.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub opset_version: u32,
    pub attrs: Attributes,
    pub inputs: Vec<Value>,
}

impl TestCase {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        opset_version: u32,
        attrs: Attributes,
        inputs: Vec<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            opset_version,
            attrs,
            inputs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub case_name: String,
    pub mode: VerificationMode,
    pub golden_path: PathBuf,
    pub input_count: usize,
    pub output_count: usize,
    pub stats: ComparisonStats,
}

#[derive(Debug)]
pub struct Harness {
    mode: VerificationMode,
    oracle: Option<ReferenceOracle>,
    store: GoldenStore,
    max_error: f64,
}

impl Harness {
    /// Live mode needs an oracle; replay mode never consults one.
    pub fn new(
        config: &HarnessConfig,
        mode: VerificationMode,
        oracle: Option<ReferenceOracle>,
    ) -> Result<Self, CheckError> {
        if mode == VerificationMode::Live && oracle.is_none() {
            return Err(CheckError::OracleUnavailable);
        }
        Ok(Self {
            mode,
            oracle,
            store: GoldenStore::new(config.golden_root.clone()),
            max_error: config.max_error,
        })
    }

    pub fn from_probe(
        config: &HarnessConfig,
        probe: &dyn ModeProbe,
        oracle: Option<ReferenceOracle>,
    ) -> Result<Self, CheckError> {
        let mode = probe.probe()?;
        tracing::info!(mode = mode.as_str(), "verification mode selected");
        Self::new(config, mode, oracle)
    }

    /// Environment-configured harness backed by the in-tree interpreter.
    pub fn from_environment() -> Result<Self, CheckError> {
        Self::from_probe(
            &HarnessConfig::from_environment(),
            &EnvArchProbe::from_environment(),
            Some(ReferenceOracle::interpreter()),
        )
    }

    #[must_use]
    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    #[must_use]
    pub fn store(&self) -> &GoldenStore {
        &self.store
    }

    /// Verifies `Op` on `case` and returns what was compared.
    pub fn check<Op: Operator>(&self, case: &TestCase) -> Result<CheckReport, CheckError> {
        let golden_path = self.store.path_for(&case.name);
        let op = Op::new(case.opset_version, &case.attrs)?;

        let (output_count, stats) = match (self.mode, &self.oracle) {
            (VerificationMode::Live, Some(oracle)) => {
                let actual = op.run(&case.inputs)?;
                let expected = oracle.evaluate(
                    Op::OP_TYPE,
                    &case.attrs,
                    &case.inputs,
                    &actual,
                    case.opset_version,
                )?;
                let stats = compare_values(&expected, &actual, self.max_error)?;
                self.store.save(&case.name, &case.inputs, &expected)?;
                (expected.len(), stats)
            }
            (VerificationMode::Live, None) => return Err(CheckError::OracleUnavailable),
            (VerificationMode::Replay, _) => {
                let manifest = capture_dtypes(&case.inputs);
                let golden = self.store.load(&case.name)?;
                let inputs = cast_as(golden.inputs, &manifest)?;
                let actual = op.run(&inputs)?;
                let stats = compare_values(&golden.outputs, &actual, self.max_error)?;
                (golden.outputs.len(), stats)
            }
        };

        tracing::info!(
            case = %case.name,
            op_type = Op::OP_TYPE,
            mode = self.mode.as_str(),
            outputs = output_count,
            max_abs_error = stats.max_abs_error,
            "operator matched expected outputs"
        );
        Ok(CheckReport {
            case_name: case.name.clone(),
            mode: self.mode,
            golden_path,
            input_count: case.inputs.len(),
            output_count,
            stats,
        })
    }
}
