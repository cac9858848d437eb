#![forbid(unsafe_code)]

pub mod compare;
pub mod golden;
pub mod oracle;
pub mod replay;
pub mod verify;

pub use compare::{
    ComparisonError, ComparisonStats, DEFAULT_MAX_ERROR, TensorLocation, assert_equal,
    compare_values,
};
pub use golden::{GoldenData, GoldenError, GoldenManifest, GoldenStore};
pub use oracle::{OracleError, ReferenceOracle, SingleOpModel, build_model};
pub use replay::{ReplayCastError, SlotDType, capture_dtypes, cast_as};
pub use verify::{
    CheckReport, EnvArchProbe, FixedMode, Harness, ModeError, ModeProbe, REPLAY_ENV_VAR,
    TestCase, VerificationMode,
};

use ox_ops::OpError;
use std::path::PathBuf;

/// Environment variable overriding the golden artifact directory.
pub const GOLDEN_DIR_ENV_VAR: &str = "OX_GOLDEN_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub golden_root: PathBuf,
    pub max_error: f64,
}

impl HarnessConfig {
    /// Golden artifacts live in `crates/ox-conformance/golden/`. They are
    /// captured by running the suite on a live host (`x86_64`/`aarch64`, or
    /// `OX_REPLAY_GOLDEN=0`), which writes one `<case>.golden` per test case.
    /// Replay hosts need that directory populated first, either committed
    /// alongside the tests or pointed at with `OX_GOLDEN_DIR`; a missing
    /// artifact fails the case with `GoldenError::Io`.
    #[must_use]
    pub fn default_paths() -> Self {
        Self::with_golden_root(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("golden"))
    }

    #[must_use]
    pub fn with_golden_root(golden_root: impl Into<PathBuf>) -> Self {
        Self {
            golden_root: golden_root.into(),
            max_error: DEFAULT_MAX_ERROR,
        }
    }

    /// `default_paths`, with the golden root taken from `OX_GOLDEN_DIR` when
    /// set.
    #[must_use]
    pub fn from_environment() -> Self {
        match std::env::var_os(GOLDEN_DIR_ENV_VAR) {
            Some(root) if !root.is_empty() => Self::with_golden_root(root),
            _ => Self::default_paths(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

/// Every way a single conformance check can fail.
#[derive(Debug)]
pub enum CheckError {
    Mode(ModeError),
    OracleUnavailable,
    /// The operator under test rejected its attributes or inputs.
    Operator(OpError),
    Oracle(OracleError),
    Golden(GoldenError),
    ReplayCast(ReplayCastError),
    Mismatch(ComparisonError),
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mode(err) => write!(f, "mode selection failed: {err}"),
            Self::OracleUnavailable => {
                write!(f, "live verification requested without a reference oracle")
            }
            Self::Operator(err) => write!(f, "operator under test failed: {err}"),
            Self::Oracle(err) => write!(f, "{err}"),
            Self::Golden(err) => write!(f, "{err}"),
            Self::ReplayCast(err) => write!(f, "golden inputs do not fit this case: {err}"),
            Self::Mismatch(err) => write!(f, "outputs differ: {err}"),
        }
    }
}

impl std::error::Error for CheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Mode(err) => Some(err),
            Self::OracleUnavailable => None,
            Self::Operator(err) => Some(err),
            Self::Oracle(err) => Some(err),
            Self::Golden(err) => Some(err),
            Self::ReplayCast(err) => Some(err),
            Self::Mismatch(err) => Some(err),
        }
    }
}

impl From<ModeError> for CheckError {
    fn from(value: ModeError) -> Self {
        Self::Mode(value)
    }
}

impl From<OpError> for CheckError {
    fn from(value: OpError) -> Self {
        Self::Operator(value)
    }
}

impl From<OracleError> for CheckError {
    fn from(value: OracleError) -> Self {
        Self::Oracle(value)
    }
}

impl From<GoldenError> for CheckError {
    fn from(value: GoldenError) -> Self {
        Self::Golden(value)
    }
}

impl From<ReplayCastError> for CheckError {
    fn from(value: ReplayCastError) -> Self {
        Self::ReplayCast(value)
    }
}

impl From<ComparisonError> for CheckError {
    fn from(value: ComparisonError) -> Self {
        Self::Mismatch(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_MAX_ERROR, HarnessConfig};

    #[test]
    fn default_paths_live_under_the_crate() {
        let config = HarnessConfig::default_paths();
        assert!(config.golden_root.ends_with("golden"));
        assert!(config.golden_root.starts_with(env!("CARGO_MANIFEST_DIR")));
        assert_eq!(config.max_error, DEFAULT_MAX_ERROR);
        assert_eq!(HarnessConfig::default(), config);
    }
}
