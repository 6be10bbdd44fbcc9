//! Error types for threshold computation, rules, and configuration

use thiserror::Error;

/// Reasons a threshold could not be derived along the preferred path
///
/// None of these escape the threshold engine: each one selects a
/// percentile fallback or, for an empty sample, a zero threshold.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("no samples to derive a threshold from")]
    InsufficientData,

    #[error("only {found} exceedances above the baseline, need at least {required}")]
    InsufficientTailData { found: usize, required: usize },

    #[error("sample has zero variance")]
    DegenerateInput,

    #[error("tail fit did not converge after {iterations} iterations")]
    FitDidNotConverge { iterations: usize },
}

impl ThresholdError {
    /// Short label used in logs and metric labels
    pub fn label(&self) -> &'static str {
        match self {
            ThresholdError::InsufficientData => "insufficient_data",
            ThresholdError::InsufficientTailData { .. } => "insufficient_tail_data",
            ThresholdError::DegenerateInput => "degenerate_input",
            ThresholdError::FitDidNotConverge { .. } => "fit_did_not_converge",
        }
    }
}

/// Rule construction and combination errors, reported to the caller
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("a combined rule needs at least 2 rules, {selected} selected")]
    MalformedRuleCombination { selected: usize },

    #[error("unknown rule id {0}")]
    UnknownRule(u32),
}

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field}: quantile {value} must lie strictly between 0 and 1")]
    QuantileOutOfRange { field: String, value: f64 },

    #[error("{field}: must be greater than zero")]
    ZeroLength { field: String },

    #[error("{field}: must be at least {min}")]
    TooSmall { field: String, min: usize },

    #[error("duplicate rule id {0}")]
    DuplicateRuleId(u32),
}
