//! Error rate detection
//!
//! Flags bins whose error rate exceeds a per-stream threshold.

use serde::{Deserialize, Serialize};

use super::StreamDetector;
use crate::condition::BinMetric;
use crate::error::ThresholdError;
use crate::models::{AggregatedBin, AnomalyKind, AnomalyRecord};
use crate::stats::quantile;
use crate::threshold::{HybridThresholdEngine, Precision, Strategy};

/// Default sliding window for the hybrid threshold (2 hours)
const DEFAULT_WINDOW_MINUTES: u32 = 120;

const DEFAULT_QUANTILE: f64 = 0.99;

fn default_window_minutes() -> u32 {
    DEFAULT_WINDOW_MINUTES
}

fn default_quantile() -> f64 {
    DEFAULT_QUANTILE
}

/// How the error rate threshold is derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ErrorRateMode {
    /// Hybrid engine over sliding-window mean error rates, two decimals
    Hybrid {
        #[serde(default = "default_window_minutes")]
        window_minutes: u32,
        #[serde(default = "default_quantile")]
        quantile: f64,
    },
    /// Quantile of the stream's per-bin error rates
    Percentile {
        #[serde(default = "default_quantile")]
        quantile: f64,
    },
    /// Constant threshold
    Fixed { threshold: f64 },
}

impl Default for ErrorRateMode {
    fn default() -> Self {
        ErrorRateMode::Hybrid {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            quantile: DEFAULT_QUANTILE,
        }
    }
}

/// Detects elevated error rates per stream
pub struct ErrorRateDetector {
    mode: ErrorRateMode,
    engine: HybridThresholdEngine,
}

impl ErrorRateDetector {
    pub fn new(mode: ErrorRateMode, engine: HybridThresholdEngine) -> Self {
        Self { mode, engine }
    }

    fn threshold(&self, bins: &[AggregatedBin]) -> Result<f64, ThresholdError> {
        match self.mode {
            ErrorRateMode::Hybrid {
                window_minutes,
                quantile,
            } => {
                let threshold = self.engine.compute(
                    bins,
                    window_minutes,
                    &BinMetric::ErrorRate,
                    quantile,
                    Strategy::Hybrid,
                    Precision::Hundredths,
                );
                if threshold.is_empty() {
                    return Err(ThresholdError::InsufficientData);
                }
                Ok(threshold.value)
            }
            ErrorRateMode::Percentile { quantile: q } => {
                let rates: Vec<f64> = bins.iter().map(|b| b.error_rate).collect();
                quantile(&rates, q).ok_or(ThresholdError::InsufficientData)
            }
            ErrorRateMode::Fixed { threshold } => Ok(threshold),
        }
    }
}

impl StreamDetector for ErrorRateDetector {
    fn name(&self) -> &'static str {
        "error_rate"
    }

    fn detect_stream(&self, bins: &[AggregatedBin]) -> Result<Vec<AnomalyRecord>, ThresholdError> {
        let threshold = self.threshold(bins)?;

        Ok(bins
            .iter()
            .filter(|b| b.error_rate > threshold)
            .map(|b| AnomalyRecord {
                stream: b.stream.clone(),
                timestamp: b.time_bin,
                kind: AnomalyKind::ErrorRate,
                observed: b.error_rate,
                threshold,
                p_value: None,
            })
            .collect())
    }
}
