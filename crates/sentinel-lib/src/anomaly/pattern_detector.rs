//! Response time trend detection
//!
//! Fits a least-squares line through a stream's average response time and
//! flags the stream when the slope per bin interval is both large and
//! statistically significant.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::StreamDetector;
use crate::error::ThresholdError;
use crate::models::{AggregatedBin, AnomalyKind, AnomalyRecord};
use crate::stats::{linear_regression, quantile};

/// Minimum bins required for trend detection
const MIN_INTERVALS: usize = 6;

/// p-value below which a slope is considered significant
const SIGNIFICANCE: f64 = 0.05;

/// Default fixed slope threshold (ms per interval)
const DEFAULT_SLOPE_THRESHOLD: f64 = 10.0;

const DEFAULT_SLOPE_QUANTILE: f64 = 0.99;

fn default_slope_threshold() -> f64 {
    DEFAULT_SLOPE_THRESHOLD
}

fn default_slope_quantile() -> f64 {
    DEFAULT_SLOPE_QUANTILE
}

/// How the slope threshold is derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SlopeThreshold {
    /// Constant slope per interval
    Fixed {
        #[serde(default = "default_slope_threshold")]
        slope_per_interval: f64,
    },
    /// Quantile of the slopes of every `min_intervals`-bin sub-window
    Dynamic {
        #[serde(default = "default_slope_quantile")]
        quantile: f64,
    },
}

impl Default for SlopeThreshold {
    fn default() -> Self {
        SlopeThreshold::Fixed {
            slope_per_interval: DEFAULT_SLOPE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub min_intervals: usize,
    pub significance: f64,
    pub threshold: SlopeThreshold,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_intervals: MIN_INTERVALS,
            significance: SIGNIFICANCE,
            threshold: SlopeThreshold::default(),
        }
    }
}

/// Detects sustained upward trends in response time
pub struct PatternChangeDetector {
    config: PatternConfig,
    interval_secs: f64,
}

impl PatternChangeDetector {
    /// `interval` is the bin width the slope is expressed against
    pub fn new(config: PatternConfig, interval: Duration) -> Self {
        Self {
            config,
            interval_secs: interval.num_seconds() as f64,
        }
    }

    /// Slope of `points`, scaled to one bin interval
    fn slope_per_interval(&self, points: &[(f64, f64)]) -> Option<(f64, f64)> {
        let (x, y): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
        let fit = linear_regression(&x, &y)?;
        Some((fit.slope * self.interval_secs, fit.p_value))
    }

    fn threshold(&self, points: &[(f64, f64)]) -> Result<f64, ThresholdError> {
        match self.config.threshold {
            SlopeThreshold::Fixed { slope_per_interval } => Ok(slope_per_interval),
            SlopeThreshold::Dynamic { quantile: q } => {
                let slopes: Vec<f64> = points
                    .windows(self.config.min_intervals)
                    .filter_map(|w| self.slope_per_interval(w))
                    .map(|(slope, _)| slope)
                    .collect();
                quantile(&slopes, q).ok_or(ThresholdError::InsufficientData)
            }
        }
    }
}

impl StreamDetector for PatternChangeDetector {
    fn name(&self) -> &'static str {
        "pattern_change"
    }

    fn detect_stream(&self, bins: &[AggregatedBin]) -> Result<Vec<AnomalyRecord>, ThresholdError> {
        let points: Vec<(f64, f64)> = bins
            .iter()
            .filter(|b| !b.avg_response_time.is_nan())
            .map(|b| (b.time_bin.timestamp() as f64, b.avg_response_time))
            .collect();

        if points.len() < self.config.min_intervals {
            return Ok(Vec::new());
        }

        let Some((slope, p_value)) = self.slope_per_interval(&points) else {
            return Ok(Vec::new());
        };
        let threshold = self.threshold(&points)?;

        if slope <= threshold || p_value >= self.config.significance {
            return Ok(Vec::new());
        }

        // Only the most recent bin is reported
        let Some(last) = bins.iter().rev().find(|b| !b.avg_response_time.is_nan()) else {
            return Ok(Vec::new());
        };

        Ok(vec![AnomalyRecord {
            stream: last.stream.clone(),
            timestamp: last.time_bin,
            kind: AnomalyKind::PatternChange,
            observed: slope,
            threshold,
            p_value: Some(p_value),
        }])
    }
}
