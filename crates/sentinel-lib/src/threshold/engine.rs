//! Hybrid threshold derivation
//!
//! Sliding-window samples are split into a normal and an elevated regime,
//! and the tail of the normal regime is modelled with a GPD. Every failure
//! along that path selects a percentile fallback, so a threshold is always
//! produced; an empty sample yields a zero threshold tagged as such.

use serde::{Deserialize, Serialize};

use super::cluster::BaselineClusterSplitter;
use super::evt::{EvtTailModel, TailQuantileMode, DEFAULT_BASELINE_PERCENTILE, MIN_EXCEEDANCES};
use super::sampler::{SlidingWindowSampler, DEFAULT_STEP_MINUTES};
use crate::condition::WindowMetric;
use crate::error::ThresholdError;
use crate::models::Timestamped;
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::stats::{quantile, round_to};

/// Tuning for the hybrid threshold engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Step between sliding window starts in minutes
    pub step_minutes: u32,
    /// Percentile of the normal regime the tail is measured from
    pub baseline_percentile: f64,
    /// Minimum exceedances above the baseline for a tail fit
    pub min_exceedances: usize,
    pub tail_quantile: TailQuantileMode,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            step_minutes: DEFAULT_STEP_MINUTES,
            baseline_percentile: DEFAULT_BASELINE_PERCENTILE,
            min_exceedances: MIN_EXCEEDANCES,
            tail_quantile: TailQuantileMode::Direct,
        }
    }
}

/// How samples are turned into a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Regime split, then tail fit with percentile fallbacks
    Hybrid,
    /// Plain quantile of all samples
    Percentile,
}

/// Rounding applied to the final threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Round to the nearest integer (count metrics)
    Integer,
    /// Round to two decimals (averages and rates)
    Hundredths,
    /// Keep full precision
    Exact,
}

impl Precision {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Precision::Integer => value.round(),
            Precision::Hundredths => round_to(value, 2),
            Precision::Exact => value,
        }
    }
}

/// Which computation path produced a threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum ThresholdSource {
    /// No samples; the value is 0 and must not be used to flag anything
    Empty,
    /// Tail fit over the normal regime
    Evt {
        baseline: f64,
        shape: f64,
        scale: f64,
        exceedances: usize,
    },
    /// Quantile of the normal regime after the tail fit failed
    NormalPercentile { reason: String },
    /// Quantile of all samples when no normal regime was available
    SamplePercentile { reason: String },
    /// Quantile of all samples by request
    DirectPercentile,
}

impl ThresholdSource {
    pub fn label(&self) -> &'static str {
        match self {
            ThresholdSource::Empty => "empty",
            ThresholdSource::Evt { .. } => "evt",
            ThresholdSource::NormalPercentile { .. } => "normal_percentile",
            ThresholdSource::SamplePercentile { .. } => "sample_percentile",
            ThresholdSource::DirectPercentile => "direct_percentile",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            ThresholdSource::NormalPercentile { .. } | ThresholdSource::SamplePercentile { .. }
        )
    }
}

/// A derived threshold with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    pub value: f64,
    pub source: ThresholdSource,
    /// Number of window samples it was derived from
    pub samples: usize,
}

impl Threshold {
    pub fn empty() -> Self {
        Self {
            value: 0.0,
            source: ThresholdSource::Empty,
            samples: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.source, ThresholdSource::Empty)
    }
}

/// Derives alert thresholds from the history of a metric
#[derive(Clone)]
pub struct HybridThresholdEngine {
    config: ThresholdConfig,
    splitter: BaselineClusterSplitter,
    tail_model: EvtTailModel,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
}

impl HybridThresholdEngine {
    pub fn new(config: ThresholdConfig) -> Self {
        let tail_model = EvtTailModel::new()
            .with_baseline_percentile(config.baseline_percentile)
            .with_min_exceedances(config.min_exceedances)
            .with_mode(config.tail_quantile);

        Self {
            config,
            splitter: BaselineClusterSplitter::new(),
            tail_model,
            metrics: SentinelMetrics::new(),
            logger: StructuredLogger::new("threshold-engine"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Hybrid threshold for a count metric, rounded to the nearest integer
    pub fn threshold_for_count<T, M>(&self, items: &[T], window_minutes: u32, metric: &M, q: f64) -> i64
    where
        T: Timestamped,
        M: WindowMetric<T> + ?Sized,
    {
        self.compute(items, window_minutes, metric, q, Strategy::Hybrid, Precision::Integer)
            .value as i64
    }

    /// Percentile threshold for an average metric, rounded to two decimals
    pub fn threshold_for_average<T, M>(&self, items: &[T], window_minutes: u32, metric: &M, q: f64) -> f64
    where
        T: Timestamped,
        M: WindowMetric<T> + ?Sized,
    {
        self.compute(items, window_minutes, metric, q, Strategy::Percentile, Precision::Hundredths)
            .value
    }

    /// Sample `metric` over sliding windows of `items` and derive a threshold
    pub fn compute<T, M>(
        &self,
        items: &[T],
        window_minutes: u32,
        metric: &M,
        q: f64,
        strategy: Strategy,
        precision: Precision,
    ) -> Threshold
    where
        T: Timestamped,
        M: WindowMetric<T> + ?Sized,
    {
        let sampler = SlidingWindowSampler::new(window_minutes).with_step(self.config.step_minutes);
        let values = sampler.sample_values(items, metric);
        self.from_samples(&values, q, strategy, precision)
    }

    /// Derive a threshold from precomputed samples
    pub fn from_samples(&self, values: &[f64], q: f64, strategy: Strategy, precision: Precision) -> Threshold {
        let values: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return Threshold::empty();
        }

        let (raw, source) = match strategy {
            Strategy::Percentile => (
                quantile(&values, q).unwrap_or(0.0),
                ThresholdSource::DirectPercentile,
            ),
            Strategy::Hybrid => self.hybrid(&values, q),
        };

        let threshold = Threshold {
            value: precision.apply(raw),
            source,
            samples: values.len(),
        };

        if let ThresholdSource::NormalPercentile { reason } | ThresholdSource::SamplePercentile { reason } =
            &threshold.source
        {
            self.metrics
                .inc_threshold_fallback(threshold.source.label(), reason);
            self.logger.log_threshold_fallback(
                threshold.source.label(),
                reason,
                threshold.samples,
                threshold.value,
            );
        }

        threshold
    }

    fn hybrid(&self, values: &[f64], q: f64) -> (f64, ThresholdSource) {
        let whole_sample = |reason: ThresholdError| {
            (
                quantile(values, q).unwrap_or(0.0),
                ThresholdSource::SamplePercentile {
                    reason: reason.label().to_string(),
                },
            )
        };

        let split = match self.splitter.split(values) {
            Ok(split) if !split.normal.is_empty() => split,
            Ok(_) => return whole_sample(ThresholdError::InsufficientData),
            Err(e) => return whole_sample(e),
        };

        match self.tail_model.estimate(&split.normal, q) {
            Ok(estimate) => (
                estimate.threshold,
                ThresholdSource::Evt {
                    baseline: estimate.baseline,
                    shape: estimate.fit.shape,
                    scale: estimate.fit.scale,
                    exceedances: estimate.exceedances,
                },
            ),
            Err(e) => (
                quantile(&split.normal, q).unwrap_or(0.0),
                ThresholdSource::NormalPercentile {
                    reason: e.label().to_string(),
                },
            ),
        }
    }
}

impl Default for HybridThresholdEngine {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}
