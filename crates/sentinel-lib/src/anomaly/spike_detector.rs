//! Response time spike detection
//!
//! Flags bins whose average response time exceeds either a sliding-window
//! percentile threshold or a mean plus k standard deviations bound.

use serde::{Deserialize, Serialize};

use super::StreamDetector;
use crate::condition::BinMetric;
use crate::error::ThresholdError;
use crate::models::{AggregatedBin, AnomalyKind, AnomalyRecord};
use crate::stats::{mean, std_dev};
use crate::threshold::{HybridThresholdEngine, Precision, Strategy};

/// Default sliding window for the dynamic threshold (15 minutes)
const DEFAULT_WINDOW_MINUTES: u32 = 15;

const DEFAULT_QUANTILE: f64 = 0.99;

/// Default number of standard deviations above the mean
const DEFAULT_STD_DEV_MULTIPLIER: f64 = 2.0;

fn default_window_minutes() -> u32 {
    DEFAULT_WINDOW_MINUTES
}

fn default_quantile() -> f64 {
    DEFAULT_QUANTILE
}

fn default_multiplier() -> f64 {
    DEFAULT_STD_DEV_MULTIPLIER
}

/// How the spike threshold is derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SpikeMode {
    /// Percentile of sliding-window averages of the stream
    Dynamic {
        #[serde(default = "default_window_minutes")]
        window_minutes: u32,
        #[serde(default = "default_quantile")]
        quantile: f64,
    },
    /// Mean plus `multiplier` sample standard deviations
    StdDev {
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
}

impl Default for SpikeMode {
    fn default() -> Self {
        SpikeMode::Dynamic {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            quantile: DEFAULT_QUANTILE,
        }
    }
}

/// Detects response time spikes per stream
pub struct SpikeDetector {
    mode: SpikeMode,
    engine: HybridThresholdEngine,
}

impl SpikeDetector {
    pub fn new(mode: SpikeMode, engine: HybridThresholdEngine) -> Self {
        Self { mode, engine }
    }

    pub fn mode(&self) -> &SpikeMode {
        &self.mode
    }

    /// Threshold for one stream's bins
    fn threshold(&self, bins: &[AggregatedBin]) -> Result<f64, ThresholdError> {
        match self.mode {
            SpikeMode::Dynamic {
                window_minutes,
                quantile,
            } => {
                let threshold = self.engine.compute(
                    bins,
                    window_minutes,
                    &BinMetric::AvgResponseTime,
                    quantile,
                    Strategy::Percentile,
                    Precision::Hundredths,
                );
                if threshold.is_empty() {
                    return Err(ThresholdError::InsufficientData);
                }
                Ok(threshold.value)
            }
            SpikeMode::StdDev { multiplier } => {
                let values: Vec<f64> = bins
                    .iter()
                    .map(|b| b.avg_response_time)
                    .filter(|v| !v.is_nan())
                    .collect();
                let m = mean(&values).ok_or(ThresholdError::InsufficientData)?;
                let sd = std_dev(&values).ok_or(ThresholdError::InsufficientData)?;
                Ok(m + multiplier * sd)
            }
        }
    }
}

impl StreamDetector for SpikeDetector {
    fn name(&self) -> &'static str {
        "spike"
    }

    fn detect_stream(&self, bins: &[AggregatedBin]) -> Result<Vec<AnomalyRecord>, ThresholdError> {
        let threshold = self.threshold(bins)?;

        Ok(bins
            .iter()
            .filter(|b| b.avg_response_time > threshold)
            .map(|b| AnomalyRecord {
                stream: b.stream.clone(),
                timestamp: b.time_bin,
                kind: AnomalyKind::Spike,
                observed: b.avg_response_time,
                threshold,
                p_value: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{bin_time, bins};
    use super::*;

    fn alternating_with_spike(n: usize, spike: f64) -> Vec<AggregatedBin> {
        let mut rts: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        rts.push(spike);
        let ers = vec![0.0; rts.len()];
        bins("prod", &rts, &ers)
    }

    #[test]
    fn test_planted_spike_is_only_anomaly() {
        let detector = SpikeDetector::new(SpikeMode::default(), HybridThresholdEngine::default());
        let stream = alternating_with_spike(40, 1000.0);

        let anomalies = detector.detect_stream(&stream).unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].timestamp, bin_time(40));
        assert_eq!(anomalies[0].observed, 1000.0);
        assert!(anomalies[0].threshold <= 101.0);
    }

    #[test]
    fn test_no_spike_on_steady_stream() {
        let detector = SpikeDetector::new(SpikeMode::default(), HybridThresholdEngine::default());
        let rts = vec![200.0; 20];
        let stream = bins("prod", &rts, &vec![0.0; 20]);

        assert!(detector.detect_stream(&stream).unwrap().is_empty());
    }

    #[test]
    fn test_std_dev_mode() {
        let detector = SpikeDetector::new(
            SpikeMode::StdDev { multiplier: 2.0 },
            HybridThresholdEngine::default(),
        );
        let stream = alternating_with_spike(40, 1000.0);

        let anomalies = detector.detect_stream(&stream).unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].observed, 1000.0);
    }

    #[test]
    fn test_nan_bins_are_never_flagged() {
        let detector = SpikeDetector::new(
            SpikeMode::StdDev { multiplier: 0.0 },
            HybridThresholdEngine::default(),
        );
        let stream = bins("prod", &[100.0, f64::NAN, 300.0], &[0.0, 0.0, 0.0]);

        let anomalies = detector.detect_stream(&stream).unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].observed, 300.0);
    }

    #[test]
    fn test_mode_deserializes_with_defaults() {
        let mode: SpikeMode = serde_json::from_str(r#"{"mode": "std_dev"}"#).unwrap();
        assert_eq!(mode, SpikeMode::StdDev { multiplier: 2.0 });

        let mode: SpikeMode = serde_json::from_str(r#"{"mode": "dynamic", "quantile": 0.9}"#).unwrap();
        assert_eq!(
            mode,
            SpikeMode::Dynamic {
                window_minutes: 15,
                quantile: 0.9
            }
        );
    }
}
