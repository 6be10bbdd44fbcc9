//! Anomaly detection over the aggregated bin table
//!
//! This module provides detection for:
//! - Spikes (bin values above a dynamic or std-dev threshold)
//! - Pattern changes (significant upward trend in response time)
//! - Error rates (bin error rates above a hybrid or percentile threshold)
//!
//! Every detector runs per stream; a stream that cannot be evaluated is
//! skipped without affecting the others.

mod error_rate_detector;
mod pattern_detector;
mod spike_detector;

pub use error_rate_detector::{ErrorRateDetector, ErrorRateMode};
pub use pattern_detector::{PatternChangeDetector, PatternConfig, SlopeThreshold};
pub use spike_detector::{SpikeDetector, SpikeMode};

use crate::aggregate::group_by_stream;
use crate::error::ThresholdError;
use crate::models::{AggregatedBin, AnomalyRecord};
use crate::observability::{SentinelMetrics, StructuredLogger};

/// A detector that evaluates one stream at a time
pub trait StreamDetector {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Evaluate the time-ordered bins of a single stream
    ///
    /// `Err` means the stream could not be evaluated; the caller skips it.
    fn detect_stream(&self, bins: &[AggregatedBin]) -> Result<Vec<AnomalyRecord>, ThresholdError>;
}

/// Run `detector` over every stream in `bins`
///
/// Streams with fewer than two bins are skipped, as are streams for which
/// the detector reports an error.
pub fn detect_all<D>(detector: &D, bins: &[AggregatedBin], logger: &StructuredLogger) -> Vec<AnomalyRecord>
where
    D: StreamDetector + ?Sized,
{
    let metrics = SentinelMetrics::new();
    let mut anomalies = Vec::new();

    for (stream, group) in group_by_stream(bins) {
        if group.len() <= 1 {
            continue;
        }

        let owned: Vec<AggregatedBin> = group.into_iter().cloned().collect();
        match detector.detect_stream(&owned) {
            Ok(found) => {
                for record in &found {
                    metrics.inc_anomalies_detected(record.kind.as_str());
                    logger.log_anomaly(record);
                }
                anomalies.extend(found);
            }
            Err(e) => {
                metrics.inc_stream_errors();
                logger.log_stream_skipped(&stream.to_string(), detector.name(), e.label());
            }
        }
    }

    anomalies
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::models::{AggregatedBin, StreamKey};

    pub fn bin_time(index: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(15 * index)
    }

    /// Consecutive 15 minute bins for one stream
    pub fn bins(env: &str, response_times: &[f64], error_rates: &[f64]) -> Vec<AggregatedBin> {
        response_times
            .iter()
            .zip(error_rates)
            .enumerate()
            .map(|(i, (rt, er))| AggregatedBin {
                stream: StreamKey::new(env, "/orders"),
                time_bin: bin_time(i as i64),
                request_count: 100,
                error_count: (er * 100.0).round() as u64,
                avg_response_time: *rt,
                error_rate: *er,
            })
            .collect()
    }
}
