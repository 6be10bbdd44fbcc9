//! Observability infrastructure for the sentinel
//!
//! Provides:
//! - Prometheus metrics (cycle latency, anomalies by kind, threshold fallbacks, rule triggers)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::models::AnomalyRecord;

/// Histogram buckets for cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

struct SentinelMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_completed: IntCounter,
    events_processed: IntCounter,
    streams_evaluated: IntGauge,
    stream_errors: IntCounter,
    anomalies_detected: IntCounterVec,
    threshold_fallbacks: IntCounterVec,
    rules_triggered: IntCounterVec,
    journeys_flagged: IntCounter,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "telemetry_sentinel_cycle_latency_seconds",
                "Time spent on one full evaluation cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_completed: register_int_counter!(
                "telemetry_sentinel_cycles_completed_total",
                "Total number of completed evaluation cycles"
            )
            .expect("Failed to register cycles_completed"),

            events_processed: register_int_counter!(
                "telemetry_sentinel_events_processed_total",
                "Total number of events evaluated"
            )
            .expect("Failed to register events_processed"),

            streams_evaluated: register_int_gauge!(
                "telemetry_sentinel_streams_evaluated",
                "Number of streams evaluated in the last cycle"
            )
            .expect("Failed to register streams_evaluated"),

            stream_errors: register_int_counter!(
                "telemetry_sentinel_stream_errors_total",
                "Total number of stream evaluations that were skipped"
            )
            .expect("Failed to register stream_errors"),

            anomalies_detected: register_int_counter_vec!(
                "telemetry_sentinel_anomalies_detected_total",
                "Total number of anomalies detected",
                &["kind"]
            )
            .expect("Failed to register anomalies_detected"),

            threshold_fallbacks: register_int_counter_vec!(
                "telemetry_sentinel_threshold_fallbacks_total",
                "Thresholds derived from a percentile fallback instead of the tail fit",
                &["path", "reason"]
            )
            .expect("Failed to register threshold_fallbacks"),

            rules_triggered: register_int_counter_vec!(
                "telemetry_sentinel_rules_triggered_total",
                "Total number of rule evaluations that triggered",
                &["rule_id", "level"]
            )
            .expect("Failed to register rules_triggered"),

            journeys_flagged: register_int_counter!(
                "telemetry_sentinel_journeys_flagged_total",
                "Total number of journeys flagged as high risk"
            )
            .expect("Failed to register journeys_flagged"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
        self.inner().cycles_completed.inc();
    }

    pub fn add_events_processed(&self, count: u64) {
        self.inner().events_processed.inc_by(count);
    }

    pub fn set_streams_evaluated(&self, count: i64) {
        self.inner().streams_evaluated.set(count);
    }

    pub fn inc_stream_errors(&self) {
        self.inner().stream_errors.inc();
    }

    pub fn inc_anomalies_detected(&self, kind: &str) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[kind])
            .inc();
    }

    /// Count a threshold that fell back to a percentile
    pub fn inc_threshold_fallback(&self, path: &str, reason: &str) {
        self.inner()
            .threshold_fallbacks
            .with_label_values(&[path, reason])
            .inc();
    }

    pub fn inc_rules_triggered(&self, rule_id: u32, level: &str) {
        self.inner()
            .rules_triggered
            .with_label_values(&[&rule_id.to_string(), level])
            .inc();
    }

    pub fn inc_journeys_flagged(&self, count: u64) {
        self.inner().journeys_flagged.inc_by(count);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Structured logger for sentinel events
///
/// Keeps field names consistent across anomalies, rule alerts, and cycle
/// summaries so JSON log consumers can filter on `event`.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_anomaly(&self, record: &AnomalyRecord) {
        warn!(
            event = "anomaly_detected",
            instance = %self.instance,
            stream = %record.stream,
            anomaly_type = %record.kind.as_str(),
            timestamp = %record.timestamp,
            observed = record.observed,
            threshold = record.threshold,
            p_value = ?record.p_value,
            "{}",
            record
        );
    }

    /// Log a threshold that was derived from a fallback path
    pub fn log_threshold_fallback(&self, path: &str, reason: &str, samples: usize, value: f64) {
        debug!(
            event = "threshold_fallback",
            instance = %self.instance,
            path = %path,
            reason = %reason,
            samples = samples,
            threshold = value,
            "Tail fit unavailable, using percentile threshold"
        );
    }

    pub fn log_rule_triggered(
        &self,
        rule_id: u32,
        level: &str,
        description: &str,
        observed: f64,
        threshold: f64,
    ) {
        let message = "Rule triggered";
        match level {
            "critical" => warn!(
                event = "rule_triggered",
                instance = %self.instance,
                rule_id = rule_id,
                level = %level,
                description = %description,
                observed = observed,
                threshold = threshold,
                "{}",
                message
            ),
            _ => info!(
                event = "rule_triggered",
                instance = %self.instance,
                rule_id = rule_id,
                level = %level,
                description = %description,
                observed = observed,
                threshold = threshold,
                "{}",
                message
            ),
        }
    }

    pub fn log_combined_alert(&self, rule_ids: &[u32], description: &str) {
        warn!(
            event = "combined_rule_triggered",
            instance = %self.instance,
            rule_ids = ?rule_ids,
            description = %description,
            "Combined rule triggered"
        );
    }

    pub fn log_journey_flagged(&self, request_id: &str, risk: f64, threshold: f64) {
        warn!(
            event = "journey_flagged",
            instance = %self.instance,
            request_id = %request_id,
            risk = risk,
            threshold = threshold,
            "High-risk journey detected"
        );
    }

    pub fn log_stream_skipped(&self, stream: &str, detector: &str, reason: &str) {
        debug!(
            event = "stream_skipped",
            instance = %self.instance,
            stream = %stream,
            detector = %detector,
            reason = %reason,
            "Stream skipped"
        );
    }

    pub fn log_cycle_complete(
        &self,
        cycle_id: u64,
        events: usize,
        anomalies: usize,
        rules_triggered: usize,
        duration_secs: f64,
    ) {
        info!(
            event = "cycle_complete",
            instance = %self.instance,
            cycle_id = cycle_id,
            events = events,
            anomalies = anomalies,
            rules_triggered = rules_triggered,
            duration_secs = duration_secs,
            "Evaluation cycle complete"
        );
    }

    pub fn log_startup(&self, version: &str, rules: usize) {
        info!(
            event = "sentinel_started",
            instance = %self.instance,
            version = %version,
            rules = rules,
            "Telemetry sentinel started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sentinel_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Telemetry sentinel shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_metrics_creation() {
        let metrics = SentinelMetrics::new();

        metrics.observe_cycle_latency(0.01);
        metrics.add_events_processed(42);
        metrics.set_streams_evaluated(3);
        metrics.inc_anomalies_detected("spike");
        metrics.inc_threshold_fallback("normal_percentile", "insufficient_tail_data");
        metrics.inc_rules_triggered(1, "warning");

        let text = metrics.render().unwrap();
        assert!(text.contains("telemetry_sentinel_anomalies_detected_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance(), "test-instance");
    }
}
