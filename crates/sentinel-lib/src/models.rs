//! Core data models for the telemetry sentinel

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anything positioned on the timeline that windows can be cut from
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// One observed request record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    /// End-to-end transaction identifier shared by every hop of a request
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default = "default_dimension")]
    pub environment: String,
    #[serde(default = "default_dimension")]
    pub endpoint: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub http_method: String,
    pub http_status: u16,
    #[serde(default, alias = "Browser")]
    pub browser: Option<String>,
    #[serde(default)]
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub error_flag: bool,
    #[serde(default)]
    pub cpu_usage_percent: Option<f64>,
    #[serde(default)]
    pub memory_usage_mb: Option<f64>,
}

fn default_dimension() -> String {
    "unknown".to_string()
}

impl Event {
    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(&self.environment, &self.endpoint)
    }
}

impl Timestamped for Event {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Logical stream a detector evaluates independently
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub environment: String,
    pub endpoint: String,
}

impl StreamKey {
    pub fn new(environment: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.environment, self.endpoint)
    }
}

/// Per-stream aggregate of all events that fell into one time bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBin {
    pub stream: StreamKey,
    pub time_bin: DateTime<Utc>,
    pub request_count: u64,
    pub error_count: u64,
    /// NaN when no event in the bin reported a response time
    pub avg_response_time: f64,
    /// NaN when the bin saw no requests
    pub error_rate: f64,
}

impl Timestamped for AggregatedBin {
    fn timestamp(&self) -> DateTime<Utc> {
        self.time_bin
    }
}

/// Scalar metric value for one sliding window position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub value: f64,
}

/// Anomaly classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Spike,
    PatternChange,
    ErrorRate,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Spike => "spike",
            AnomalyKind::PatternChange => "pattern_change",
            AnomalyKind::ErrorRate => "error_rate",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::Spike => write!(f, "Spike"),
            AnomalyKind::PatternChange => write!(f, "Pattern Change"),
            AnomalyKind::ErrorRate => write!(f, "Error Rate"),
        }
    }
}

/// A detected anomaly, handed off to consumers as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub stream: StreamKey,
    pub timestamp: DateTime<Utc>,
    pub kind: AnomalyKind,
    /// Bin value, or slope per interval for pattern changes
    pub observed: f64,
    pub threshold: f64,
    /// Regression p-value, pattern changes only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
}

impl fmt::Display for AnomalyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AnomalyKind::Spike => write!(
                f,
                "ALERT (Spike): {} at {} | Avg RT: {:.2} ms (Threshold: {})",
                self.stream, self.timestamp, self.observed, self.threshold
            ),
            AnomalyKind::ErrorRate => write!(
                f,
                "ALERT (Error Rate): {} at {} | Error Rate: {:.2} (Threshold: {})",
                self.stream, self.timestamp, self.observed, self.threshold
            ),
            AnomalyKind::PatternChange => write!(
                f,
                "ALERT (Pattern Change): {} at {} | Slope: {:.2} ms/interval (Threshold: {:.2}, p={:.3})",
                self.stream,
                self.timestamp,
                self.observed,
                self.threshold,
                self.p_value.unwrap_or(f64::NAN)
            ),
        }
    }
}
