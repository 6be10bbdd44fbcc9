//! Window aggregations bound to rules and detectors
//!
//! A condition is one of a closed set of aggregations (count of matching
//! events, average of a numeric field, rate of matching events) rather than
//! arbitrary code, so rules stay serialisable and testable.

use serde::{Deserialize, Serialize};

use crate::models::{AggregatedBin, Event};

/// Reduces the items of one window to a scalar
pub trait WindowMetric<T> {
    fn measure(&self, window: &[&T]) -> f64;
}

/// Event filter used by count and rate conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// HTTP status equals the given code
    Status { code: u16 },
    /// HTTP status within `[low, high]`
    StatusRange { low: u16, high: u16 },
    /// HTTP method equals (case-insensitive)
    Method { method: String },
    /// Browser string contains the needle (case-insensitive)
    BrowserContains { needle: String },
    /// Browser string equals (case-insensitive)
    BrowserIs { browser: String },
    /// Event carries the error flag
    Error,
    /// Every inner predicate matches
    All { predicates: Vec<Predicate> },
}

impl Predicate {
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Predicate::Status { code } => event.http_status == *code,
            Predicate::StatusRange { low, high } => {
                (*low..=*high).contains(&event.http_status)
            }
            Predicate::Method { method } => event.http_method.eq_ignore_ascii_case(method),
            Predicate::BrowserContains { needle } => event
                .browser
                .as_deref()
                .map(|b| b.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            Predicate::BrowserIs { browser } => event
                .browser
                .as_deref()
                .map(|b| b.eq_ignore_ascii_case(browser))
                .unwrap_or(false),
            Predicate::Error => event.error_flag,
            Predicate::All { predicates } => predicates.iter().all(|p| p.matches(event)),
        }
    }
}

/// Numeric event fields that can be averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    ResponseTimeMs,
    CpuUsagePercent,
    MemoryUsageMb,
}

impl NumericField {
    pub fn value(&self, event: &Event) -> Option<f64> {
        match self {
            NumericField::ResponseTimeMs => event.response_time_ms,
            NumericField::CpuUsagePercent => event.cpu_usage_percent,
            NumericField::MemoryUsageMb => event.memory_usage_mb,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NumericField::ResponseTimeMs => "response time",
            NumericField::CpuUsagePercent => "CPU usage",
            NumericField::MemoryUsageMb => "memory usage",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            NumericField::ResponseTimeMs => " ms",
            NumericField::CpuUsagePercent => "%",
            NumericField::MemoryUsageMb => " MB",
        }
    }
}

/// Aggregation over the raw events of a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Number of events matching the predicate
    Count { predicate: Predicate },
    /// Mean of a numeric field; 0 for a window without values
    Average { field: NumericField },
    /// Fraction of events matching the predicate; 0 for an empty window
    Rate { predicate: Predicate },
}

impl Condition {
    pub fn count_status(code: u16) -> Self {
        Condition::Count {
            predicate: Predicate::Status { code },
        }
    }

    pub fn average(field: NumericField) -> Self {
        Condition::Average { field }
    }

    pub fn is_count(&self) -> bool {
        matches!(self, Condition::Count { .. })
    }
}

impl WindowMetric<Event> for Condition {
    fn measure(&self, window: &[&Event]) -> f64 {
        match self {
            Condition::Count { predicate } => {
                window.iter().filter(|e| predicate.matches(e)).count() as f64
            }
            Condition::Average { field } => {
                let values: Vec<f64> = window
                    .iter()
                    .filter_map(|e| field.value(e))
                    .filter(|v| !v.is_nan())
                    .collect();
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            Condition::Rate { predicate } => {
                if window.is_empty() {
                    return 0.0;
                }
                let hits = window.iter().filter(|e| predicate.matches(e)).count();
                hits as f64 / window.len() as f64
            }
        }
    }
}

/// Columns of the aggregated bin table, averaged over a window of bins
///
/// A window without any finite value measures NaN, which the sampler drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinMetric {
    AvgResponseTime,
    ErrorRate,
    RequestCount,
    ErrorCount,
}

impl BinMetric {
    pub fn value(&self, bin: &AggregatedBin) -> f64 {
        match self {
            BinMetric::AvgResponseTime => bin.avg_response_time,
            BinMetric::ErrorRate => bin.error_rate,
            BinMetric::RequestCount => bin.request_count as f64,
            BinMetric::ErrorCount => bin.error_count as f64,
        }
    }
}

impl WindowMetric<AggregatedBin> for BinMetric {
    fn measure(&self, window: &[&AggregatedBin]) -> f64 {
        let values: Vec<f64> = window
            .iter()
            .map(|b| self.value(b))
            .filter(|v| !v.is_nan())
            .collect();
        if values.is_empty() {
            return f64::NAN;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(status: u16, method: &str, browser: Option<&str>) -> Event {
        Event {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            request_id: None,
            environment: "prod".to_string(),
            endpoint: "/orders".to_string(),
            service: None,
            http_method: method.to_string(),
            http_status: status,
            browser: browser.map(str::to_string),
            response_time_ms: Some(100.0),
            error_flag: status >= 500,
            cpu_usage_percent: Some(40.0),
            memory_usage_mb: None,
        }
    }

    #[test]
    fn test_count_status_and_range() {
        let events = [
            event(500, "GET", None),
            event(404, "GET", None),
            event(200, "GET", None),
            event(503, "POST", None),
        ];
        let refs: Vec<&Event> = events.iter().collect();

        assert_eq!(Condition::count_status(500).measure(&refs), 1.0);
        let range = Condition::Count {
            predicate: Predicate::StatusRange { low: 400, high: 599 },
        };
        assert_eq!(range.measure(&refs), 3.0);
    }

    #[test]
    fn test_post_from_safari_is_case_insensitive() {
        let events = [
            event(200, "POST", Some("safari 13.1.2")),
            event(200, "POST", Some("Chrome 90.0")),
            event(200, "GET", Some("Safari 13.1.2")),
        ];
        let refs: Vec<&Event> = events.iter().collect();
        let condition = Condition::Count {
            predicate: Predicate::All {
                predicates: vec![
                    Predicate::Method {
                        method: "POST".to_string(),
                    },
                    Predicate::BrowserContains {
                        needle: "Safari".to_string(),
                    },
                ],
            },
        };

        assert_eq!(condition.measure(&refs), 1.0);
    }

    #[test]
    fn test_average_and_rate_on_empty_window() {
        let empty: Vec<&Event> = Vec::new();
        assert_eq!(
            Condition::average(NumericField::CpuUsagePercent).measure(&empty),
            0.0
        );
        let rate = Condition::Rate {
            predicate: Predicate::Error,
        };
        assert_eq!(rate.measure(&empty), 0.0);
    }

    #[test]
    fn test_average_skips_missing_values() {
        let events = [event(200, "GET", None), event(200, "GET", None)];
        let refs: Vec<&Event> = events.iter().collect();
        // memory_usage_mb is None everywhere
        assert_eq!(
            Condition::average(NumericField::MemoryUsageMb).measure(&refs),
            0.0
        );
        assert_eq!(
            Condition::average(NumericField::CpuUsagePercent).measure(&refs),
            40.0
        );
    }

    #[test]
    fn test_bin_metric_window_without_values_is_nan() {
        let bin = AggregatedBin {
            stream: crate::models::StreamKey::new("prod", "/orders"),
            time_bin: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            request_count: 4,
            error_count: 1,
            avg_response_time: f64::NAN,
            error_rate: 0.25,
        };
        let window = vec![&bin];

        assert!(BinMetric::AvgResponseTime.measure(&window).is_nan());
        assert_eq!(BinMetric::ErrorRate.measure(&window), 0.25);
        assert!(BinMetric::RequestCount.measure(&[]).is_nan());
    }

    #[test]
    fn test_condition_deserializes_from_toml_shape() {
        let json = r#"{"kind": "count", "predicate": {"type": "browser_is", "browser": "UNKNOWN"}}"#;
        let condition: Condition = serde_json::from_str(json).unwrap();
        assert!(condition.is_count());
    }
}
