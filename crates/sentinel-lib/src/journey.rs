//! End-to-end transaction risk scoring
//!
//! Events sharing a transaction id form a journey. Each journey is scored
//! from its mean latency, its error count, and how many environments it
//! crossed; journeys above a batch-relative percentile are flagged.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Event;
use crate::stats::quantile;

/// Default risk quantile a journey must exceed
const DEFAULT_QUANTILE: f64 = 0.90;

/// Risk added per failed request
const ERROR_WEIGHT: f64 = 100.0;

/// Risk added per environment crossed beyond the first
const ENVIRONMENT_WEIGHT: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JourneyConfig {
    pub quantile: f64,
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            quantile: DEFAULT_QUANTILE,
        }
    }
}

/// Risk score from journey totals
pub fn risk_score(
    total_response_time_ms: f64,
    total_requests: u64,
    total_errors: u64,
    distinct_environments: usize,
) -> f64 {
    let mean_latency = if total_requests == 0 {
        0.0
    } else {
        total_response_time_ms / total_requests as f64
    };
    mean_latency
        + ERROR_WEIGHT * total_errors as f64
        + ENVIRONMENT_WEIGHT * distinct_environments.saturating_sub(1) as f64
}

/// One transaction and its score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JourneyRisk {
    pub request_id: String,
    pub journey_start: DateTime<Utc>,
    pub total_response_time_ms: f64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub environments: Vec<String>,
    pub risk: f64,
    pub anomalous: bool,
}

/// All journeys of a batch with the threshold they were judged against
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JourneyReport {
    pub threshold: f64,
    pub journeys: Vec<JourneyRisk>,
}

impl JourneyReport {
    pub fn anomalous(&self) -> impl Iterator<Item = &JourneyRisk> {
        self.journeys.iter().filter(|j| j.anomalous)
    }
}

struct JourneyAccumulator {
    start: DateTime<Utc>,
    response_time: f64,
    requests: u64,
    errors: u64,
    environments: BTreeSet<String>,
}

/// Scores transactions that span multiple hops
#[derive(Debug, Clone)]
pub struct JourneyRiskAnalyzer {
    quantile: f64,
}

impl JourneyRiskAnalyzer {
    pub fn new(config: &JourneyConfig) -> Self {
        Self {
            quantile: config.quantile,
        }
    }

    /// Score every journey in `events`; events without a transaction id are ignored
    pub fn analyze(&self, events: &[Event]) -> JourneyReport {
        let mut acc: BTreeMap<&str, JourneyAccumulator> = BTreeMap::new();

        for event in events {
            let Some(request_id) = event.request_id.as_deref() else {
                continue;
            };
            let entry = acc.entry(request_id).or_insert_with(|| JourneyAccumulator {
                start: event.timestamp,
                response_time: 0.0,
                requests: 0,
                errors: 0,
                environments: BTreeSet::new(),
            });

            entry.start = entry.start.min(event.timestamp);
            entry.requests += 1;
            if let Some(rt) = event.response_time_ms.filter(|v| !v.is_nan()) {
                entry.response_time += rt;
            }
            if event.error_flag {
                entry.errors += 1;
            }
            entry.environments.insert(event.environment.clone());
        }

        let mut journeys: Vec<JourneyRisk> = acc
            .into_iter()
            .map(|(request_id, a)| JourneyRisk {
                request_id: request_id.to_string(),
                journey_start: a.start,
                total_response_time_ms: a.response_time,
                total_requests: a.requests,
                total_errors: a.errors,
                risk: risk_score(a.response_time, a.requests, a.errors, a.environments.len()),
                environments: a.environments.into_iter().collect(),
                anomalous: false,
            })
            .collect();

        let scores: Vec<f64> = journeys.iter().map(|j| j.risk).collect();
        let Some(threshold) = quantile(&scores, self.quantile) else {
            return JourneyReport {
                threshold: 0.0,
                journeys,
            };
        };

        for journey in &mut journeys {
            journey.anomalous = journey.risk > threshold;
        }

        JourneyReport {
            threshold,
            journeys,
        }
    }
}

impl Default for JourneyRiskAnalyzer {
    fn default() -> Self {
        Self::new(&JourneyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn hop(request_id: Option<&str>, minute: i64, env: &str, rt: f64, error: bool) -> Event {
        Event {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            request_id: request_id.map(str::to_string),
            environment: env.to_string(),
            endpoint: "/checkout".to_string(),
            service: None,
            http_method: "POST".to_string(),
            http_status: if error { 500 } else { 200 },
            browser: None,
            response_time_ms: Some(rt),
            error_flag: error,
            cpu_usage_percent: None,
            memory_usage_mb: None,
        }
    }

    #[test]
    fn test_risk_score_formula() {
        // 200 ms over 2 requests, 2 errors, 2 environments
        assert_eq!(risk_score(200.0, 2, 2, 2), 350.0);
        assert_eq!(risk_score(0.0, 0, 0, 0), 0.0);
    }

    #[test]
    fn test_journey_totals() {
        let events = vec![
            hop(Some("tx-1"), 5, "prod", 120.0, true),
            hop(Some("tx-1"), 2, "staging", 80.0, true),
            hop(None, 1, "prod", 5000.0, true),
        ];
        let report = JourneyRiskAnalyzer::default().analyze(&events);

        assert_eq!(report.journeys.len(), 1);
        let journey = &report.journeys[0];
        assert_eq!(journey.total_requests, 2);
        assert_eq!(journey.total_errors, 2);
        assert_eq!(journey.environments, vec!["prod", "staging"]);
        assert_eq!(journey.risk, 350.0);
        assert_eq!(journey.journey_start, events[1].timestamp);
    }

    #[test]
    fn test_flags_journeys_above_percentile() {
        let mut events: Vec<Event> = (0..20)
            .map(|i| hop(Some(&format!("tx-{i}")), i, "prod", 100.0, false))
            .collect();
        events.push(hop(Some("tx-bad"), 30, "prod", 100.0, true));
        events.push(hop(Some("tx-bad"), 31, "edge", 100.0, true));

        let report = JourneyRiskAnalyzer::default().analyze(&events);
        let flagged: Vec<&str> = report.anomalous().map(|j| j.request_id.as_str()).collect();

        assert_eq!(flagged, vec!["tx-bad"]);
        assert_eq!(report.threshold, 100.0);
    }

    #[test]
    fn test_no_transactions() {
        let events = vec![hop(None, 0, "prod", 10.0, false)];
        let report = JourneyRiskAnalyzer::default().analyze(&events);
        assert!(report.journeys.is_empty());
        assert_eq!(report.threshold, 0.0);
    }
}
