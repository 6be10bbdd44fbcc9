//! End-to-end evaluation tests over synthetic event batches

use chrono::{DateTime, Duration, TimeZone, Utc};
use sentinel_lib::rules::CombinationSpec;
use sentinel_lib::{AnomalyKind, CycleContext, Evaluator, Event, SentinelConfig, StreamKey};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn event(minute: i64, environment: &str, status: u16, response_time: f64) -> Event {
    Event {
        timestamp: start() + Duration::minutes(minute),
        request_id: None,
        environment: environment.to_string(),
        endpoint: "/orders".to_string(),
        service: None,
        http_method: "GET".to_string(),
        http_status: status,
        browser: Some("Chrome 120".to_string()),
        response_time_ms: Some(response_time),
        error_flag: status >= 500,
        cpu_usage_percent: Some(25.0),
        memory_usage_mb: Some(512.0),
    }
}

fn evaluator() -> Evaluator {
    Evaluator::new(SentinelConfig::default()).unwrap()
}

#[test]
fn test_pattern_change_isolated_to_climbing_stream() {
    let mut events = Vec::new();
    for bin in 0..12i64 {
        events.push(event(bin * 15, "prod", 200, 100.0 + 50.0 * bin as f64));
        events.push(event(bin * 15, "staging", 200, 250.0));
    }

    let report = evaluator().run(&events, &CycleContext::new());
    assert_eq!(report.streams, 2);

    let prod = StreamKey::new("prod", "/orders");
    let pattern: Vec<_> = report
        .anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::PatternChange)
        .collect();
    assert_eq!(pattern.len(), 1);
    assert_eq!(pattern[0].stream, prod);
    assert_eq!(pattern[0].timestamp, start() + Duration::minutes(165));
    assert!((pattern[0].observed - 50.0).abs() < 1e-6);

    let staging = StreamKey::new("staging", "/orders");
    assert!(report.anomalies.iter().all(|a| a.stream != staging));
}

#[test]
fn test_high_risk_journey_flagged() {
    let mut events = Vec::new();
    for i in 0..10i64 {
        let mut hop = event(i, "prod", 200, 100.0);
        hop.request_id = Some(format!("tx-{}", i));
        events.push(hop);
    }
    for (minute, env) in [(20, "prod"), (21, "staging")] {
        let mut hop = event(minute, env, 503, 100.0);
        hop.request_id = Some("tx-bad".to_string());
        events.push(hop);
    }

    let report = evaluator().run(&events, &CycleContext::new());

    assert_eq!(report.journeys.journeys.len(), 11);
    assert_eq!(report.journeys.threshold, 100.0);

    let flagged: Vec<_> = report.journeys.anomalous().collect();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].request_id, "tx-bad");
    assert_eq!(flagged[0].risk, 350.0);
    assert_eq!(flagged[0].environments, vec!["prod", "staging"]);
}

#[test]
fn test_rule_window_excludes_lower_bound() {
    // One 500 every fourth minute for two hours
    let events: Vec<Event> = (0..120)
        .map(|m| event(m, "prod", if m % 4 == 0 { 500 } else { 200 }, 100.0))
        .collect();
    let evaluator = evaluator();

    // (99, 119] holds the 500s at 100, 104, 108, 112, 116
    let at_last = evaluator.run(&events, &CycleContext::new());
    assert_eq!(at_last.rules[0].rule_id, 1);
    assert_eq!(at_last.rules[0].threshold, 5.0);
    assert_eq!(at_last.rules[0].observed, 5.0);
    assert!(at_last.rules[0].triggered);

    // (100, 120] drops the 500 at minute 100
    let ctx = CycleContext::new().with_current_time(start() + Duration::minutes(120));
    let shifted = evaluator.run(&events, &ctx);
    assert_eq!(shifted.rules[0].observed, 4.0);
    assert!(!shifted.rules[0].triggered);
}

#[test]
fn test_combined_rule_requires_every_member() {
    let events: Vec<Event> = (0..120)
        .map(|m| event(m, "prod", if m % 4 == 0 { 500 } else { 200 }, 100.0))
        .collect();

    let mut config = SentinelConfig::default();
    config.combinations = vec![CombinationSpec {
        rule_ids: vec![1, 2],
    }];
    let report = Evaluator::new(config).unwrap().run(&events, &CycleContext::new());

    assert!(report.combination_errors.is_empty());
    let combined = &report.combinations[0];
    assert_eq!(combined.rule_ids, vec![1, 2]);
    assert_eq!(combined.observed, vec![5.0, 5.0]);
    assert_eq!(
        combined.triggered,
        report.rules[0].triggered && report.rules[1].triggered
    );
}

#[test]
fn test_report_serializes_to_json() {
    let events: Vec<Event> = (0..30).map(|m| event(m, "prod", 200, 100.0)).collect();
    let report = evaluator().run(&events, &CycleContext::new());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["events"], 30);
    assert_eq!(json["rules"].as_array().unwrap().len(), 11);
}
