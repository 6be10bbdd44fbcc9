//! One evaluation pass over an event batch
//!
//! The evaluator is stateless between runs; per-cycle state lives in a
//! [`CycleContext`] owned by the caller.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{group_by_stream, BinAggregator};
use crate::anomaly::{detect_all, ErrorRateDetector, PatternChangeDetector, SpikeDetector};
use crate::config::SentinelConfig;
use crate::error::ConfigError;
use crate::journey::{JourneyReport, JourneyRiskAnalyzer};
use crate::models::{AnomalyRecord, Event};
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::rules::{build_rule_set, CombinedVerdict, RuleSet, RuleVerdict};
use crate::threshold::HybridThresholdEngine;

/// Caller-owned state carried from one cycle to the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleContext {
    pub cycle_id: u64,
    /// Instant rules are evaluated at; the batch's latest timestamp when unset
    pub current_time: Option<DateTime<Utc>>,
    /// When the previous batch was fetched
    pub last_fetch_time: Option<DateTime<Utc>>,
}

impl CycleContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_current_time(mut self, at: DateTime<Utc>) -> Self {
        self.current_time = Some(at);
        self
    }

    /// Context for the following cycle
    pub fn advance(&self, fetched_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: self.cycle_id + 1,
            current_time: None,
            last_fetch_time: Some(fetched_at),
        }
    }
}

/// Everything one cycle found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub events: usize,
    pub streams: usize,
    pub anomalies: Vec<AnomalyRecord>,
    pub journeys: JourneyReport,
    pub rules: Vec<RuleVerdict>,
    pub combinations: Vec<CombinedVerdict>,
    /// Configured combinations that could not be built
    pub combination_errors: Vec<String>,
}

impl CycleReport {
    fn empty(cycle_id: u64) -> Self {
        Self {
            cycle_id,
            evaluated_at: None,
            events: 0,
            streams: 0,
            anomalies: Vec::new(),
            journeys: JourneyReport {
                threshold: 0.0,
                journeys: Vec::new(),
            },
            rules: Vec::new(),
            combinations: Vec::new(),
            combination_errors: Vec::new(),
        }
    }

    pub fn rules_triggered(&self) -> usize {
        self.rules.iter().filter(|r| r.triggered).count()
    }
}

/// Runs aggregation, detectors, journey analysis, and rules over a batch
pub struct Evaluator {
    config: SentinelConfig,
    engine: HybridThresholdEngine,
    aggregator: BinAggregator,
    spike: SpikeDetector,
    pattern: PatternChangeDetector,
    error_rate: ErrorRateDetector,
    journey: JourneyRiskAnalyzer,
    logger: StructuredLogger,
    metrics: SentinelMetrics,
}

impl Evaluator {
    pub fn new(config: SentinelConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let logger = StructuredLogger::new("sentinel");
        let engine = HybridThresholdEngine::new(config.threshold.clone()).with_logger(logger.clone());
        let aggregator = BinAggregator::new(config.aggregation.bin_minutes);

        Ok(Self {
            spike: SpikeDetector::new(config.spike.clone(), engine.clone()),
            pattern: PatternChangeDetector::new(config.pattern.clone(), aggregator.interval()),
            error_rate: ErrorRateDetector::new(config.error_rate.clone(), engine.clone()),
            journey: JourneyRiskAnalyzer::new(&config.journey),
            engine,
            aggregator,
            logger,
            metrics: SentinelMetrics::new(),
            config,
        })
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.engine = self.engine.with_logger(logger.clone());
        self.spike = SpikeDetector::new(self.config.spike.clone(), self.engine.clone());
        self.error_rate = ErrorRateDetector::new(self.config.error_rate.clone(), self.engine.clone());
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Rules from the configured specs with thresholds derived from `events`
    pub fn build_rules(&self, events: &[Event]) -> RuleSet {
        build_rule_set(&self.config.rules, &self.engine, events)
    }

    pub fn run(&self, events: &[Event], ctx: &CycleContext) -> CycleReport {
        let started = Instant::now();

        let Some(latest) = events.iter().map(|e| e.timestamp).max() else {
            return CycleReport::empty(ctx.cycle_id);
        };
        let at = ctx.current_time.unwrap_or(latest);

        let bins = self.aggregator.aggregate(events);
        let streams = group_by_stream(&bins).len();

        let mut anomalies = detect_all(&self.spike, &bins, &self.logger);
        anomalies.extend(detect_all(&self.pattern, &bins, &self.logger));
        anomalies.extend(detect_all(&self.error_rate, &bins, &self.logger));

        let journeys = self.journey.analyze(events);
        let mut flagged = 0;
        for journey in journeys.anomalous() {
            flagged += 1;
            self.logger
                .log_journey_flagged(&journey.request_id, journey.risk, journeys.threshold);
        }
        self.metrics.inc_journeys_flagged(flagged);

        let rule_set = self.build_rules(events);
        let verdicts = rule_set.verdicts(events, at);
        for verdict in verdicts.iter().filter(|v| v.triggered) {
            self.metrics
                .inc_rules_triggered(verdict.rule_id, &verdict.level.to_string());
            self.logger.log_rule_triggered(
                verdict.rule_id,
                &verdict.level.to_string(),
                &verdict.description,
                verdict.observed,
                verdict.threshold,
            );
        }

        let mut combinations = Vec::new();
        let mut combination_errors = Vec::new();
        for spec in &self.config.combinations {
            match rule_set.combine(&spec.rule_ids) {
                Ok(combined) => {
                    let verdict = combined.verdict(events, at);
                    if verdict.triggered {
                        self.logger
                            .log_combined_alert(&verdict.rule_ids, &verdict.description);
                    }
                    combinations.push(verdict);
                }
                Err(e) => combination_errors.push(format!("combination {:?}: {}", spec.rule_ids, e)),
            }
        }

        let report = CycleReport {
            cycle_id: ctx.cycle_id,
            evaluated_at: Some(at),
            events: events.len(),
            streams,
            anomalies,
            journeys,
            rules: verdicts,
            combinations,
            combination_errors,
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.observe_cycle_latency(elapsed);
        self.metrics.add_events_processed(events.len() as u64);
        self.metrics.set_streams_evaluated(streams as i64);
        self.logger.log_cycle_complete(
            ctx.cycle_id,
            report.events,
            report.anomalies.len(),
            report.rules_triggered(),
            elapsed,
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::CombinationSpec;
    use chrono::{Duration, TimeZone};

    fn event(minute: i64, status: u16) -> Event {
        Event {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            request_id: Some(format!("tx-{}", minute / 2)),
            environment: "prod".to_string(),
            endpoint: "/orders".to_string(),
            service: None,
            http_method: "GET".to_string(),
            http_status: status,
            browser: Some("Chrome".to_string()),
            response_time_ms: Some(100.0),
            error_flag: status >= 500,
            cpu_usage_percent: Some(20.0),
            memory_usage_mb: None,
        }
    }

    #[test]
    fn test_empty_batch_gives_empty_report() {
        let evaluator = Evaluator::new(SentinelConfig::default()).unwrap();
        let report = evaluator.run(&[], &CycleContext::new());

        assert_eq!(report.events, 0);
        assert!(report.anomalies.is_empty());
        assert!(report.rules.is_empty());
        assert!(report.evaluated_at.is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = SentinelConfig::default();
        config.aggregation.bin_minutes = 0;
        assert!(Evaluator::new(config).is_err());
    }

    #[test]
    fn test_run_evaluates_rules_at_latest_timestamp() {
        let events: Vec<Event> = (0..120)
            .map(|m| event(m, if m % 4 == 0 { 500 } else { 200 }))
            .collect();
        let evaluator = Evaluator::new(SentinelConfig::default()).unwrap();
        let report = evaluator.run(&events, &CycleContext::new());

        assert_eq!(report.evaluated_at, Some(events[119].timestamp));
        assert_eq!(report.rules.len(), 11);
        assert_eq!(report.streams, 1);

        // Five 500s in every 20 minute window against a threshold of five
        let rule_500 = &report.rules[0];
        assert_eq!(rule_500.threshold, 5.0);
        assert_eq!(rule_500.observed, 5.0);
        assert!(rule_500.triggered);
    }

    #[test]
    fn test_combination_errors_are_collected() {
        let mut config = SentinelConfig::default();
        config.combinations = vec![
            CombinationSpec {
                rule_ids: vec![1, 2],
            },
            CombinationSpec {
                rule_ids: vec![1, 404],
            },
        ];
        let evaluator = Evaluator::new(config).unwrap();
        let events: Vec<Event> = (0..60).map(|m| event(m, 200)).collect();
        let report = evaluator.run(&events, &CycleContext::new());

        assert_eq!(report.combinations.len(), 1);
        assert_eq!(report.combinations[0].rule_ids, vec![1, 2]);
        assert_eq!(report.combination_errors.len(), 1);
        assert!(report.combination_errors[0].contains("at least 2 rules"));
    }

    #[test]
    fn test_context_advance() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ctx = CycleContext::new().with_current_time(at);
        let next = ctx.advance(at);

        assert_eq!(next.cycle_id, 1);
        assert_eq!(next.current_time, None);
        assert_eq!(next.last_fetch_time, Some(at));
    }
}
