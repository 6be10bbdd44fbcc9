//! Rule specifications and the stock rule catalog
//!
//! A spec carries everything about a rule except its threshold, which is
//! recomputed from the current batch every time the spec is built.

use serde::{Deserialize, Serialize};

use super::rule::{Rule, Severity};
use crate::condition::{Condition, NumericField, Predicate};
use crate::models::Event;
use crate::threshold::{HybridThresholdEngine, Precision, Strategy};

/// Configured rule whose threshold is derived from the data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: u32,
    /// Short name, prefixed to the generated description
    pub name: String,
    pub window_minutes: u32,
    pub condition: Condition,
    pub quantile: f64,
    pub level: Severity,
}

impl RuleSpec {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        window_minutes: u32,
        condition: Condition,
        quantile: f64,
        level: Severity,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            window_minutes,
            condition,
            quantile,
            level,
        }
    }

    /// Build a rule with a threshold derived from `events`
    pub fn build(&self, engine: &HybridThresholdEngine, events: &[Event]) -> Rule {
        let threshold = match &self.condition {
            Condition::Count { .. } => {
                engine.threshold_for_count(events, self.window_minutes, &self.condition, self.quantile) as f64
            }
            Condition::Average { .. } => {
                engine.threshold_for_average(events, self.window_minutes, &self.condition, self.quantile)
            }
            Condition::Rate { .. } => {
                engine
                    .compute(
                        events,
                        self.window_minutes,
                        &self.condition,
                        self.quantile,
                        Strategy::Hybrid,
                        Precision::Hundredths,
                    )
                    .value
            }
        };

        Rule::new(
            self.id,
            self.describe(threshold),
            self.window_minutes,
            self.condition.clone(),
            threshold,
            self.level,
        )
    }

    fn describe(&self, threshold: f64) -> String {
        let test = match &self.condition {
            Condition::Count { .. } => format!("count >= {}", threshold),
            Condition::Average { field } => {
                format!("average {} >= {}{}", field.label(), threshold, field.unit())
            }
            Condition::Rate { .. } => format!("rate >= {}", threshold),
        };
        format!(
            "{} - {}: if {} in {} minutes",
            self.name,
            self.level.label(),
            test,
            self.window_minutes
        )
    }
}

/// Rule ids to AND together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationSpec {
    pub rule_ids: Vec<u32>,
}

/// Stock rule catalog
pub fn default_rule_specs() -> Vec<RuleSpec> {
    use Severity::{Critical, Warning};

    let client_and_server = || Condition::Count {
        predicate: Predicate::StatusRange { low: 400, high: 599 },
    };
    let post_from_safari = Condition::Count {
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
    let unknown_browser = Condition::Count {
        predicate: Predicate::BrowserIs {
            browser: "UNKNOWN".to_string(),
        },
    };

    vec![
        RuleSpec::new(1, "Internal Server Errors (500)", 20, Condition::count_status(500), 0.99, Warning),
        RuleSpec::new(2, "Internal Server Errors (500)", 20, Condition::count_status(500), 0.995, Critical),
        RuleSpec::new(3, "404 Not Found", 20, Condition::count_status(404), 0.99, Warning),
        RuleSpec::new(4, "404 Not Found", 20, Condition::count_status(404), 0.995, Critical),
        RuleSpec::new(5, "403 Forbidden", 20, Condition::count_status(403), 0.99, Warning),
        RuleSpec::new(6, "403 Forbidden", 20, Condition::count_status(403), 0.995, Critical),
        RuleSpec::new(7, "Combined 4xx & 5xx Errors", 20, client_and_server(), 0.99, Warning),
        RuleSpec::new(8, "Combined 4xx & 5xx Errors", 20, client_and_server(), 0.995, Critical),
        RuleSpec::new(9, "POST Requests from Safari", 15, post_from_safari, 0.99, Warning),
        RuleSpec::new(10, "Requests from UNKNOWN Browsers", 30, unknown_browser, 0.99, Warning),
        RuleSpec::new(
            11,
            "High CPU Usage",
            10,
            Condition::average(NumericField::CpuUsagePercent),
            0.99,
            Warning,
        ),
    ]
}
