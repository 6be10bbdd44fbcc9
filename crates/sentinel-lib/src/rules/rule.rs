//! Windowed rules and their AND-combination

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::{Condition, WindowMetric};
use crate::error::RuleError;
use crate::models::Event;

/// Alert severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    /// Capitalised form used in rule descriptions
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Warning => "Warning",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Result of evaluating one rule at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub triggered: bool,
    pub observed: f64,
}

/// Rule outcome with the rule's identity attached, for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleVerdict {
    pub rule_id: u32,
    pub description: String,
    pub level: Severity,
    pub window_minutes: u32,
    pub observed: f64,
    pub threshold: f64,
    pub triggered: bool,
}

/// Condition evaluated over a trailing window against a fixed threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: u32,
    pub description: String,
    pub window_minutes: u32,
    pub condition: Condition,
    pub threshold: f64,
    pub level: Severity,
}

impl Rule {
    pub fn new(
        id: u32,
        description: impl Into<String>,
        window_minutes: u32,
        condition: Condition,
        threshold: f64,
        level: Severity,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            window_minutes,
            condition,
            threshold,
            level,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::minutes(i64::from(self.window_minutes))
    }

    /// Evaluate over events with `at - window < timestamp <= at`
    pub fn evaluate(&self, events: &[Event], at: DateTime<Utc>) -> RuleOutcome {
        let start = at - self.window();
        let window: Vec<&Event> = events
            .iter()
            .filter(|e| e.timestamp > start && e.timestamp <= at)
            .collect();

        let observed = self.condition.measure(&window);
        RuleOutcome {
            triggered: observed >= self.threshold,
            observed,
        }
    }

    pub fn verdict(&self, events: &[Event], at: DateTime<Utc>) -> RuleVerdict {
        let outcome = self.evaluate(events, at);
        RuleVerdict {
            rule_id: self.id,
            description: self.description.clone(),
            level: self.level,
            window_minutes: self.window_minutes,
            observed: outcome.observed,
            threshold: self.threshold,
            triggered: outcome.triggered,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rule {} ({}): {} | Window: {} min | Threshold: {}",
            self.id,
            self.level.label(),
            self.description,
            self.window_minutes,
            self.threshold
        )
    }
}

/// Outcome of a combined rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedVerdict {
    pub rule_ids: Vec<u32>,
    pub description: String,
    pub triggered: bool,
    /// Observed value of each member, in member order
    pub observed: Vec<f64>,
}

/// Two or more rules that alert only when all of them trigger
#[derive(Debug, Clone)]
pub struct CombinedRule<'r> {
    rules: Vec<&'r Rule>,
}

impl<'r> CombinedRule<'r> {
    pub fn new(rules: Vec<&'r Rule>) -> Result<Self, RuleError> {
        if rules.len() < 2 {
            return Err(RuleError::MalformedRuleCombination {
                selected: rules.len(),
            });
        }
        Ok(Self { rules })
    }

    pub fn rule_ids(&self) -> Vec<u32> {
        self.rules.iter().map(|r| r.id).collect()
    }

    pub fn description(&self) -> String {
        let ids: Vec<String> = self.rules.iter().map(|r| r.id.to_string()).collect();
        format!(
            "Combined Rule ({}): Alert if all selected rules are triggered in their respective time windows.",
            ids.join(" AND ")
        )
    }

    /// Every member evaluated at `at`, each over its own window
    pub fn evaluate(&self, events: &[Event], at: DateTime<Utc>) -> (bool, Vec<f64>) {
        let outcomes: Vec<RuleOutcome> = self.rules.iter().map(|r| r.evaluate(events, at)).collect();
        let triggered = outcomes.iter().all(|o| o.triggered);
        (triggered, outcomes.into_iter().map(|o| o.observed).collect())
    }

    pub fn verdict(&self, events: &[Event], at: DateTime<Utc>) -> CombinedVerdict {
        let (triggered, observed) = self.evaluate(events, at);
        CombinedVerdict {
            rule_ids: self.rule_ids(),
            description: self.description(),
            triggered,
            observed,
        }
    }
}

impl fmt::Display for CombinedRule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// The active rules of one evaluation cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn rule(&self, id: u32) -> Result<&Rule, RuleError> {
        self.rules
            .iter()
            .find(|r| r.id == id)
            .ok_or(RuleError::UnknownRule(id))
    }

    /// Combine the rules with the given ids; unknown ids are ignored
    pub fn combine(&self, ids: &[u32]) -> Result<CombinedRule<'_>, RuleError> {
        let selected: Vec<&Rule> = self.rules.iter().filter(|r| ids.contains(&r.id)).collect();
        CombinedRule::new(selected)
    }

    pub fn verdicts(&self, events: &[Event], at: DateTime<Utc>) -> Vec<RuleVerdict> {
        self.rules.iter().map(|r| r.verdict(events, at)).collect()
    }
}
