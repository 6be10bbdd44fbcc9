//! Threshold rules over rolling windows of raw events
//!
//! - `rule`: single rules, AND-combinations, and the per-cycle rule set
//! - `catalog`: data-driven rule specs and the stock catalog

mod catalog;
mod rule;

pub use catalog::{default_rule_specs, CombinationSpec, RuleSpec};
pub use rule::{CombinedRule, CombinedVerdict, Rule, RuleOutcome, RuleSet, RuleVerdict, Severity};

use crate::models::Event;
use crate::threshold::HybridThresholdEngine;

/// Build every spec against the current batch
pub fn build_rule_set(specs: &[RuleSpec], engine: &HybridThresholdEngine, events: &[Event]) -> RuleSet {
    RuleSet::new(specs.iter().map(|spec| spec.build(engine, events)).collect())
}
