//! Sentinel configuration
//!
//! Every section is defaulted so an empty file (or no file) yields the
//! stock behaviour. Values are checked by [`SentinelConfig::validate`]
//! before an evaluator is built from them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::aggregate::DEFAULT_BIN_MINUTES;
use crate::anomaly::{ErrorRateMode, PatternConfig, SlopeThreshold, SpikeMode};
use crate::error::ConfigError;
use crate::journey::JourneyConfig;
use crate::rules::{default_rule_specs, CombinationSpec, RuleSpec};
use crate::threshold::ThresholdConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Bin width for the aggregated table in minutes
    pub bin_minutes: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            bin_minutes: DEFAULT_BIN_MINUTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub aggregation: AggregationConfig,
    pub threshold: ThresholdConfig,
    pub spike: SpikeMode,
    pub pattern: PatternConfig,
    pub error_rate: ErrorRateMode,
    pub journey: JourneyConfig,
    pub rules: Vec<RuleSpec>,
    pub combinations: Vec<CombinationSpec>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationConfig::default(),
            threshold: ThresholdConfig::default(),
            spike: SpikeMode::default(),
            pattern: PatternConfig::default(),
            error_rate: ErrorRateMode::default(),
            journey: JourneyConfig::default(),
            rules: default_rule_specs(),
            combinations: Vec::new(),
        }
    }
}

fn check_quantile(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::QuantileOutOfRange {
            field: field.to_string(),
            value,
        })
    }
}

fn check_nonzero(field: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroLength {
            field: field.to_string(),
        });
    }
    Ok(())
}

impl SentinelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nonzero("aggregation.bin_minutes", self.aggregation.bin_minutes)?;
        check_nonzero("threshold.step_minutes", self.threshold.step_minutes)?;

        let baseline = self.threshold.baseline_percentile;
        if !(baseline > 0.0 && baseline < 100.0) {
            return Err(ConfigError::QuantileOutOfRange {
                field: "threshold.baseline_percentile".to_string(),
                value: baseline / 100.0,
            });
        }
        if self.threshold.min_exceedances < 2 {
            return Err(ConfigError::TooSmall {
                field: "threshold.min_exceedances".to_string(),
                min: 2,
            });
        }

        match &self.spike {
            SpikeMode::Dynamic {
                window_minutes,
                quantile,
            } => {
                check_nonzero("spike.window_minutes", *window_minutes)?;
                check_quantile("spike.quantile", *quantile)?;
            }
            SpikeMode::StdDev { .. } => {}
        }

        // A regression p-value needs at least three points
        if self.pattern.min_intervals < 3 {
            return Err(ConfigError::TooSmall {
                field: "pattern.min_intervals".to_string(),
                min: 3,
            });
        }
        check_quantile("pattern.significance", self.pattern.significance)?;
        if let SlopeThreshold::Dynamic { quantile } = self.pattern.threshold {
            check_quantile("pattern.threshold.quantile", quantile)?;
        }

        match &self.error_rate {
            ErrorRateMode::Hybrid {
                window_minutes,
                quantile,
            } => {
                check_nonzero("error_rate.window_minutes", *window_minutes)?;
                check_quantile("error_rate.quantile", *quantile)?;
            }
            ErrorRateMode::Percentile { quantile } => {
                check_quantile("error_rate.quantile", *quantile)?;
            }
            ErrorRateMode::Fixed { .. } => {}
        }

        check_quantile("journey.quantile", self.journey.quantile)?;

        let mut seen = HashSet::new();
        for spec in &self.rules {
            if !seen.insert(spec.id) {
                return Err(ConfigError::DuplicateRuleId(spec.id));
            }
            check_nonzero(&format!("rules[{}].window_minutes", spec.id), spec.window_minutes)?;
            check_quantile(&format!("rules[{}].quantile", spec.id), spec.quantile)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SentinelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rules.len(), 11);
        assert_eq!(config.aggregation.bin_minutes, 15);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let json = r#"{
            "spike": {"mode": "std_dev", "multiplier": 3.0},
            "pattern": {"threshold": {"mode": "dynamic"}},
            "combinations": [{"rule_ids": [1, 3]}]
        }"#;
        let config: SentinelConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.spike, SpikeMode::StdDev { multiplier: 3.0 });
        assert_eq!(config.pattern.min_intervals, 6);
        assert_eq!(
            config.pattern.threshold,
            SlopeThreshold::Dynamic { quantile: 0.99 }
        );
        assert_eq!(config.error_rate, ErrorRateMode::default());
        assert_eq!(config.rules.len(), 11);
        assert_eq!(config.combinations[0].rule_ids, vec![1, 3]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quantile_out_of_range_is_rejected() {
        let mut config = SentinelConfig::default();
        config.journey.quantile = 1.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::QuantileOutOfRange {
                field: "journey.quantile".to_string(),
                value: 1.0
            })
        );
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let mut config = SentinelConfig::default();
        config.rules[2].window_minutes = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroLength {
                field: "rules[3].window_minutes".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_rule_id_is_rejected() {
        let mut config = SentinelConfig::default();
        let duplicate = config.rules[0].clone();
        config.rules.push(duplicate);
        assert_eq!(config.validate(), Err(ConfigError::DuplicateRuleId(1)));
    }
}
