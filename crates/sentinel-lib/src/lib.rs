//! Telemetry sentinel library
//!
//! This crate provides the core functionality for:
//! - Adaptive thresholds (regime split plus extreme value tail fit)
//! - Spike, pattern change, and error rate detection per stream
//! - Transaction journey risk scoring
//! - Windowed rules and AND-combined rules
//! - Observability (Prometheus metrics, structured logging)

pub mod aggregate;
pub mod anomaly;
pub mod condition;
pub mod config;
pub mod cycle;
pub mod error;
pub mod journey;
pub mod models;
pub mod observability;
pub mod rules;
pub mod stats;
pub mod threshold;

pub use config::SentinelConfig;
pub use cycle::{CycleContext, CycleReport, Evaluator};
pub use error::{ConfigError, RuleError, ThresholdError};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
