//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use sentinel_lib::rules::{RuleSet, RuleVerdict, Severity};
use sentinel_lib::{AnomalyRecord, CycleReport};
use tabled::{settings::Style, Table, Tabled};

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Structured JSON (default)
    #[default]
    Json,
    /// Human-readable
    Pretty,
}

#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Stream")]
    stream: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "p-value")]
    p_value: String,
}

impl From<&AnomalyRecord> for AnomalyRow {
    fn from(record: &AnomalyRecord) -> Self {
        Self {
            stream: record.stream.to_string(),
            time: record.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            kind: record.kind.to_string(),
            observed: format!("{:.2}", record.observed),
            threshold: format!("{:.2}", record.threshold),
            p_value: record
                .p_value
                .map(|p| format!("{:.4}", p))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&RuleVerdict> for RuleRow {
    fn from(verdict: &RuleVerdict) -> Self {
        Self {
            id: verdict.rule_id,
            level: color_level(verdict.level),
            status: if verdict.triggered {
                "TRIGGERED".red().bold().to_string()
            } else {
                "Not triggered".green().to_string()
            },
            observed: format!("{}", verdict.observed),
            threshold: format!("{}", verdict.threshold),
            description: verdict.description.clone(),
        }
    }
}

#[derive(Tabled)]
struct JourneyRow {
    #[tabled(rename = "Transaction")]
    request_id: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Requests")]
    requests: u64,
    #[tabled(rename = "Errors")]
    errors: u64,
    #[tabled(rename = "Environments")]
    environments: String,
    #[tabled(rename = "Risk")]
    risk: String,
}

/// Print a full cycle report
pub fn print_report(report: &CycleReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            println!(
                "{} cycle {} | {} events | {} streams",
                "Sentinel".bold(),
                report.cycle_id,
                report.events,
                report.streams
            );
            if let Some(at) = report.evaluated_at {
                println!("Evaluated at:           {}", at.to_rfc3339().cyan());
            }
            println!();

            println!("{}", "Anomalies".bold());
            if report.anomalies.is_empty() {
                print_success("No anomalies detected");
            } else {
                let rows: Vec<AnomalyRow> = report.anomalies.iter().map(AnomalyRow::from).collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
            println!();

            println!(
                "{} (risk threshold {:.2})",
                "High-risk journeys".bold(),
                report.journeys.threshold
            );
            let rows: Vec<JourneyRow> = report
                .journeys
                .anomalous()
                .map(|j| JourneyRow {
                    request_id: j.request_id.clone(),
                    start: j.journey_start.format("%Y-%m-%d %H:%M:%S").to_string(),
                    requests: j.total_requests,
                    errors: j.total_errors,
                    environments: j.environments.join(", "),
                    risk: format!("{:.2}", j.risk),
                })
                .collect();
            if rows.is_empty() {
                print_success("No high-risk journeys");
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
            println!();

            println!("{}", "Rule evaluation".bold());
            if report.rules.is_empty() {
                print_info("No rules evaluated");
            } else {
                let rows: Vec<RuleRow> = report.rules.iter().map(RuleRow::from).collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
            }

            for combined in &report.combinations {
                let observed: Vec<String> = combined.observed.iter().map(|v| v.to_string()).collect();
                let line = format!("{} | Observed: [{}]", combined.description, observed.join(", "));
                if combined.triggered {
                    print_warning(&format!("TRIGGERED {}", line));
                } else {
                    print_info(&format!("Not triggered {}", line));
                }
            }
            for error in &report.combination_errors {
                print_error(error);
            }
        }
    }
    Ok(())
}

/// Print the rule catalog as built against a batch
pub fn print_rules(rules: &RuleSet, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rules)?),
        OutputFormat::Table => {
            println!("{}", "Defined Rules".bold());
            println!("{}", "=".repeat(50));
            for rule in rules.iter() {
                println!("{}", rule);
            }
        }
    }
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

fn color_level(level: Severity) -> String {
    match level {
        Severity::Warning => level.to_string().yellow().to_string(),
        Severity::Critical => level.to_string().red().to_string(),
    }
}
