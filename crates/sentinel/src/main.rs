//! Sentinel - Telemetry anomaly and alert rule evaluator
//!
//! Reads a batch of request events, runs the detectors, journey analysis,
//! and rule catalog over it, and reports what fired.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sentinel_lib::rules::CombinationSpec;
use sentinel_lib::{CycleContext, Evaluator, SentinelMetrics, StructuredLogger};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod input;
mod output;

use output::{LogFormat, OutputFormat};

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author, version, about = "Telemetry anomaly and alert rule evaluator", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML, or JSON)
    #[arg(long, short, global = true, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    format: OutputFormat,

    /// Log line format (logs go to stderr)
    #[arg(long, global = true, default_value = "json")]
    log_format: LogFormat,

    /// Write Prometheus metrics in text format to this file after each cycle
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one batch of events
    Evaluate {
        /// Events file (JSON array or JSON lines)
        input: PathBuf,

        /// Evaluate rules at this instant instead of the latest event (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// AND-combine rules, e.g. `--combine 1,3` (repeatable)
        #[arg(long)]
        combine: Vec<String>,
    },

    /// Re-evaluate an events file on a fixed interval until interrupted
    Watch {
        /// Events file (JSON array or JSON lines)
        input: PathBuf,

        /// Seconds between cycles
        #[arg(long, default_value = "60")]
        interval_secs: u64,
    },

    /// Show the rule catalog with thresholds derived from a batch
    Rules {
        /// Events file (JSON array or JSON lines)
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = config::load(cli.config.as_deref())?;

    let logger = StructuredLogger::new("sentinel");
    let metrics = SentinelMetrics::new();

    match cli.command {
        Commands::Evaluate { input, at, combine } => {
            for raw in &combine {
                config.combinations.push(parse_combination(raw)?);
            }
            let evaluator = Evaluator::new(config)?.with_logger(logger.clone());
            logger.log_startup(SENTINEL_VERSION, evaluator.config().rules.len());

            let events = input::load_events(&input)?;
            let mut ctx = CycleContext::new();
            if let Some(at) = at {
                ctx = ctx.with_current_time(at);
            }

            let report = evaluator.run(&events, &ctx);
            output::print_report(&report, cli.format)?;
            write_metrics(&metrics, cli.metrics_out.as_deref())?;
        }
        Commands::Watch {
            input,
            interval_secs,
        } => {
            if interval_secs == 0 {
                bail!("--interval-secs must be at least 1");
            }
            let evaluator = Evaluator::new(config)?.with_logger(logger.clone());
            logger.log_startup(SENTINEL_VERSION, evaluator.config().rules.len());
            info!(input = %input.display(), interval_secs, "Watching events file");

            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            let mut ctx = CycleContext::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match input::load_events(&input) {
                            Ok(events) => {
                                let report = evaluator.run(&events, &ctx);
                                output::print_report(&report, cli.format)?;
                                if let Err(e) = write_metrics(&metrics, cli.metrics_out.as_deref()) {
                                    warn!(error = %e, "Failed to write metrics");
                                }
                            }
                            Err(e) => warn!(error = %format!("{:#}", e), "Skipping cycle"),
                        }
                        ctx = ctx.advance(Utc::now());
                    }
                    _ = tokio::signal::ctrl_c() => {
                        logger.log_shutdown("SIGINT received");
                        info!("Shutting down");
                        break;
                    }
                }
            }
        }
        Commands::Rules { input } => {
            let evaluator = Evaluator::new(config)?.with_logger(logger.clone());
            let events = input::load_events(&input)?;
            let rules = evaluator.build_rules(&events);
            output::print_rules(&rules, cli.format)?;
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }
}

/// Parse a comma-separated list of rule ids such as `1,3`
fn parse_combination(raw: &str) -> Result<CombinationSpec> {
    let rule_ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .with_context(|| format!("invalid rule id '{}' in --combine", s))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CombinationSpec { rule_ids })
}

fn write_metrics(metrics: &SentinelMetrics, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let text = metrics.render().context("failed to encode metrics")?;
    std::fs::write(path, text)
        .with_context(|| format!("failed to write metrics to {}", path.display()))
}
