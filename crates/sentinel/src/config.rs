//! Sentinel configuration loading

use std::path::Path;

use anyhow::{Context, Result};
use sentinel_lib::SentinelConfig;

/// Environment variable prefix; nested keys are separated by `__`
/// (for example `SENTINEL__JOURNEY__QUANTILE=0.95`)
const ENV_PREFIX: &str = "SENTINEL";

/// Load configuration from an optional file plus the environment, then validate
pub fn load(path: Option<&Path>) -> Result<SentinelConfig> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read configuration")?;

    let config: SentinelConfig = settings
        .try_deserialize()
        .context("invalid configuration structure")?;

    config.validate().context("invalid configuration value")?;
    Ok(config)
}
