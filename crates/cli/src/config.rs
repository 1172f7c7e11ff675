use anyhow::{Context, Result};
use fixpool_core::SchedulerConfig;
use tracing::debug;

use crate::cli::CliArgs;

/// Resolve the scheduler config.
/// Priority: CLI flags > `FIXPOOL_*` env vars > config file > defaults.
pub fn resolve(args: &CliArgs) -> Result<SchedulerConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => {
            debug!(path, "loading scheduler config");
            SchedulerConfig::from_file(path)
                .with_context(|| format!("failed to load config: {path}"))?
        }
        None => SchedulerConfig::from_env().context("invalid FIXPOOL_* environment")?,
    };

    if let Some(n) = args.max_concurrency {
        anyhow::ensure!(n > 0, "--max-concurrency must be at least 1");
        config.max_concurrency = n;
    }
    Ok(config)
}
