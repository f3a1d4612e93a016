// Runner configuration
// Decision: Configuration is read from environment variables (a .env file is
// loaded by the binary first); every value has a default.

use std::time::Duration;

use anyhow::{Context, Result};
use runbind_core::ResolverConfig;

/// Maximum age of a run context before the sweeper discards it
pub const MAX_RUN_AGE_ENV: &str = "RUNBIND_MAX_RUN_AGE_SECS";

/// Interval between sweeps of expired run contexts
pub const SWEEP_INTERVAL_ENV: &str = "RUNBIND_SWEEP_INTERVAL_SECS";

const DEFAULT_MAX_RUN_AGE: Duration = Duration::from_secs(6 * 60 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the workflow runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Resolver settings passed to the run context registry
    pub resolver: ResolverConfig,
    /// Contexts older than this are discarded by the sweeper
    pub max_run_age: Duration,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            max_run_age: DEFAULT_MAX_RUN_AGE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl RunnerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            resolver: ResolverConfig::from_env()?,
            max_run_age: secs_from_env(MAX_RUN_AGE_ENV)?.unwrap_or(DEFAULT_MAX_RUN_AGE),
            sweep_interval: secs_from_env(SWEEP_INTERVAL_ENV)?.unwrap_or(DEFAULT_SWEEP_INTERVAL),
        })
    }
}

fn secs_from_env(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{name} must be a number of seconds, got {raw:?}"))?;
            if secs == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_config_defaults() {
        let config = RunnerConfig::default();

        assert_eq!(config.max_run_age, Duration::from_secs(21600));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.resolver, ResolverConfig::default());
    }

    #[test]
    fn test_secs_from_env_unset() {
        assert_eq!(secs_from_env("RUNBIND_TEST_UNSET_SECS").unwrap(), None);
    }
}
