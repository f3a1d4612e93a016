// Resolver configuration
//
// ResolverConfig can be:
// - Created directly (or through ResolverConfigBuilder) for embedding and tests
// - Read from the environment via `from_env`

use std::time::Duration;

use anyhow::Context;

use crate::vault::DEFAULT_HANDLE_PREFIX;

/// Environment variable holding the collaborator fetch timeout in milliseconds
pub const FETCH_TIMEOUT_ENV: &str = "RUNBIND_FETCH_TIMEOUT_MS";

/// Environment variable overriding the secret handle prefix
pub const HANDLE_PREFIX_ENV: &str = "RUNBIND_SECRET_HANDLE_PREFIX";

/// Configuration shared by every run context a registry creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upper bound for a single credential or secret fetch (None = no bound)
    pub fetch_timeout: Option<Duration>,

    /// Prefix of every minted secret handle
    pub handle_prefix: String,
}

impl ResolverConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            fetch_timeout: None,
            handle_prefix: DEFAULT_HANDLE_PREFIX.to_string(),
        }
    }

    /// Read the configuration from environment variables
    ///
    /// - RUNBIND_FETCH_TIMEOUT_MS: fetch timeout in milliseconds (optional)
    /// - RUNBIND_SECRET_HANDLE_PREFIX: handle prefix (optional)
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new();

        if let Ok(raw) = std::env::var(FETCH_TIMEOUT_ENV) {
            config.fetch_timeout = Some(parse_fetch_timeout(&raw)?);
        }

        if let Ok(prefix) = std::env::var(HANDLE_PREFIX_ENV) {
            if prefix.is_empty() {
                anyhow::bail!("{HANDLE_PREFIX_ENV} must not be empty");
            }
            config.handle_prefix = prefix;
        }

        Ok(config)
    }

    /// Set the fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Set the handle prefix
    pub fn with_handle_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.handle_prefix = prefix.into();
        self
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a non-zero fetch timeout in milliseconds
fn parse_fetch_timeout(raw: &str) -> anyhow::Result<Duration> {
    let millis: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{FETCH_TIMEOUT_ENV} must be an integer, got {raw:?}"))?;
    if millis == 0 {
        anyhow::bail!("{FETCH_TIMEOUT_ENV} must be greater than zero");
    }
    Ok(Duration::from_millis(millis))
}

/// Builder for ResolverConfig with fluent API
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    /// Start building a new configuration
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
        }
    }

    /// Set the fetch timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = Some(timeout);
        self
    }

    /// Set the handle prefix
    pub fn handle_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.handle_prefix = prefix.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> ResolverConfig {
        self.config
    }
}

impl Default for ResolverConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
