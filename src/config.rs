use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::location::Location;

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "fleet-dispatch.toml";
/// Prefix of environment overrides, e.g. `FLEET_DISPATCH_AGENTS__COUNT=5`
pub const ENV_PREFIX: &str = "FLEET_DISPATCH";

/// Main configuration structure for the fleet dispatcher
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Fleet composition
    pub agents: AgentsConfig,
    /// Movement and submission timing
    pub dispatch: DispatchConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Number of agents in the pool
    pub count: usize,
    /// One rank per agent, lower wins ties; empty means pool order
    pub priorities: Vec<i64>,
    /// One start position per agent; empty means everyone starts at the origin
    pub start_positions: Vec<Location>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            count: 3,
            priorities: Vec::new(),
            start_positions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pause after every unit step
    pub step_delay_ms: u64,
    /// Give up on a submission when no agent frees up in time
    pub submit_timeout_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 1000,
            submit_timeout_ms: None,
        }
    }
}

impl DispatchConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn submit_timeout(&self) -> Option<Duration> {
        self.submit_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive
    pub log_level: String,
    /// Emit JSON log lines instead of compact text
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl FleetConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `fleet-dispatch.toml` in the working directory
    /// 3. Environment variables (prefixed with FLEET_DISPATCH_)
    pub fn load() -> Result<Self> {
        let default_file = Path::new(DEFAULT_CONFIG_FILE);
        Self::load_with(default_file.exists().then_some(default_file))
    }

    /// Same precedence as [`FleetConfig::load`], reading `path` instead of the
    /// default file. An explicit path must exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("configuration file {} not found", path.display());
        }
        Self::load_with(Some(path))
    }

    fn load_with(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("agents.priorities")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to read fleet configuration")?;
        let fleet_config: FleetConfig = config
            .try_deserialize()
            .context("invalid fleet configuration")?;
        Ok(fleet_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize fleet configuration")
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv().context("failed to load .env file")?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
