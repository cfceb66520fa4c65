use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the contribution workflow tooling
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ContribConfig {
    /// Workflow engine settings
    pub workflow: WorkflowSettings,
    /// Version control settings
    pub vcs: VcsSettings,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Hosting service key used when none is given on the command line
    pub default_hosting_service: String,
    /// Capacity of the broadcast channel carrying workflow events
    pub event_channel_capacity: usize,
    /// How long a command waits for a running chain to settle
    pub settle_timeout_seconds: u64,
    /// Branch contributions target when the project does not say otherwise
    pub default_contribute_to_branch: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VcsSettings {
    /// Remote whose URL identifies the origin repository
    pub remote_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter, overridden by RUST_LOG
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_hosting_service: "local".to_string(),
            event_channel_capacity: crate::workflow::DEFAULT_EVENT_CHANNEL_CAPACITY,
            settle_timeout_seconds: 30,
            default_contribute_to_branch: "main".to_string(),
        }
    }
}

impl Default for VcsSettings {
    fn default() -> Self {
        Self {
            remote_name: "origin".to_string(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ContribConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (contrib.toml, .contrib-rc)
    /// 3. Environment variables (prefixed with CONTRIB_, sections split by `__`)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("contrib.toml").exists() {
            builder = builder.add_source(File::with_name("contrib"));
        }

        if Path::new(".contrib-rc").exists() {
            builder = builder.add_source(
                File::with_name(".contrib-rc").format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("CONTRIB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to read configuration sources")?;
        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ContribConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ContribConfig::load_env_file();
        ContribConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ContribConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e:#}"))
}
