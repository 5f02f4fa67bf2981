//! Settings loading and validation

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "BRIDGE";

/// File consulted when no explicit path is given
pub const DEFAULT_CONFIG_PATH: &str = "config/bridge.toml";

/// Messenger defaults
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Default maximum age of a cached response in milliseconds.
    /// Zero makes every request go to the channel.
    pub stale_time_ms: u64,

    /// Suffix appended to a request type to form its reply type
    pub reply_suffix: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            stale_time_ms: 0,
            reply_suffix: "Response".to_string(),
        }
    }
}

impl BridgeSettings {
    /// Load settings from defaults, an optional TOML file and the environment.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };
        debug!(path = %file.display(), required, "Loading bridge settings");

        let config = Self::defaults()?
            .add_source(File::from(file).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build bridge configuration")?;

        let settings: Self = config
            .try_deserialize()
            .context("Failed to deserialize bridge configuration")?;
        settings.validate()?;

        info!(
            stale_time_ms = settings.stale_time_ms,
            reply_suffix = %settings.reply_suffix,
            "Loaded bridge settings"
        );
        Ok(settings)
    }

    /// Parse settings from TOML text layered over the defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Self = Self::defaults()?
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .context("Failed to parse bridge configuration")?
            .try_deserialize()
            .context("Failed to deserialize bridge configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Render the settings as a TOML document
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize bridge configuration")
    }

    /// Reject settings no messenger could work with
    pub fn validate(&self) -> Result<()> {
        if self.reply_suffix.is_empty() {
            bail!("reply_suffix must not be empty");
        }
        if self.reply_suffix.chars().any(char::is_whitespace) {
            bail!("reply_suffix must not contain whitespace: {:?}", self.reply_suffix);
        }
        Ok(())
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    fn defaults() -> Result<config_crate::ConfigBuilder<config_crate::builder::DefaultState>> {
        let defaults = Self::default();
        Config::builder()
            .set_default("stale_time_ms", defaults.stale_time_ms)?
            .set_default("reply_suffix", defaults.reply_suffix)
            .context("Failed to seed bridge configuration defaults")
    }
}

/// Convenience function to load settings from the default locations
pub fn load_settings() -> Result<BridgeSettings> {
    BridgeSettings::load(None)
}
