//! Configuration management
//!
//! Loads server and client settings from `config.toml` with environment
//! overrides, e.g. `SOCKET_ASYNC__SERVER__PORT=9000`.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::client::ClientConfig;
use crate::server::ServerConfig;

const ENV_PREFIX: &str = "SOCKET_ASYNC";

/// Complete configuration for the server and client endpoints
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl AppConfig {
    /// Load configuration from `path` (extension optional, file may be
    /// absent) with environment overrides
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::finish(settings)
    }

    /// Load configuration from TOML text
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::finish(settings)
    }

    fn finish(settings: Config) -> Result<Self, ConfigError> {
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate().map_err(ConfigError::Message)?;
        self.client.validate().map_err(ConfigError::Message)?;
        Ok(())
    }
}
