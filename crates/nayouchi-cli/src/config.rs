//! Nayouchi CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Default values
//! - `nayouchi.toml` in the working directory
//! - `~/.nayouchi/config.toml`
//! - Environment variables (`NAYOUCHI_*`, nested keys separated by `__`)
//!
//! Command line flags are applied on top by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use nayouchi_core::{ParticipantId, SessionConfig, TransportConfig};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the Nayouchi CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliAppConfig {
    /// Web front of the backend, used to render invitation links
    pub server: ServerConfig,

    /// Event-bus connection settings
    pub transport: TransportConfig,

    /// Session engine settings
    pub session: SessionConfig,

    /// Who this client acts as
    pub identity: IdentityConfig,

    /// Terminal behaviour
    pub cli: CliConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL invitation links are built from
    pub web_url: String,

    /// How long to wait for the first connection (in seconds)
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Participant id or invitation link; the stored identity is used when unset
    pub participant: Option<String>,

    /// Path to the identity file (defaults to ~/.nayouchi/identity.json)
    pub identity_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Enable verbose logging output
    pub verbose: bool,

    /// Prompt shown by the interactive session
    pub prompt: String,

    /// Show per-member nomination counts in group views
    pub show_stats: bool,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            web_url: "http://localhost:8080".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            prompt: "nayouchi> ".to_string(),
            show_stats: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    /// Load configuration with the standard priority order
    pub fn load() -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("nayouchi.toml"))
            .merge(Toml::file(Self::default_config_path()?))
            .merge(Env::prefixed("NAYOUCHI_").split("__"));

        let config: CliAppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, still honouring the environment
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("NAYOUCHI_").split("__"));

        let config: CliAppConfig = figment.extract().map_err(|e| {
            ConfigError::Loading(format!("Failed to load from {}: {}", path.as_ref().display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Directory holding the config and identity files
    pub fn default_state_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".nayouchi"))
            .ok_or_else(|| ConfigError::Environment("Cannot determine home directory".to_string()))
    }

    fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::default_state_dir()?.join("config.toml"))
    }

    /// Where the identity file lives, honouring an explicit data directory
    pub fn identity_path(&self, data_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = data_dir {
            return Ok(dir.join("identity.json"));
        }
        match &self.identity.identity_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::default_state_dir()?.join("identity.json")),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connect_timeout_secs)
    }

    /// Configured participant, accepting either a bare id or an invitation link
    pub fn participant(&self) -> Result<Option<ParticipantId>, ConfigError> {
        self.identity
            .participant
            .as_deref()
            .map(parse_participant)
            .transpose()
    }

    /// Invitation link for `participant`, the form `from_invite_link` reads back
    pub fn invite_link(&self, participant: &ParticipantId) -> String {
        format!(
            "{}/{}/{}",
            self.server.web_url.trim_end_matches('/'),
            ParticipantId::LINK_SEGMENT,
            participant
        )
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_file(Self::default_config_path()?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::FileSystem(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), toml_string)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        self.session
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if !(self.server.web_url.starts_with("http://") || self.server.web_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "Web URL must be http(s): {}",
                self.server.web_url
            )));
        }

        if self.server.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        self.participant()?;
        Ok(())
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example_config = CliAppConfig {
            identity: IdentityConfig {
                participant: Some("https://names.example.org/usr/4fa9c0".to_string()),
                identity_file: None,
            },
            server: ServerConfig {
                web_url: "https://names.example.org".to_string(),
                connect_timeout_secs: 10,
            },
            transport: TransportConfig::default().with_url("wss://names.example.org/eventbus"),
            ..Default::default()
        };

        toml::to_string_pretty(&example_config)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

/// Accept a bare participant id or an invitation link
pub fn parse_participant(value: &str) -> Result<ParticipantId, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Validation("Participant id is empty".to_string()));
    }
    if value.contains("://") {
        ParticipantId::from_invite_link(value).map_err(|e| ConfigError::Validation(e.to_string()))
    } else if value.contains('/') {
        Err(ConfigError::Validation(format!("Invalid participant id: {}", value)))
    } else {
        Ok(ParticipantId::new(value))
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
