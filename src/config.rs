//! Configuration loading and management
//!
//! Handles parsing of varve TOML configuration files: the service identity
//! stamped onto emitted events and the event destination.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::{Emitter, EventDestination, NoopEmitter, SinkEmitter};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service identity configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Event output configuration
    #[serde(default)]
    pub events: EventsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

/// Service identity stamped onto emitted events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Host tag, empty when untagged
    #[serde(default)]
    pub host: String,
}

fn default_service_name() -> String {
    "varve".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            host: String::new(),
        }
    }
}

/// Event output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Destination: empty disables events, `-` is stdout, anything else a
    /// file path appended to as JSONL
    #[serde(default)]
    pub destination: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            destination: String::new(),
        }
    }
}

impl Config {
    /// Parse and validate configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a file, or return defaults when it is missing
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build the emitter this configuration asks for
    pub fn emitter(&self) -> Result<Arc<dyn Emitter>> {
        match EventDestination::parse(Some(&self.events.destination)) {
            None => Ok(Arc::new(NoopEmitter)),
            Some(destination) => {
                let sink = destination.open()?;
                let host = match self.service.host.trim() {
                    "" => None,
                    host => Some(host.to_string()),
                };
                Ok(Arc::new(SinkEmitter::new(
                    self.service.name.clone(),
                    host,
                    sink,
                )))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "service.name cannot be empty".to_string(),
            ));
        }
        if !self.events.destination.is_empty() && self.events.destination.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "events.destination cannot be whitespace".to_string(),
            ));
        }
        Ok(())
    }
}
