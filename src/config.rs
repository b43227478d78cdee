//! Relay configuration.

use crate::protocol::Address;
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Environment variable overriding [`RelayConfig::broker`].
pub const BROKER_ENV: &str = "STRICTLY_RELAY_BROKER";

/// Default config file, read from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Where the broker lives and which addresses the session uses.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Broker TCP address, `host:port`.
    broker: String,

    /// Address the coordinator consumes.
    coordinator_address: Address,

    /// Optional lobby address forwarding registrations.
    lobby_address: Option<Address>,

    /// Agents register at the lobby instead of the coordinator.
    register_via_lobby: bool,
}

#[instrument]
fn default_broker() -> String {
    "127.0.0.1:5672".to_string()
}

#[instrument]
fn default_coordinator_address() -> Address {
    Address::new("game_queue")
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            coordinator_address: default_coordinator_address(),
            lobby_address: None,
            register_via_lobby: false,
        }
    }
}

impl RelayConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(
            broker = %config.broker,
            coordinator = %config.coordinator_address,
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Loads `path`, or `relay.toml` if it exists, or defaults; then applies
    /// the environment override.
    ///
    /// An explicit path that cannot be read is an error. A missing default
    /// file is not.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => {
                debug!("No config file, using defaults");
                Self::default()
            }
        };
        Ok(config.with_env_overrides())
    }

    /// Applies `STRICTLY_RELAY_BROKER` if set.
    pub fn with_env_overrides(self) -> Self {
        match std::env::var(BROKER_ENV) {
            Ok(broker) if !broker.trim().is_empty() => {
                debug!(%broker, "Broker overridden from environment");
                self.with_broker(broker)
            }
            _ => self,
        }
    }

    /// Replaces the broker address.
    pub fn with_broker(mut self, broker: impl Into<String>) -> Self {
        self.broker = broker.into();
        self
    }

    /// Replaces the lobby address.
    pub fn with_lobby(mut self, lobby: Option<Address>) -> Self {
        self.lobby_address = lobby;
        self
    }

    /// Makes agents register at the lobby.
    pub fn with_register_via_lobby(mut self, via_lobby: bool) -> Self {
        self.register_via_lobby = via_lobby;
        self
    }

    /// Address agents send `register` to.
    ///
    /// # Errors
    ///
    /// `register_via_lobby` without a `lobby_address`.
    pub fn registration_address(&self) -> Result<Address, ConfigError> {
        match (&self.lobby_address, self.register_via_lobby) {
            (Some(lobby), true) => Ok(lobby.clone()),
            (None, true) => Err(ConfigError::new(
                "register_via_lobby is set but lobby_address is missing".to_string(),
            )),
            (_, false) => Ok(self.coordinator_address.clone()),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
