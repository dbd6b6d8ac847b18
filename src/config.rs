//! Agent configuration
//!
//! Loaded from a TOML file with an `[agent]` section sizing the command
//! layer and an `[mqtt]` section describing the broker session. Credentials
//! are never stored in the file; the file names the environment variables
//! that hold them and they are resolved at runtime.

use crate::agent::{DEFAULT_MAX_OUTSTANDING_ACKS, DEFAULT_NETWORK_BUFFER_SIZE};
use crate::transport::mqtt::ConnectInfo;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Longest client identifier every MQTT 3.1.1 broker must accept
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    pub mqtt: MqttSection,
}

/// Command layer sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Client identifier (must match [a-zA-Z0-9._-]+); generated when omitted
    pub client_id: Option<String>,
    /// Depth of the bounded command queue
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
    /// Capacity of the pending-acknowledgment table
    #[serde(default = "default_max_outstanding_acks")]
    pub max_outstanding_acks: usize,
    /// Idle wait before the loop pumps the connection on its own
    #[serde(default = "default_max_event_queue_wait_ms")]
    pub max_event_queue_wait_ms: u64,
    /// Largest encoded publish producers may enqueue
    #[serde(default = "default_network_buffer_size")]
    pub network_buffer_size: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            client_id: None,
            command_queue_capacity: default_command_queue_capacity(),
            max_outstanding_acks: default_max_outstanding_acks(),
            max_event_queue_wait_ms: default_max_event_queue_wait_ms(),
            network_buffer_size: default_network_buffer_size(),
        }
    }
}

/// Broker session settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Wait for CONNACK
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

fn default_command_queue_capacity() -> usize {
    25
}

fn default_max_outstanding_acks() -> usize {
    DEFAULT_MAX_OUTSTANDING_ACKS
}

fn default_max_event_queue_wait_ms() -> u64 {
    1000
}

fn default_network_buffer_size() -> usize {
    DEFAULT_NETWORK_BUFFER_SIZE
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_clean_session() -> bool {
    true
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid client ID format: {0}")]
    InvalidClientId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Configuration for a broker URL with every other field defaulted
    pub fn new<S: Into<String>>(broker_url: S) -> Self {
        Self {
            agent: AgentSection {
                client_id: Some(generate_client_id()),
                ..AgentSection::default()
            },
            mqtt: MqttSection {
                broker_url: broker_url.into(),
                keep_alive_secs: default_keep_alive_secs(),
                connect_timeout_ms: default_connect_timeout_ms(),
                clean_session: default_clean_session(),
                username_env: None,
                password_env: None,
            },
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration, generating a client ID if none is set
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: AgentConfig = toml::from_str(content)?;
        if config.agent.client_id.is_none() {
            config.agent.client_id = Some(generate_client_id());
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(client_id) = &self.agent.client_id {
            validate_client_id(client_id)?;
        }
        validate_broker_url(&self.mqtt.broker_url)?;

        if self.agent.command_queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "command_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.agent.max_outstanding_acks == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_outstanding_acks must be at least 1".to_string(),
            ));
        }
        if self.agent.network_buffer_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "network_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.mqtt.keep_alive_secs > u64::from(u16::MAX) {
            return Err(ConfigError::InvalidConfig(format!(
                "keep_alive_secs must not exceed {}",
                u16::MAX
            )));
        }

        Ok(())
    }

    /// Render the configuration back to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Client identifier, generating one for configurations built by hand
    pub fn client_id(&self) -> String {
        self.agent
            .client_id
            .clone()
            .unwrap_or_else(generate_client_id)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.mqtt.connect_timeout_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.agent.max_event_queue_wait_ms)
    }

    /// Build CONNECT parameters, resolving credentials from the environment
    pub fn connect_info(&self) -> ConnectInfo {
        let info = ConnectInfo::new(self.client_id())
            .with_keep_alive(Duration::from_secs(self.mqtt.keep_alive_secs))
            .with_clean_session(self.mqtt.clean_session);

        match (self.get_mqtt_username(), self.get_mqtt_password()) {
            (Some(username), password) => {
                info.with_credentials(username, password.unwrap_or_default())
            }
            (None, _) => info,
        }
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.password_env.as_ref())
    }
}

fn generate_client_id() -> String {
    let mut id = format!("agent-{}", Uuid::new_v4().simple());
    id.truncate(MAX_CLIENT_ID_LEN);
    id
}

fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    let valid_chars = client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if client_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidClientId(format!(
            "Client ID '{client_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }
    if client_id.len() > MAX_CLIENT_ID_LEN {
        return Err(ConfigError::InvalidClientId(format!(
            "Client ID '{client_id}' is longer than {MAX_CLIENT_ID_LEN} characters"
        )));
    }

    Ok(())
}

fn validate_broker_url(broker_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(broker_url)
        .map_err(|e| ConfigError::InvalidBrokerUrl(format!("{broker_url}: {e}")))?;

    match url.scheme() {
        "mqtt" | "mqtts" => {}
        other => {
            return Err(ConfigError::InvalidBrokerUrl(format!(
                "unsupported scheme '{other}', expected mqtt or mqtts"
            )))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidBrokerUrl(format!(
            "{broker_url}: missing host"
        )));
    }

    Ok(())
}
