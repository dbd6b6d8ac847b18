//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use mqtt_agent::agent::{AgentContext, Command};
use mqtt_agent::config::{AgentConfig, ConfigError};
use mqtt_agent::testing::MockEngine;
use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[agent]
client_id = "sensor-node-1"
command_queue_capacity = 8

[mqtt]
broker_url = "mqtt://localhost:1883"
keep_alive_secs = 45
"#,
    );

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.client_id(), "sensor-node-1");
    assert_eq!(config.agent.command_queue_capacity, 8);
    assert_eq!(config.mqtt.broker_url, "mqtt://localhost:1883");
    assert_eq!(config.connect_info().keep_alive, Duration::from_secs(45));
}

#[test]
fn test_config_without_agent_section_uses_defaults() {
    let temp_file = write_config(
        r#"
[mqtt]
broker_url = "mqtts://broker.example.com:8883"
"#,
    );

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();

    assert!(config.client_id().starts_with("agent-"));
    assert!(config.client_id().len() <= 23);
    assert_eq!(config.agent.max_outstanding_acks, 20);
    assert_eq!(config.idle_wait(), Duration::from_secs(1));
}

#[test]
fn test_missing_file_is_file_read_error() {
    let result = AgentConfig::load_from_file(std::path::Path::new("/nonexistent/agent.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[mqtt\nbroker_url = ");
    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_mqtt_section_is_parse_error() {
    let temp_file = write_config("[agent]\nclient_id = \"node\"\n");
    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_client_id_rejected() {
    let temp_file = write_config(
        r#"
[agent]
client_id = "bad id!"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#,
    );

    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidClientId(_))));
}

#[test]
fn test_non_mqtt_scheme_rejected() {
    let temp_file = write_config(
        r#"
[mqtt]
broker_url = "https://localhost:443"
"#,
    );

    let result = AgentConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidBrokerUrl(_))));
}

#[test]
fn test_credentials_resolved_from_environment() {
    std::env::set_var("MQTT_AGENT_TEST_USER", "device");
    std::env::set_var("MQTT_AGENT_TEST_PASS", "hunter2");

    let temp_file = write_config(
        r#"
[agent]
client_id = "cred-node"

[mqtt]
broker_url = "mqtt://localhost:1883"
username_env = "MQTT_AGENT_TEST_USER"
password_env = "MQTT_AGENT_TEST_PASS"
"#,
    );

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();
    let info = config.connect_info();

    assert_eq!(info.username.as_deref(), Some("device"));
    assert_eq!(info.password.as_deref(), Some("hunter2"));
}

#[test]
fn test_unset_credential_variables_mean_anonymous() {
    let temp_file = write_config(
        r#"
[mqtt]
broker_url = "mqtt://localhost:1883"
username_env = "MQTT_AGENT_TEST_UNSET_USER"
"#,
    );

    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();
    assert!(config.connect_info().username.is_none());
}

#[test]
fn test_context_sized_from_config() {
    let temp_file = write_config(
        r#"
[agent]
max_outstanding_acks = 3
max_event_queue_wait_ms = 50

[mqtt]
broker_url = "mqtt://localhost:1883"
"#,
    );
    let config = AgentConfig::load_from_file(temp_file.path()).unwrap();

    let ctx = AgentContext::from_config(MockEngine::new(), VecDeque::<Command>::new(), &config);

    assert_eq!(ctx.pending_acks().capacity(), 3);
    assert_eq!(ctx.idle_wait(), Duration::from_millis(50));
}
