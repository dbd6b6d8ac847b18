//! Connection state, status codes and connect arguments
//!
//! This module contains the pure types shared by the agent and the protocol
//! engine: the engine's closed set of status codes, the connection status it
//! reports, and the parameters of a CONNECT handshake.

use rumqttc::LastWill;
use std::time::Duration;
use thiserror::Error;

/// Connection status as reported by the protocol engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// No MQTT session is established (never connected, or disconnected)
    NotConnected,
    /// CONNACK received and the session is usable
    Connected,
}

/// Failure statuses of MQTT operations
///
/// Every variant except [`MqttError::Cancelled`] originates in the protocol
/// engine and is passed through the agent unmodified. Success is `Ok(())`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MqttError {
    #[error("Bad parameter")]
    BadParameter,
    #[error("No memory available")]
    NoMemory,
    #[error("Failed to send data over the network")]
    SendFailed,
    #[error("Failed to receive data from the network")]
    RecvFailed,
    #[error("Invalid packet or response received from the broker")]
    BadResponse,
    #[error("Connection refused by the broker")]
    ServerRefused,
    #[error("No data available from the transport")]
    NoDataAvailable,
    #[error("Operation not allowed in the current state")]
    IllegalState,
    #[error("Packet identifier already in use")]
    StateCollision,
    #[error("No PINGRESP received within the keep-alive timeout")]
    KeepAliveTimeout,
    /// Reported to commands that were still queued when the agent terminated.
    /// Never produced by the protocol engine.
    #[error("Command cancelled before it could be executed")]
    Cancelled,
}

/// Result of an MQTT operation
pub type MqttResult<T> = Result<T, MqttError>;

/// Client identity and session parameters sent in CONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub client_id: String,
    pub keep_alive: Duration,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectInfo {
    /// Connect info with a 60 second keep-alive and a clean session
    pub fn new<S: Into<String>>(client_id: S) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(60),
            clean_session: true,
            username: None,
            password: None,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn with_credentials<U: Into<String>, P: Into<String>>(
        mut self,
        username: U,
        password: P,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Argument of a Connect command
///
/// `session_present` is an output slot: the Connect handler writes the
/// broker's session-present flag into it once the handshake completes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectArgs {
    pub info: ConnectInfo,
    pub will: Option<LastWill>,
    pub timeout: Duration,
    pub session_present: bool,
}

impl ConnectArgs {
    pub fn new(info: ConnectInfo, timeout: Duration) -> Self {
        Self {
            info,
            will: None,
            timeout,
            session_present: false,
        }
    }

    pub fn with_will(mut self, will: LastWill) -> Self {
        self.will = Some(will);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::QoS;

    #[test]
    fn test_connect_info_defaults() {
        let info = ConnectInfo::new("sensor-1");
        assert_eq!(info.client_id, "sensor-1");
        assert_eq!(info.keep_alive, Duration::from_secs(60));
        assert!(info.clean_session);
        assert!(info.username.is_none());
        assert!(info.password.is_none());
    }

    #[test]
    fn test_connect_info_builders() {
        let info = ConnectInfo::new("sensor-1")
            .with_keep_alive(Duration::from_secs(30))
            .with_clean_session(false)
            .with_credentials("user", "pass");

        assert_eq!(info.keep_alive, Duration::from_secs(30));
        assert!(!info.clean_session);
        assert_eq!(info.username.as_deref(), Some("user"));
        assert_eq!(info.password.as_deref(), Some("pass"));
    }

    #[test]
    fn test_connect_args_start_without_session() {
        let args = ConnectArgs::new(ConnectInfo::new("sensor-1"), Duration::from_millis(500))
            .with_will(LastWill::new("status/sensor-1", "offline", QoS::AtLeastOnce, true));

        assert!(!args.session_present);
        assert_eq!(args.timeout, Duration::from_millis(500));
        assert_eq!(args.will.as_ref().map(|w| w.topic.as_str()), Some("status/sensor-1"));
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::BadParameter,
            MqttError::NoMemory,
            MqttError::SendFailed,
            MqttError::RecvFailed,
            MqttError::BadResponse,
            MqttError::ServerRefused,
            MqttError::NoDataAvailable,
            MqttError::IllegalState,
            MqttError::StateCollision,
            MqttError::KeepAliveTimeout,
            MqttError::Cancelled,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_connect_status_equality() {
        assert_eq!(ConnectStatus::Connected, ConnectStatus::Connected);
        assert_ne!(ConnectStatus::Connected, ConnectStatus::NotConnected);
    }
}
