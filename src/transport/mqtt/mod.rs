//! MQTT types consumed by the agent
//!
//! Wire-level types (`QoS`, `Packet`, `LastWill`, `SubscribeFilter`, the ack
//! packets) are the MQTT 3.1.1 types from `rumqttc`. This module adds the
//! agent-facing pieces around them.
//!
//! - [`connection`] - Status codes, connection status and CONNECT arguments
//! - [`message_handler`] - Publish/subscribe arguments and pure packet routing

pub mod connection;
pub mod message_handler;

// Re-export public types for convenience
pub use connection::{ConnectArgs, ConnectInfo, ConnectStatus, MqttError, MqttResult};
pub use message_handler::{MessageHandler, PacketRoute, PublishInfo, SubscribeArgs};
pub use rumqttc::{LastWill, Packet, Publish, QoS, SubscribeFilter, SubscribeReasonCode};
