//! Transport layer: the MQTT protocol engine contract
//!
//! The agent never encodes packets or touches sockets itself. It drives an
//! [`MqttEngine`], which owns packet serialization, network I/O and keep-alive
//! timing, and reports every outcome as an [`MqttResult`].

use std::time::Duration;

pub mod mqtt;

use mqtt::{ConnectInfo, ConnectStatus, LastWill, MqttResult, Packet, PublishInfo, SubscribeFilter};

/// Protocol engine trait for MQTT client operations
///
/// Calls are synchronous and bounded by the engine's own timeouts. Exactly one
/// caller drives an engine at a time; the agent guarantees this by owning the
/// engine inside its context.
pub trait MqttEngine: Send {
    /// Perform the CONNECT/CONNACK handshake, returning the session-present flag
    fn connect(
        &mut self,
        info: &ConnectInfo,
        will: Option<&LastWill>,
        timeout: Duration,
    ) -> MqttResult<bool>;

    /// Send a PUBLISH. `packet_id` is 0 for QoS 0.
    fn publish(&mut self, info: &PublishInfo, packet_id: u16) -> MqttResult<()>;

    /// Send one SUBSCRIBE covering every filter
    fn subscribe(&mut self, filters: &[SubscribeFilter], packet_id: u16) -> MqttResult<()>;

    /// Send one UNSUBSCRIBE covering every filter
    fn unsubscribe(&mut self, filters: &[SubscribeFilter], packet_id: u16) -> MqttResult<()>;

    /// Send a PINGREQ
    fn ping(&mut self) -> MqttResult<()>;

    /// Send DISCONNECT and close the session
    fn disconnect(&mut self) -> MqttResult<()>;

    /// Allocate the next packet identifier. Never returns 0.
    fn next_packet_id(&mut self) -> u16;

    /// Run a single receive/process pass, waiting at most `timeout`.
    ///
    /// Returns the packet handled during the pass, or `None` when nothing
    /// arrived.
    fn process_loop(&mut self, timeout: Duration) -> MqttResult<Option<Packet>>;

    fn connect_status(&self) -> ConnectStatus;

    /// Packet identifiers of outgoing publishes the broker has not yet
    /// acknowledged, in the order they should be re-sent after a reconnect
    fn publishes_to_resend(&self) -> Vec<u16> {
        Vec::new()
    }
}
