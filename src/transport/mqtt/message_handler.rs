//! Publish/subscribe arguments and pure routing of incoming packets
//!
//! This module contains the argument shapes of the Publish, Subscribe and
//! Unsubscribe commands, and the pure routing decision for packets the
//! protocol engine hands back from a process-loop pass.

use bytes::Bytes;
use rumqttc::{Packet, Publish, QoS, SubscribeFilter, SubscribeReasonCode};

/// Fixed-header bytes budgeted for a PUBLISH: control byte, remaining
/// length and the topic length prefix.
const PUBLISH_HEADER_BYTES: usize = 4;

/// Argument of a Publish command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishInfo {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl PublishInfo {
    pub fn new<T: Into<String>, P: Into<Bytes>>(topic: T, qos: QoS, payload: P) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
            dup: false,
        }
    }

    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    /// Whether the broker will acknowledge this publish
    pub fn requires_ack(&self) -> bool {
        self.qos != QoS::AtMostOnce
    }

    /// Upper bound of the encoded packet size, excluding the packet identifier
    pub fn encoded_len(&self) -> usize {
        PUBLISH_HEADER_BYTES + self.topic.len() + self.payload.len()
    }
}

/// Argument of a Subscribe or Unsubscribe command
///
/// The whole list travels in a single SUBSCRIBE/UNSUBSCRIBE packet. For an
/// unsubscribe the per-filter QoS is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeArgs {
    pub filters: Vec<SubscribeFilter>,
}

impl SubscribeArgs {
    pub fn new(filters: Vec<SubscribeFilter>) -> Self {
        Self { filters }
    }

    /// Single-filter convenience constructor
    pub fn single<S: Into<String>>(path: S, qos: QoS) -> Self {
        Self {
            filters: vec![SubscribeFilter::new(path.into(), qos)],
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.path.clone()).collect()
    }
}

/// Routing decision for a packet received during a process-loop pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketRoute {
    /// Application message from the broker
    IncomingPublish(Publish),
    /// PUBACK or PUBCOMP: the QoS 1 or QoS 2 publish is complete
    PublishAcked { packet_id: u16 },
    /// SUBACK with one return code per requested filter
    SubscribeAcked {
        packet_id: u16,
        return_codes: Vec<SubscribeReasonCode>,
    },
    /// UNSUBACK
    UnsubscribeAcked { packet_id: u16 },
    /// PUBREC or PUBREL: intermediate QoS 2 step, nothing completes yet
    Intermediate,
    /// PINGRESP, owned by the engine's keep-alive bookkeeping
    PingResponse,
    /// A packet a client never expects to receive
    Unexpected(String),
}

/// Pure routing decisions for incoming packets
pub struct MessageHandler;

impl MessageHandler {
    /// Route an incoming packet (pure function)
    pub fn route_packet(packet: Packet) -> PacketRoute {
        match packet {
            Packet::Publish(publish) => PacketRoute::IncomingPublish(publish),
            Packet::PubAck(ack) => PacketRoute::PublishAcked {
                packet_id: ack.pkid,
            },
            Packet::PubComp(comp) => PacketRoute::PublishAcked {
                packet_id: comp.pkid,
            },
            Packet::SubAck(suback) => PacketRoute::SubscribeAcked {
                packet_id: suback.pkid,
                return_codes: suback.return_codes,
            },
            Packet::UnsubAck(unsuback) => PacketRoute::UnsubscribeAcked {
                packet_id: unsuback.pkid,
            },
            Packet::PubRec(_) | Packet::PubRel(_) => PacketRoute::Intermediate,
            Packet::PingResp => PacketRoute::PingResponse,
            other => PacketRoute::Unexpected(format!("{other:?}")),
        }
    }

    /// Whether every filter of a SUBACK was granted (pure function)
    pub fn all_granted(return_codes: &[SubscribeReasonCode]) -> bool {
        return_codes
            .iter()
            .all(|code| matches!(code, SubscribeReasonCode::Success(_)))
    }
}
