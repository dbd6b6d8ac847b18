//! Mock implementations for testing
//!
//! Provides a scripted [`MockEngine`] implementing [`MqttEngine`] so the agent
//! can be exercised without a broker. Every call is recorded; failures and
//! incoming packets are scripted per test. In loopback mode the engine also
//! plays the broker's part and queues the acknowledgments a real broker would
//! send.

use crate::transport::mqtt::{
    ConnectInfo, ConnectStatus, LastWill, MqttError, MqttResult, Packet, Publish, PublishInfo,
    QoS, SubscribeFilter, SubscribeReasonCode,
};
use crate::transport::MqttEngine;
use rumqttc::{PubAck, PubComp, PubRec, SubAck, UnsubAck};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Engine operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Connect,
    Publish,
    Subscribe,
    Unsubscribe,
    Ping,
    Disconnect,
}

/// Record of a call made against the mock engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Connect {
        client_id: String,
        has_will: bool,
        timeout: Duration,
    },
    Publish {
        topic: String,
        qos: QoS,
        packet_id: u16,
        dup: bool,
    },
    Subscribe {
        filters: Vec<String>,
        packet_id: u16,
    },
    Unsubscribe {
        filters: Vec<String>,
        packet_id: u16,
    },
    Ping,
    Disconnect,
    ProcessLoop {
        timeout: Duration,
    },
}

/// Scripted protocol engine for testing
#[derive(Debug)]
pub struct MockEngine {
    status: ConnectStatus,
    next_packet_id: u16,
    session_present: bool,
    loopback: bool,
    failures: HashMap<EngineOp, VecDeque<MqttError>>,
    incoming: VecDeque<MqttResult<Packet>>,
    calls: Vec<EngineCall>,
    resend: Vec<u16>,
    subscriptions: Vec<String>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            status: ConnectStatus::NotConnected,
            next_packet_id: 1,
            session_present: false,
            loopback: false,
            failures: HashMap::new(),
            incoming: VecDeque::new(),
            calls: Vec::new(),
            resend: Vec::new(),
            subscriptions: Vec::new(),
        }
    }
}

impl MockEngine {
    /// Engine that has not connected yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with an established session
    pub fn connected() -> Self {
        Self {
            status: ConnectStatus::Connected,
            ..Default::default()
        }
    }

    /// Engine that answers like a broker: acks every request and echoes
    /// publishes on topics it holds a subscription for
    pub fn loopback() -> Self {
        Self {
            loopback: true,
            ..Default::default()
        }
    }

    pub fn with_session_present(mut self, session_present: bool) -> Self {
        self.session_present = session_present;
        self
    }

    pub fn set_connect_status(&mut self, status: ConnectStatus) {
        self.status = status;
    }

    pub fn set_next_packet_id(&mut self, packet_id: u16) {
        self.next_packet_id = packet_id;
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&mut self, op: EngineOp, error: MqttError) {
        self.failures.entry(op).or_default().push_back(error);
    }

    /// Queue a packet for a later process-loop pass
    pub fn push_incoming(&mut self, packet: Packet) {
        self.incoming.push_back(Ok(packet));
    }

    /// Queue a failing process-loop pass
    pub fn push_process_error(&mut self, error: MqttError) {
        self.incoming.push_back(Err(error));
    }

    pub fn set_publishes_to_resend(&mut self, packet_ids: Vec<u16>) {
        self.resend = packet_ids;
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn process_loop_passes(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, EngineCall::ProcessLoop { .. }))
            .count()
    }

    pub fn pending_incoming(&self) -> usize {
        self.incoming.len()
    }

    fn scripted_failure(&mut self, op: EngineOp) -> MqttResult<()> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn paths(filters: &[SubscribeFilter]) -> Vec<String> {
        filters.iter().map(|f| f.path.clone()).collect()
    }

    fn loopback_publish(&mut self, info: &PublishInfo, packet_id: u16) {
        match info.qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => self.push_incoming(Packet::PubAck(PubAck { pkid: packet_id })),
            QoS::ExactlyOnce => {
                self.push_incoming(Packet::PubRec(PubRec { pkid: packet_id }));
                self.push_incoming(Packet::PubComp(PubComp { pkid: packet_id }));
            }
        }

        if self.subscriptions.iter().any(|path| path == &info.topic) {
            let mut echo = Publish::new(info.topic.clone(), QoS::AtMostOnce, info.payload.to_vec());
            echo.retain = info.retain;
            self.push_incoming(Packet::Publish(echo));
        }
    }
}

impl MqttEngine for MockEngine {
    fn connect(
        &mut self,
        info: &ConnectInfo,
        will: Option<&LastWill>,
        timeout: Duration,
    ) -> MqttResult<bool> {
        self.calls.push(EngineCall::Connect {
            client_id: info.client_id.clone(),
            has_will: will.is_some(),
            timeout,
        });
        self.scripted_failure(EngineOp::Connect)?;
        self.status = ConnectStatus::Connected;
        Ok(self.session_present)
    }

    fn publish(&mut self, info: &PublishInfo, packet_id: u16) -> MqttResult<()> {
        self.calls.push(EngineCall::Publish {
            topic: info.topic.clone(),
            qos: info.qos,
            packet_id,
            dup: info.dup,
        });
        self.scripted_failure(EngineOp::Publish)?;
        if self.loopback {
            self.loopback_publish(info, packet_id);
        }
        Ok(())
    }

    fn subscribe(&mut self, filters: &[SubscribeFilter], packet_id: u16) -> MqttResult<()> {
        self.calls.push(EngineCall::Subscribe {
            filters: Self::paths(filters),
            packet_id,
        });
        self.scripted_failure(EngineOp::Subscribe)?;
        if self.loopback {
            self.subscriptions.extend(Self::paths(filters));
            let return_codes = filters
                .iter()
                .map(|f| SubscribeReasonCode::Success(f.qos))
                .collect();
            self.push_incoming(Packet::SubAck(SubAck {
                pkid: packet_id,
                return_codes,
            }));
        }
        Ok(())
    }

    fn unsubscribe(&mut self, filters: &[SubscribeFilter], packet_id: u16) -> MqttResult<()> {
        let paths = Self::paths(filters);
        self.calls.push(EngineCall::Unsubscribe {
            filters: paths.clone(),
            packet_id,
        });
        self.scripted_failure(EngineOp::Unsubscribe)?;
        if self.loopback {
            self.subscriptions.retain(|path| !paths.contains(path));
            self.push_incoming(Packet::UnsubAck(UnsubAck { pkid: packet_id }));
        }
        Ok(())
    }

    fn ping(&mut self) -> MqttResult<()> {
        self.calls.push(EngineCall::Ping);
        self.scripted_failure(EngineOp::Ping)
    }

    fn disconnect(&mut self) -> MqttResult<()> {
        self.calls.push(EngineCall::Disconnect);
        self.scripted_failure(EngineOp::Disconnect)?;
        self.status = ConnectStatus::NotConnected;
        Ok(())
    }

    fn next_packet_id(&mut self) -> u16 {
        let packet_id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        packet_id
    }

    fn process_loop(&mut self, timeout: Duration) -> MqttResult<Option<Packet>> {
        self.calls.push(EngineCall::ProcessLoop { timeout });
        match self.incoming.pop_front() {
            Some(Ok(packet)) => Ok(Some(packet)),
            Some(Err(error)) => Err(error),
            None => Ok(None),
        }
    }

    fn connect_status(&self) -> ConnectStatus {
        self.status
    }

    fn publishes_to_resend(&self) -> Vec<u16> {
        self.resend.clone()
    }
}
