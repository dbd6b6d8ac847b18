//! Agent state shared by every command handler
//!
//! An [`AgentContext`] is the single owner of the protocol engine, the command
//! source and the pending-acknowledgment table. Handlers receive it as
//! `&mut AgentContext`, which makes concurrent handler execution against the
//! same connection impossible to express.

use super::command::{CompletionResult, Command, CommandKind};
use super::pending_acks::{AckSlots, PendingAcks, DEFAULT_MAX_OUTSTANDING_ACKS};
use super::queue::CommandSource;
use crate::config::AgentConfig;
use crate::transport::mqtt::{
    ConnectStatus, MessageHandler, MqttError, MqttResult, Packet, PacketRoute, Publish,
};
use crate::transport::MqttEngine;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Default driving-loop wait before an idle process-loop pump
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(1000);

/// Callback receiving application messages delivered by the broker
pub type IncomingPublishCallback = Box<dyn FnMut(&Publish) + Send>;

/// Connection and agent state
pub struct AgentContext<E, S> {
    engine: E,
    commands: S,
    pending_acks: PendingAcks,
    packet_received_in_loop: bool,
    early_acks: Vec<(u16, CompletionResult)>,
    incoming_publish: Option<IncomingPublishCallback>,
    idle_wait: Duration,
}

impl<E, S> AgentContext<E, S>
where
    E: MqttEngine,
    S: CommandSource,
{
    pub fn new(engine: E, commands: S) -> Self {
        Self {
            engine,
            commands,
            pending_acks: PendingAcks::new(DEFAULT_MAX_OUTSTANDING_ACKS),
            packet_received_in_loop: false,
            early_acks: Vec::new(),
            incoming_publish: None,
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }

    /// Context sized from the `[agent]` configuration section
    pub fn from_config(engine: E, commands: S, config: &AgentConfig) -> Self {
        Self::new(engine, commands)
            .with_max_outstanding_acks(config.agent.max_outstanding_acks)
            .with_idle_wait(Duration::from_millis(config.agent.max_event_queue_wait_ms))
    }

    pub fn with_max_outstanding_acks(mut self, capacity: usize) -> Self {
        self.pending_acks = PendingAcks::new(capacity);
        self
    }

    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    pub fn on_incoming_publish<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Publish) + Send + 'static,
    {
        self.incoming_publish = Some(Box::new(callback));
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn commands_mut(&mut self) -> &mut S {
        &mut self.commands
    }

    pub fn pending_acks(&self) -> &PendingAcks {
        &self.pending_acks
    }

    /// Free pending-ack slots, shared with producers.
    ///
    /// Take this after [`with_max_outstanding_acks`](Self::with_max_outstanding_acks),
    /// which replaces the table.
    pub fn ack_slots(&self) -> AckSlots {
        self.pending_acks.slots()
    }

    pub fn idle_wait(&self) -> Duration {
        self.idle_wait
    }

    /// Whether the most recent process-loop pass delivered a packet
    pub fn packet_received_in_loop(&self) -> bool {
        self.packet_received_in_loop
    }

    pub fn into_parts(self) -> (E, S) {
        (self.engine, self.commands)
    }

    /// Pump the engine with a zero wait until a pass delivers nothing.
    ///
    /// Stops at the first failing pass and returns its status. Does nothing
    /// while the engine is not connected.
    pub fn run_process_loops(&mut self) -> MqttResult<()> {
        let mut passes = 0usize;
        loop {
            self.packet_received_in_loop = false;

            if self.engine.connect_status() != ConnectStatus::Connected {
                break;
            }

            passes += 1;
            if let Some(packet) = self.engine.process_loop(Duration::ZERO)? {
                self.packet_received_in_loop = true;
                self.dispatch_incoming(packet);
            }

            if !self.packet_received_in_loop {
                break;
            }
        }

        trace!(passes, "Process loop drained");
        Ok(())
    }

    fn dispatch_incoming(&mut self, packet: Packet) {
        match MessageHandler::route_packet(packet) {
            PacketRoute::IncomingPublish(publish) => {
                debug!(topic = %publish.topic, packet_id = publish.pkid, "Incoming publish");
                match self.incoming_publish.as_mut() {
                    Some(callback) => callback(&publish),
                    None => warn!(topic = %publish.topic, "Dropping publish with no handler"),
                }
            }
            PacketRoute::PublishAcked { packet_id } => {
                self.resolve_ack(packet_id, CompletionResult::success());
            }
            PacketRoute::SubscribeAcked {
                packet_id,
                return_codes,
            } => {
                if !MessageHandler::all_granted(&return_codes) {
                    warn!(packet_id, "Broker rejected at least one subscription");
                }
                self.resolve_ack(
                    packet_id,
                    CompletionResult::success().with_suback_codes(return_codes),
                );
            }
            PacketRoute::UnsubscribeAcked { packet_id } => {
                self.resolve_ack(packet_id, CompletionResult::success());
            }
            PacketRoute::Intermediate => {}
            PacketRoute::PingResponse => {
                warn!("PINGRESP should be consumed by the engine's keep-alive handling");
            }
            PacketRoute::Unexpected(packet) => {
                error!(packet = %packet, "Unexpected packet received");
            }
        }
    }

    fn resolve_ack(&mut self, packet_id: u16, result: CompletionResult) {
        match self.pending_acks.remove(packet_id) {
            Some(command) => {
                debug!(packet_id, "Acknowledgment completed pending operation");
                command.complete(result);
            }
            None => {
                // The ack can beat the registration when it arrives during the
                // handler's own drain; hold it until the loop registers.
                self.early_acks.push((packet_id, result));
            }
        }
    }

    /// Take an acknowledgment that arrived before its operation was registered
    pub(crate) fn take_early_ack(&mut self, packet_id: u16) -> Option<CompletionResult> {
        let index = self
            .early_acks
            .iter()
            .position(|(id, _)| *id == packet_id)?;
        Some(self.early_acks.swap_remove(index).1)
    }

    pub(crate) fn discard_early_acks(&mut self) {
        for (packet_id, _) in self.early_acks.drain(..) {
            error!(packet_id, "No pending operation matches acknowledgment");
        }
    }

    /// Reconcile pending operations with the broker after a reconnect.
    ///
    /// With a resumed session every unacknowledged publish is re-sent with its
    /// DUP flag set. Without one, every pending operation is failed with
    /// [`MqttError::BadResponse`] so its producer can retry.
    pub fn resume_session(&mut self, session_present: bool) -> MqttResult<()> {
        if self.engine.connect_status() != ConnectStatus::Connected {
            return Err(MqttError::IllegalState);
        }

        if session_present {
            for packet_id in self.engine.publishes_to_resend() {
                let Some(command) = self.pending_acks.get_mut(packet_id) else {
                    continue;
                };
                let CommandKind::Publish(info) = command.kind_mut() else {
                    continue;
                };

                info.dup = true;
                info!(packet_id, topic = %info.topic, "Resending publish");
                if let Err(e) = self.engine.publish(info, packet_id) {
                    error!(packet_id, error = %e, "Error resending publishes");
                    return Err(e);
                }
            }
        } else {
            let drained = self.pending_acks.drain();
            if !drained.is_empty() {
                info!(count = drained.len(), "Clean session, failing pending operations");
            }
            for (packet_id, command) in drained {
                debug!(packet_id, "Failing pending operation");
                command.complete(CompletionResult::new(Err(MqttError::BadResponse)));
            }
        }

        Ok(())
    }

    /// Hold `command` until `packet_id` is acknowledged, or complete it now if
    /// the acknowledgment already arrived.
    pub(crate) fn track_acknowledgment(
        &mut self,
        packet_id: u16,
        command: Command,
    ) -> MqttResult<()> {
        if let Some(result) = self.take_early_ack(packet_id) {
            command.complete(result);
            return Ok(());
        }

        if let Err(command) = self.pending_acks.insert(packet_id, command) {
            error!(packet_id, "No memory to wait for acknowledgment");
            command.complete(CompletionResult::new(Err(MqttError::NoMemory)));
            return Err(MqttError::NoMemory);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{EngineCall, MockEngine};
    use crate::transport::mqtt::{PublishInfo, QoS, SubscribeReasonCode};
    use rumqttc::{PubAck, PubRec, SubAck, UnsubAck};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type TestContext = AgentContext<MockEngine, VecDeque<Command>>;

    fn connected_context() -> TestContext {
        AgentContext::new(MockEngine::connected(), VecDeque::<Command>::new())
    }

    fn recording_command(kind: CommandKind) -> (Command, Arc<Mutex<Vec<CompletionResult>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let command = Command::with_callback(kind, move |result| {
            sink.lock().unwrap().push(result);
        });
        (command, seen)
    }

    #[test]
    fn test_drain_stops_after_first_quiet_pass() {
        let mut ctx = connected_context();
        ctx.engine_mut().push_incoming(Packet::PingResp);
        ctx.engine_mut().push_incoming(Packet::PubRec(PubRec { pkid: 1 }));

        assert!(ctx.run_process_loops().is_ok());
        assert_eq!(ctx.engine().process_loop_passes(), 3);
        assert!(!ctx.packet_received_in_loop());
    }

    #[test]
    fn test_drain_skips_disconnected_engine() {
        let mut ctx = AgentContext::new(MockEngine::new(), VecDeque::<Command>::new());
        ctx.engine_mut().push_incoming(Packet::PingResp);

        assert!(ctx.run_process_loops().is_ok());
        assert_eq!(ctx.engine().process_loop_passes(), 0);
    }

    #[test]
    fn test_drain_returns_first_failure() {
        let mut ctx = connected_context();
        ctx.engine_mut().push_incoming(Packet::PingResp);
        ctx.engine_mut().push_process_error(MqttError::RecvFailed);
        ctx.engine_mut().push_incoming(Packet::PingResp);

        assert_eq!(ctx.run_process_loops(), Err(MqttError::RecvFailed));
        assert_eq!(ctx.engine().process_loop_passes(), 2);
    }

    #[test]
    fn test_drain_uses_zero_wait() {
        let mut ctx = connected_context();
        ctx.run_process_loops().unwrap();
        assert_eq!(
            ctx.engine().calls(),
            &[EngineCall::ProcessLoop {
                timeout: Duration::ZERO
            }]
        );
    }

    #[test]
    fn test_ack_completes_pending_command() {
        let mut ctx = connected_context();
        let (command, seen) = recording_command(CommandKind::Publish(PublishInfo::new(
            "a",
            QoS::AtLeastOnce,
            "x",
        )));
        ctx.track_acknowledgment(4, command).unwrap();
        ctx.engine_mut().push_incoming(Packet::PubAck(PubAck { pkid: 4 }));

        ctx.run_process_loops().unwrap();

        assert!(ctx.pending_acks().is_empty());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_success());
    }

    #[test]
    fn test_suback_codes_reach_callback() {
        let mut ctx = connected_context();
        let (command, seen) = recording_command(CommandKind::Ping);
        ctx.track_acknowledgment(2, command).unwrap();
        ctx.engine_mut().push_incoming(Packet::SubAck(SubAck {
            pkid: 2,
            return_codes: vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)],
        }));

        ctx.run_process_loops().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0].suback_codes,
            vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)]
        );
    }

    #[test]
    fn test_early_ack_is_applied_on_registration() {
        let mut ctx = connected_context();
        ctx.engine_mut().push_incoming(Packet::UnsubAck(UnsubAck { pkid: 11 }));
        ctx.run_process_loops().unwrap();

        let (command, seen) = recording_command(CommandKind::Ping);
        ctx.track_acknowledgment(11, command).unwrap();

        assert!(ctx.pending_acks().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unmatched_ack_is_discarded() {
        let mut ctx = connected_context();
        ctx.engine_mut().push_incoming(Packet::PubAck(PubAck { pkid: 99 }));
        ctx.run_process_loops().unwrap();
        ctx.discard_early_acks();

        assert!(ctx.take_early_ack(99).is_none());
    }

    #[test]
    fn test_track_acknowledgment_reports_full_table() {
        let mut ctx = connected_context().with_max_outstanding_acks(1);
        ctx.track_acknowledgment(1, Command::new(CommandKind::Ping))
            .unwrap();

        let (command, seen) = recording_command(CommandKind::Ping);
        assert_eq!(
            ctx.track_acknowledgment(2, command),
            Err(MqttError::NoMemory)
        );
        assert_eq!(seen.lock().unwrap()[0].status, Err(MqttError::NoMemory));
    }

    #[test]
    fn test_incoming_publish_reaches_callback() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mut ctx = connected_context().on_incoming_publish(move |publish| {
            sink.lock().unwrap().push(publish.topic.clone());
        });
        ctx.engine_mut()
            .push_incoming(Packet::Publish(Publish::new("alerts", QoS::AtMostOnce, "on")));

        ctx.run_process_loops().unwrap();

        assert_eq!(*received.lock().unwrap(), vec!["alerts".to_string()]);
    }

    #[test]
    fn test_resume_session_requires_connection() {
        let mut ctx = AgentContext::new(MockEngine::new(), VecDeque::<Command>::new());
        assert_eq!(ctx.resume_session(true), Err(MqttError::IllegalState));
    }

    #[test]
    fn test_resume_clean_session_fails_pending() {
        let mut ctx = connected_context();
        let (first, first_seen) = recording_command(CommandKind::Ping);
        let (second, second_seen) = recording_command(CommandKind::Ping);
        ctx.track_acknowledgment(1, first).unwrap();
        ctx.track_acknowledgment(2, second).unwrap();

        ctx.resume_session(false).unwrap();

        assert!(ctx.pending_acks().is_empty());
        assert_eq!(
            first_seen.lock().unwrap()[0].status,
            Err(MqttError::BadResponse)
        );
        assert_eq!(
            second_seen.lock().unwrap()[0].status,
            Err(MqttError::BadResponse)
        );
    }

    #[test]
    fn test_resume_present_session_resends_with_dup() {
        let mut ctx = connected_context();
        let publish = Command::new(CommandKind::Publish(PublishInfo::new(
            "telemetry",
            QoS::AtLeastOnce,
            "42",
        )));
        ctx.track_acknowledgment(7, publish).unwrap();
        ctx.engine_mut().set_publishes_to_resend(vec![7, 8]);

        ctx.resume_session(true).unwrap();

        assert_eq!(
            ctx.engine().calls(),
            &[EngineCall::Publish {
                topic: "telemetry".to_string(),
                qos: QoS::AtLeastOnce,
                packet_id: 7,
                dup: true,
            }]
        );
        assert!(ctx.pending_acks().contains(7));
    }

    #[test]
    fn test_resume_present_session_stops_at_send_failure() {
        let mut ctx = connected_context();
        for packet_id in [1, 2] {
            let publish = Command::new(CommandKind::Publish(PublishInfo::new(
                "t",
                QoS::AtLeastOnce,
                "x",
            )));
            ctx.track_acknowledgment(packet_id, publish).unwrap();
        }
        ctx.engine_mut().set_publishes_to_resend(vec![1, 2]);
        ctx.engine_mut()
            .fail_next(crate::testing::mocks::EngineOp::Publish, MqttError::SendFailed);

        assert_eq!(ctx.resume_session(true), Err(MqttError::SendFailed));
        assert_eq!(ctx.engine().calls().len(), 1);
    }
}
