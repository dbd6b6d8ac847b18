//! The agent's driving loop
//!
//! Pops one command at a time, runs its handler and applies the returned
//! [`ReturnFlags`]. A bounded wait with nothing queued turns into an idle
//! process-loop pass so incoming traffic and keep-alive keep flowing.

use super::command::{Command, CommandKind, CompletionResult, ReturnFlags};
use super::context::AgentContext;
use super::handlers;
use super::queue::{CommandSource, Popped};
use crate::command_span;
use crate::transport::mqtt::MqttResult;
use crate::transport::MqttEngine;
use tracing::{debug, error, info};

/// Run one command against the context and settle it.
///
/// A command whose handler requested acknowledgment tracking is stored in the
/// pending table; every other command is completed right away with the
/// handler's status.
pub fn process_command<E, S>(
    ctx: &mut AgentContext<E, S>,
    mut command: Command,
) -> (MqttResult<()>, ReturnFlags)
where
    E: MqttEngine,
    S: CommandSource,
{
    let mut flags = ReturnFlags::default();
    let mut status = handlers::execute(ctx, command.kind_mut(), &mut flags);

    if flags.add_acknowledgment {
        if let Err(e) = ctx.track_acknowledgment(flags.packet_id, command) {
            status = Err(e);
        }
    } else {
        let mut result = CompletionResult::new(status);
        if let (Ok(()), CommandKind::Connect(args)) = (status, command.kind()) {
            result = result.with_session_present(args.session_present);
        }
        command.complete(result);
    }

    ctx.discard_early_acks();
    (status, flags)
}

/// Drive the agent until a command ends the loop, a command fails, or every
/// producer has gone away.
pub async fn run<E, S>(ctx: &mut AgentContext<E, S>) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    info!("Command loop started");

    loop {
        let wait = ctx.idle_wait();
        let command = match ctx.commands_mut().pop(wait).await {
            Popped::Command(command) => command,
            Popped::Idle => Command::new(CommandKind::ProcessLoop),
            Popped::Closed => {
                info!("Command queue closed, stopping command loop");
                return Ok(());
            }
        };

        let kind = command.kind().name();
        let span = command_span!(kind);
        let (status, flags) = span.in_scope(|| process_command(ctx, command));

        if let Err(e) = status {
            error!(kind, error = %e, "Command failed, stopping command loop");
            return Err(e);
        }

        if flags.end_loop {
            debug!(kind, "Command ended the loop");
            break;
        }
    }

    info!("Command loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{EngineOp, MockEngine};
    use crate::transport::mqtt::{MqttError, Packet, PublishInfo, QoS};
    use rumqttc::PubAck;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (
        Arc<Mutex<Vec<CompletionResult>>>,
        impl FnOnce(CompletionResult) + Send + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |result| sink.lock().unwrap().push(result))
    }

    #[test]
    fn test_process_command_completes_untracked_command() {
        let mut ctx = AgentContext::new(MockEngine::connected(), VecDeque::<Command>::new());
        let (seen, callback) = recorder();

        let (status, flags) = process_command(&mut ctx, Command::with_callback(CommandKind::Ping, callback));

        assert!(status.is_ok());
        assert!(!flags.add_acknowledgment);
        assert!(seen.lock().unwrap()[0].is_success());
    }

    #[test]
    fn test_process_command_tracks_qos1_publish() {
        let mut ctx = AgentContext::new(MockEngine::connected(), VecDeque::<Command>::new());
        let (seen, callback) = recorder();
        let publish = CommandKind::Publish(PublishInfo::new("t", QoS::AtLeastOnce, "x"));

        let (status, flags) = process_command(&mut ctx, Command::with_callback(publish, callback));

        assert!(status.is_ok());
        assert!(ctx.pending_acks().contains(flags.packet_id));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_process_command_applies_ack_received_during_drain() {
        let mut engine = MockEngine::connected();
        engine.push_incoming(Packet::PubAck(PubAck { pkid: 1 }));
        let mut ctx = AgentContext::new(engine, VecDeque::<Command>::new());
        let (seen, callback) = recorder();
        let publish = CommandKind::Publish(PublishInfo::new("t", QoS::AtLeastOnce, "x"));

        let (status, flags) = process_command(&mut ctx, Command::with_callback(publish, callback));

        assert!(status.is_ok());
        assert!(flags.add_acknowledgment);
        assert!(ctx.pending_acks().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_process_command_reports_failure_to_callback() {
        let mut engine = MockEngine::connected();
        engine.fail_next(EngineOp::Subscribe, MqttError::SendFailed);
        let mut ctx = AgentContext::new(engine, VecDeque::<Command>::new());
        let (seen, callback) = recorder();
        let subscribe = CommandKind::Subscribe(crate::transport::mqtt::SubscribeArgs::single(
            "a",
            QoS::AtMostOnce,
        ));

        let (status, _) = process_command(&mut ctx, Command::with_callback(subscribe, callback));

        assert_eq!(status, Err(MqttError::SendFailed));
        assert_eq!(seen.lock().unwrap()[0].status, Err(MqttError::SendFailed));
        assert!(ctx.pending_acks().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_disconnect() {
        let mut queue = VecDeque::new();
        queue.push_back(Command::new(CommandKind::Ping));
        queue.push_back(Command::new(CommandKind::Disconnect));
        queue.push_back(Command::new(CommandKind::Ping));
        let mut ctx = AgentContext::new(MockEngine::connected(), queue);

        assert!(run(&mut ctx).await.is_ok());
        assert_eq!(ctx.commands_mut().len(), 1);
    }

    #[tokio::test]
    async fn test_run_returns_first_failure() {
        let mut engine = MockEngine::connected();
        engine.fail_next(EngineOp::Ping, MqttError::SendFailed);
        let mut queue = VecDeque::new();
        queue.push_back(Command::new(CommandKind::Ping));
        queue.push_back(Command::new(CommandKind::Disconnect));
        let mut ctx = AgentContext::new(engine, queue);

        assert_eq!(run(&mut ctx).await, Err(MqttError::SendFailed));
        assert_eq!(ctx.commands_mut().len(), 1);
    }

    #[tokio::test]
    async fn test_run_ends_when_queue_closes() {
        let mut ctx = AgentContext::new(MockEngine::connected(), VecDeque::<Command>::new());
        assert!(run(&mut ctx).await.is_ok());
    }
}
