//! Command handlers
//!
//! One handler per [`CommandKind`]. Each handler resets the caller's
//! [`ReturnFlags`], drives the protocol engine, and leaves behind the
//! bookkeeping the driving loop must perform:
//!
//! | Command      | Packet id | Ack tracked              | Drain after send | Ends loop |
//! |--------------|-----------|--------------------------|------------------|-----------|
//! | Connect      | none      | no                       | no               | no        |
//! | Publish      | QoS > 0   | QoS > 0, send and drain ok | yes            | no        |
//! | Subscribe    | always    | send and drain ok        | yes              | no        |
//! | Unsubscribe  | always    | send and drain ok        | yes              | no        |
//! | Ping         | none      | no                       | yes              | no        |
//! | Disconnect   | none      | no                       | no               | yes       |
//! | ProcessLoop  | none      | no                       | yes              | no        |
//! | Terminate    | none      | no                       | no               | yes       |
//!
//! Engine failures are returned unmodified.

use super::command::{CommandKind, CompletionResult, ReturnFlags, PACKET_ID_NONE};
use super::context::AgentContext;
use super::queue::CommandSource;
use crate::mqtt_span;
use crate::transport::mqtt::{ConnectArgs, MqttResult, PublishInfo, SubscribeArgs};
use crate::transport::MqttEngine;
use tracing::{debug, info};

/// Run the handler matching `kind`
pub fn execute<E, S>(
    ctx: &mut AgentContext<E, S>,
    kind: &mut CommandKind,
    flags: &mut ReturnFlags,
) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    match kind {
        CommandKind::ProcessLoop => process_loop(ctx, flags),
        CommandKind::Publish(info) => publish(ctx, info, flags),
        CommandKind::Subscribe(args) => subscribe(ctx, args, flags),
        CommandKind::Unsubscribe(args) => unsubscribe(ctx, args, flags),
        CommandKind::Ping => ping(ctx, flags),
        CommandKind::Connect(args) => connect(ctx, args, flags),
        CommandKind::Disconnect => disconnect(ctx, flags),
        CommandKind::Terminate => terminate(ctx, flags),
    }
}

/// Idle pump of the connection
pub fn process_loop<E, S>(ctx: &mut AgentContext<E, S>, flags: &mut ReturnFlags) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    flags.reset();
    ctx.run_process_loops()
}

pub fn publish<E, S>(
    ctx: &mut AgentContext<E, S>,
    info: &PublishInfo,
    flags: &mut ReturnFlags,
) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    flags.reset();

    let packet_id = if info.requires_ack() {
        ctx.engine_mut().next_packet_id()
    } else {
        PACKET_ID_NONE
    };

    info!(topic = %info.topic, qos = ?info.qos, packet_id, "Publishing message");
    mqtt_span!(operation = "publish", packet_id)
        .in_scope(|| ctx.engine_mut().publish(info, packet_id))?;

    flags.packet_id = packet_id;
    flags.add_acknowledgment = info.requires_ack();
    drain_after_send(ctx, flags)
}

pub fn subscribe<E, S>(
    ctx: &mut AgentContext<E, S>,
    args: &SubscribeArgs,
    flags: &mut ReturnFlags,
) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    flags.reset();

    let packet_id = ctx.engine_mut().next_packet_id();
    debug!(filters = ?args.paths(), packet_id, "Subscribing");
    mqtt_span!(operation = "subscribe", packet_id)
        .in_scope(|| ctx.engine_mut().subscribe(&args.filters, packet_id))?;

    flags.packet_id = packet_id;
    flags.add_acknowledgment = true;
    drain_after_send(ctx, flags)
}

pub fn unsubscribe<E, S>(
    ctx: &mut AgentContext<E, S>,
    args: &SubscribeArgs,
    flags: &mut ReturnFlags,
) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    flags.reset();

    let packet_id = ctx.engine_mut().next_packet_id();
    debug!(filters = ?args.paths(), packet_id, "Unsubscribing");
    mqtt_span!(operation = "unsubscribe", packet_id)
        .in_scope(|| ctx.engine_mut().unsubscribe(&args.filters, packet_id))?;

    flags.packet_id = packet_id;
    flags.add_acknowledgment = true;
    drain_after_send(ctx, flags)
}

/// A ping never tracks an ack: PINGRESP belongs to the engine's keep-alive.
pub fn ping<E, S>(ctx: &mut AgentContext<E, S>, flags: &mut ReturnFlags) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    flags.reset();
    mqtt_span!(operation = "ping").in_scope(|| ctx.engine_mut().ping())?;
    ctx.run_process_loops()
}

/// Blocking handshake; writes the session-present flag into `args`.
pub fn connect<E, S>(
    ctx: &mut AgentContext<E, S>,
    args: &mut ConnectArgs,
    flags: &mut ReturnFlags,
) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    flags.reset();
    args.session_present = false;

    info!(client_id = %args.info.client_id, timeout_ms = args.timeout.as_millis() as u64, "Connecting");
    args.session_present = mqtt_span!(operation = "connect", client_id = %args.info.client_id)
        .in_scope(|| {
            ctx.engine_mut()
                .connect(&args.info, args.will.as_ref(), args.timeout)
        })?;
    Ok(())
}

/// Ends the loop whether or not DISCONNECT could be sent.
pub fn disconnect<E, S>(ctx: &mut AgentContext<E, S>, flags: &mut ReturnFlags) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    flags.reset();
    flags.end_loop = true;

    info!("Disconnecting");
    mqtt_span!(operation = "disconnect").in_scope(|| ctx.engine_mut().disconnect())
}

/// Ends the loop and cancels the commands queued when it starts.
///
/// Never fails. Each drained command that carries a callback receives
/// [`CompletionResult::cancelled`] exactly once. At most as many commands as
/// were queued on entry are drained; later enqueues are left in place.
pub fn terminate<E, S>(ctx: &mut AgentContext<E, S>, flags: &mut ReturnFlags) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    flags.reset();
    flags.end_loop = true;

    info!("Terminating command loop");
    let depth = ctx.commands_mut().queued();
    let mut cancelled = 0usize;
    for _ in 0..depth {
        let Some(command) = ctx.commands_mut().try_pop() else {
            break;
        };
        debug!(kind = command.kind().name(), "Cancelling queued command");
        command.complete(CompletionResult::cancelled());
        cancelled += 1;
    }
    if cancelled > 0 {
        info!(cancelled, "Cancelled queued commands");
    }

    Ok(())
}

/// Drain after a successful send; a failed drain withdraws the ack request.
fn drain_after_send<E, S>(ctx: &mut AgentContext<E, S>, flags: &mut ReturnFlags) -> MqttResult<()>
where
    E: MqttEngine,
    S: CommandSource,
{
    let result = ctx.run_process_loops();
    if result.is_err() {
        flags.add_acknowledgment = false;
    }
    result
}
