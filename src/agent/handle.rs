//! Producer-side handle for queueing commands
//!
//! An [`AgentHandle`] is what application tasks hold. It validates requests,
//! enqueues them within a block time and hands back a [`PendingCommand`]
//! that resolves once the agent has completed the command.
//!
//! A handle built with [`AgentHandle::with_ack_slots`] also refuses
//! commands that will wait for a broker acknowledgment while the agent's
//! pending-ack table has no free slot.

use super::command::{Command, CommandKind, CompletionResult};
use super::pending_acks::{AckReservation, AckSlots};
use crate::config::AgentConfig;
use crate::transport::mqtt::{ConnectArgs, MqttError, MqttResult, PublishInfo, SubscribeArgs};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Default maximum encoded publish size
pub const DEFAULT_NETWORK_BUFFER_SIZE: usize = 5000;

/// Completion of a queued command
///
/// Resolves to [`MqttError::Cancelled`] if the agent drops the command
/// without completing it.
#[derive(Debug)]
pub struct PendingCommand {
    receiver: oneshot::Receiver<CompletionResult>,
}

impl PendingCommand {
    fn new() -> (oneshot::Sender<CompletionResult>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self { receiver })
    }

    /// Result if the command has already completed
    pub fn try_result(&mut self) -> Option<CompletionResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(CompletionResult::cancelled()),
        }
    }
}

impl Future for PendingCommand {
    type Output = CompletionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| CompletionResult::cancelled()))
    }
}

/// Cloneable sender side of the agent's command queue
#[derive(Debug, Clone)]
pub struct AgentHandle {
    sender: mpsc::Sender<Command>,
    network_buffer_size: usize,
    ack_slots: Option<AckSlots>,
}

impl AgentHandle {
    pub fn new(sender: mpsc::Sender<Command>) -> Self {
        Self {
            sender,
            network_buffer_size: DEFAULT_NETWORK_BUFFER_SIZE,
            ack_slots: None,
        }
    }

    /// Share the agent's pending-ack slots, see [`AgentContext::ack_slots`](super::AgentContext::ack_slots)
    pub fn with_ack_slots(mut self, slots: AckSlots) -> Self {
        self.ack_slots = Some(slots);
        self
    }

    pub fn from_config(sender: mpsc::Sender<Command>, config: &AgentConfig) -> Self {
        Self::new(sender).with_network_buffer_size(config.agent.network_buffer_size)
    }

    pub fn with_network_buffer_size(mut self, size: usize) -> Self {
        self.network_buffer_size = size;
        self
    }

    pub fn network_buffer_size(&self) -> usize {
        self.network_buffer_size
    }

    /// Whether the agent side of the queue is gone
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub async fn publish(
        &self,
        info: PublishInfo,
        block_time: Duration,
    ) -> MqttResult<PendingCommand> {
        let encoded_len = info.encoded_len();
        if encoded_len >= self.network_buffer_size {
            warn!(
                topic = %info.topic,
                encoded_len,
                network_buffer_size = self.network_buffer_size,
                "Publish does not fit the network buffer"
            );
            return Err(MqttError::BadParameter);
        }
        let reservation = if info.requires_ack() {
            self.reserve_ack_slot()?
        } else {
            None
        };
        self.enqueue(CommandKind::Publish(info), reservation, block_time)
            .await
    }

    pub async fn subscribe(
        &self,
        args: SubscribeArgs,
        block_time: Duration,
    ) -> MqttResult<PendingCommand> {
        if args.is_empty() {
            return Err(MqttError::BadParameter);
        }
        let reservation = self.reserve_ack_slot()?;
        self.enqueue(CommandKind::Subscribe(args), reservation, block_time)
            .await
    }

    pub async fn unsubscribe(
        &self,
        args: SubscribeArgs,
        block_time: Duration,
    ) -> MqttResult<PendingCommand> {
        if args.is_empty() {
            return Err(MqttError::BadParameter);
        }
        let reservation = self.reserve_ack_slot()?;
        self.enqueue(CommandKind::Unsubscribe(args), reservation, block_time)
            .await
    }

    pub async fn connect(
        &self,
        args: ConnectArgs,
        block_time: Duration,
    ) -> MqttResult<PendingCommand> {
        self.enqueue(CommandKind::Connect(args), None, block_time).await
    }

    pub async fn disconnect(&self, block_time: Duration) -> MqttResult<PendingCommand> {
        self.enqueue(CommandKind::Disconnect, None, block_time).await
    }

    pub async fn ping(&self, block_time: Duration) -> MqttResult<PendingCommand> {
        self.enqueue(CommandKind::Ping, None, block_time).await
    }

    pub async fn trigger_process_loop(&self, block_time: Duration) -> MqttResult<PendingCommand> {
        self.enqueue(CommandKind::ProcessLoop, None, block_time).await
    }

    pub async fn terminate(&self, block_time: Duration) -> MqttResult<PendingCommand> {
        self.enqueue(CommandKind::Terminate, None, block_time).await
    }

    /// Enqueue a pre-built command, keeping its own callback
    pub async fn send_command(&self, command: Command, block_time: Duration) -> MqttResult<()> {
        match self.sender.send_timeout(command, block_time).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(command)) => {
                debug!(kind = command.kind().name(), "Command queue stayed full");
                Err(MqttError::SendFailed)
            }
            Err(SendTimeoutError::Closed(_)) => Err(MqttError::IllegalState),
        }
    }

    /// `Ok(None)` when this handle does not track ack slots
    fn reserve_ack_slot(&self) -> MqttResult<Option<AckReservation>> {
        let Some(slots) = &self.ack_slots else {
            return Ok(None);
        };
        match slots.try_reserve() {
            Some(reservation) => Ok(Some(reservation)),
            None => {
                warn!("No free slot to wait for acknowledgment");
                Err(MqttError::NoMemory)
            }
        }
    }

    async fn enqueue(
        &self,
        kind: CommandKind,
        reservation: Option<AckReservation>,
        block_time: Duration,
    ) -> MqttResult<PendingCommand> {
        let (sender, pending) = PendingCommand::new();
        let mut command = Command::with_callback(kind, move |result| {
            // The producer may have stopped waiting
            let _ = sender.send(result);
        });
        if let Some(reservation) = reservation {
            command.attach_reservation(reservation);
        }
        self.send_command(command, block_time).await?;
        Ok(pending)
    }
}
