//! Commands, completion results and handler return flags

use super::pending_acks::AckReservation;
use crate::transport::mqtt::{
    ConnectArgs, MqttError, MqttResult, PublishInfo, SubscribeArgs, SubscribeReasonCode,
};
use std::fmt;

/// Packet identifier value meaning "no identifier assigned"
pub const PACKET_ID_NONE: u16 = 0;

/// Bookkeeping a handler leaves for the driving loop
///
/// Handlers reset the whole structure before populating it, so no field ever
/// survives from a previous invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnFlags {
    /// The command must be tracked until the broker acknowledges `packet_id`
    pub add_acknowledgment: bool,
    /// Identifier assigned to the outgoing packet, [`PACKET_ID_NONE`] if none
    pub packet_id: u16,
    /// The driving loop must stop after this command
    pub end_loop: bool,
}

impl ReturnFlags {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Outcome delivered to a command's completion callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    pub status: MqttResult<()>,
    /// Per-filter results of a SUBACK; empty for every other command
    pub suback_codes: Vec<SubscribeReasonCode>,
    /// Session-present flag of a successful Connect
    pub session_present: Option<bool>,
}

impl CompletionResult {
    pub fn new(status: MqttResult<()>) -> Self {
        Self {
            status,
            suback_codes: Vec::new(),
            session_present: None,
        }
    }

    pub fn success() -> Self {
        Self::new(Ok(()))
    }

    /// Fixed result reported to commands drained by Terminate
    pub fn cancelled() -> Self {
        Self::new(Err(MqttError::Cancelled))
    }

    pub fn with_suback_codes(mut self, codes: Vec<SubscribeReasonCode>) -> Self {
        self.suback_codes = codes;
        self
    }

    pub fn with_session_present(mut self, session_present: bool) -> Self {
        self.session_present = Some(session_present);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

/// Completion capability attached to a command
///
/// Wraps an `FnOnce`, so it can be invoked at most once; invoking it consumes
/// it.
pub struct CompletionCallback(Box<dyn FnOnce(CompletionResult) + Send>);

impl CompletionCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(CompletionResult) + Send + 'static,
    {
        Self(Box::new(callback))
    }

    pub fn invoke(self, result: CompletionResult) {
        (self.0)(result)
    }
}

impl fmt::Debug for CompletionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionCallback")
    }
}

/// The closed set of command kinds, each carrying its own argument
#[derive(Debug)]
pub enum CommandKind {
    ProcessLoop,
    Publish(PublishInfo),
    Subscribe(SubscribeArgs),
    Unsubscribe(SubscribeArgs),
    Ping,
    Connect(ConnectArgs),
    Disconnect,
    Terminate,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::ProcessLoop => "process_loop",
            CommandKind::Publish(_) => "publish",
            CommandKind::Subscribe(_) => "subscribe",
            CommandKind::Unsubscribe(_) => "unsubscribe",
            CommandKind::Ping => "ping",
            CommandKind::Connect(_) => "connect",
            CommandKind::Disconnect => "disconnect",
            CommandKind::Terminate => "terminate",
        }
    }
}

/// A queued unit of work for the agent
#[derive(Debug)]
pub struct Command {
    kind: CommandKind,
    callback: Option<CompletionCallback>,
    /// Pending-ack slot held from enqueue until the command completes
    reservation: Option<AckReservation>,
}

impl Command {
    /// Command without a completion callback
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            callback: None,
            reservation: None,
        }
    }

    pub fn with_callback<F>(kind: CommandKind, callback: F) -> Self
    where
        F: FnOnce(CompletionResult) + Send + 'static,
    {
        Self {
            kind,
            callback: Some(CompletionCallback::new(callback)),
            reservation: None,
        }
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut CommandKind {
        &mut self.kind
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn has_reservation(&self) -> bool {
        self.reservation.is_some()
    }

    pub(crate) fn attach_reservation(&mut self, reservation: AckReservation) {
        self.reservation = Some(reservation);
    }

    /// Resolve the command, invoking its callback if it has one.
    ///
    /// Any reserved pending-ack slot is released.
    pub fn complete(self, result: CompletionResult) {
        let Command {
            callback,
            reservation,
            ..
        } = self;
        drop(reservation);
        if let Some(callback) = callback {
            callback.invoke(result);
        }
    }
}
