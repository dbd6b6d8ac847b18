//! Command execution layer of the MQTT agent
//!
//! Producers enqueue [`Command`]s through an [`AgentHandle`]. A single task
//! owns the [`AgentContext`] and runs [`command_loop::run`], which executes
//! each command through its handler in [`handlers`] and settles it using the
//! returned [`ReturnFlags`].

pub mod command;
pub mod command_loop;
pub mod context;
pub mod handle;
pub mod handlers;
pub mod pending_acks;
pub mod queue;

pub use command::{
    Command, CommandKind, CompletionCallback, CompletionResult, ReturnFlags, PACKET_ID_NONE,
};
pub use command_loop::{process_command, run};
pub use context::{AgentContext, IncomingPublishCallback, DEFAULT_IDLE_WAIT};
pub use handle::{AgentHandle, PendingCommand, DEFAULT_NETWORK_BUFFER_SIZE};
pub use pending_acks::{AckReservation, AckSlots, PendingAcks, DEFAULT_MAX_OUTSTANDING_ACKS};
pub use queue::{command_channel, CommandSource, Popped};
