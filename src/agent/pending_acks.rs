//! Bounded table of commands awaiting a broker acknowledgment
//!
//! Room in the table is counted by a semaphore shared with producers. An
//! [`AckSlots`] handle lets an [`AgentHandle`](super::AgentHandle) reserve a
//! slot before enqueueing a command that will need one, so a full table is
//! reported to the producer instead of surfacing inside the command loop.

use super::command::{Command, PACKET_ID_NONE};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default capacity of the pending-acknowledgment table
pub const DEFAULT_MAX_OUTSTANDING_ACKS: usize = 20;

/// Producer-side view of the free slots in a [`PendingAcks`] table
#[derive(Debug, Clone)]
pub struct AckSlots {
    semaphore: Arc<Semaphore>,
}

impl AckSlots {
    fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Take a slot without waiting; `None` when every slot is taken
    pub fn try_reserve(&self) -> Option<AckReservation> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| AckReservation { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// One reserved slot; released when dropped
#[derive(Debug)]
pub struct AckReservation {
    _permit: OwnedSemaphorePermit,
}

/// Commands waiting for PUBACK, PUBCOMP, SUBACK or UNSUBACK, keyed by packet identifier
#[derive(Debug)]
pub struct PendingAcks {
    entries: HashMap<u16, Command>,
    capacity: usize,
    slots: AckSlots,
}

impl PendingAcks {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
            slots: AckSlots::new(capacity),
        }
    }

    /// Slot counter to share with producers
    pub fn slots(&self) -> AckSlots {
        self.slots.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a command without a reservation could be tracked now
    pub fn has_space(&self) -> bool {
        self.slots.available() > 0
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.entries.contains_key(&packet_id)
    }

    /// Track `command` until `packet_id` is acknowledged.
    ///
    /// A command that already holds a reservation uses it; any other command
    /// must take a free slot. Hands the command back when no slot is free,
    /// when the identifier is [`PACKET_ID_NONE`], or when the identifier is
    /// already tracked.
    pub fn insert(&mut self, packet_id: u16, mut command: Command) -> Result<(), Command> {
        if packet_id == PACKET_ID_NONE || self.contains(packet_id) {
            return Err(command);
        }
        if !command.has_reservation() {
            match self.slots.try_reserve() {
                Some(reservation) => command.attach_reservation(reservation),
                None => return Err(command),
            }
        }
        self.entries.insert(packet_id, command);
        Ok(())
    }

    pub fn remove(&mut self, packet_id: u16) -> Option<Command> {
        self.entries.remove(&packet_id)
    }

    pub fn get_mut(&mut self, packet_id: u16) -> Option<&mut Command> {
        self.entries.get_mut(&packet_id)
    }

    /// Remove every entry, in ascending packet identifier order
    pub fn drain(&mut self) -> Vec<(u16, Command)> {
        let mut drained: Vec<(u16, Command)> = self.entries.drain().collect();
        drained.sort_by_key(|(packet_id, _)| *packet_id);
        drained
    }
}

impl Default for PendingAcks {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTSTANDING_ACKS)
    }
}
