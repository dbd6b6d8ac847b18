//! Command sources feeding the agent

use super::command::Command;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of a bounded wait on a command source
#[derive(Debug)]
pub enum Popped {
    Command(Command),
    /// The wait elapsed with nothing queued
    Idle,
    /// No producer can enqueue anything anymore
    Closed,
}

/// Source of queued commands
#[async_trait]
pub trait CommandSource: Send {
    /// Non-blocking pop. Returns `None` when nothing is queued right now.
    fn try_pop(&mut self) -> Option<Command>;

    /// Wait at most `wait` for the next command
    async fn pop(&mut self, wait: Duration) -> Popped;

    /// Number of commands queued right now
    fn queued(&self) -> usize;
}

#[async_trait]
impl CommandSource for mpsc::Receiver<Command> {
    fn try_pop(&mut self) -> Option<Command> {
        self.try_recv().ok()
    }

    async fn pop(&mut self, wait: Duration) -> Popped {
        match tokio::time::timeout(wait, self.recv()).await {
            Ok(Some(command)) => Popped::Command(command),
            Ok(None) => Popped::Closed,
            Err(_) => Popped::Idle,
        }
    }

    fn queued(&self) -> usize {
        self.len()
    }
}

/// A fixed batch of commands; an empty deque counts as closed
#[async_trait]
impl CommandSource for VecDeque<Command> {
    fn try_pop(&mut self) -> Option<Command> {
        self.pop_front()
    }

    async fn pop(&mut self, _wait: Duration) -> Popped {
        match self.pop_front() {
            Some(command) => Popped::Command(command),
            None => Popped::Closed,
        }
    }

    fn queued(&self) -> usize {
        self.len()
    }
}

/// Create the bounded command queue shared by producers and the agent
pub fn command_channel(capacity: usize) -> (mpsc::Sender<Command>, mpsc::Receiver<Command>) {
    mpsc::channel(capacity.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::command::CommandKind;

    #[tokio::test]
    async fn test_receiver_try_pop_is_non_blocking() {
        let (tx, mut rx) = command_channel(4);
        assert!(rx.try_pop().is_none());

        tx.send(Command::new(CommandKind::Ping)).await.unwrap();
        let command = rx.try_pop().expect("command should be queued");
        assert!(matches!(command.kind(), CommandKind::Ping));
        assert!(rx.try_pop().is_none());
    }

    #[tokio::test]
    async fn test_receiver_pop_times_out_when_idle() {
        let (_tx, mut rx) = command_channel(4);
        let popped = rx.pop(Duration::from_millis(10)).await;
        assert!(matches!(popped, Popped::Idle));
    }

    #[tokio::test]
    async fn test_receiver_pop_reports_closed() {
        let (tx, mut rx) = command_channel(4);
        drop(tx);
        let popped = rx.pop(Duration::from_millis(10)).await;
        assert!(matches!(popped, Popped::Closed));
    }

    #[tokio::test]
    async fn test_receiver_pop_returns_queued_command() {
        let (tx, mut rx) = command_channel(4);
        tx.send(Command::new(CommandKind::Disconnect)).await.unwrap();
        match rx.pop(Duration::from_secs(1)).await {
            Popped::Command(command) => assert!(matches!(command.kind(), CommandKind::Disconnect)),
            other => panic!("Expected a command, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deque_source_preserves_order() {
        let mut source: VecDeque<Command> = VecDeque::new();
        source.push_back(Command::new(CommandKind::Ping));
        source.push_back(Command::new(CommandKind::Terminate));

        assert!(matches!(source.try_pop().unwrap().kind(), CommandKind::Ping));
        match source.pop(Duration::ZERO).await {
            Popped::Command(command) => assert!(matches!(command.kind(), CommandKind::Terminate)),
            other => panic!("Expected a command, got {other:?}"),
        }
        assert!(matches!(source.pop(Duration::ZERO).await, Popped::Closed));
    }

    #[tokio::test]
    async fn test_queued_reports_depth() {
        let (tx, mut rx) = command_channel(4);
        assert_eq!(rx.queued(), 0);

        tx.send(Command::new(CommandKind::Ping)).await.unwrap();
        tx.send(Command::new(CommandKind::Ping)).await.unwrap();
        assert_eq!(rx.queued(), 2);

        rx.try_pop().unwrap();
        assert_eq!(rx.queued(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (tx, _rx) = command_channel(0);
        assert_eq!(tx.max_capacity(), 1);
    }
}
