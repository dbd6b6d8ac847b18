//! MQTT agent - Rust Implementation
//!
//! A single-writer MQTT client agent. Application tasks enqueue commands;
//! one task owns the MQTT protocol engine and executes those commands one at
//! a time, so the connection is never touched concurrently.
//!
//! # Overview
//!
//! - [`agent::handlers`] - One handler per command kind, reporting its
//!   bookkeeping through [`ReturnFlags`]
//! - [`agent::command_loop`] - The driving loop that settles each command
//! - [`agent::AgentHandle`] - Producer API returning awaitable completions
//! - [`transport::MqttEngine`] - The protocol engine contract
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_agent::agent::{command_channel, command_loop, AgentContext, AgentHandle};
//! use mqtt_agent::testing::MockEngine;
//! use mqtt_agent::transport::mqtt::{ConnectArgs, ConnectInfo, PublishInfo, QoS};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let (sender, receiver) = command_channel(8);
//! let mut ctx = AgentContext::new(MockEngine::loopback(), receiver);
//! let handle = AgentHandle::new(sender).with_ack_slots(ctx.ack_slots());
//! let agent = tokio::spawn(async move { command_loop::run(&mut ctx).await });
//!
//! let block = Duration::from_millis(100);
//! let connect = ConnectArgs::new(ConnectInfo::new("doc-agent"), block);
//! assert!(handle.connect(connect, block).await.unwrap().await.is_success());
//!
//! let publish = PublishInfo::new("status", QoS::AtLeastOnce, "online");
//! assert!(handle.publish(publish, block).await.unwrap().await.is_success());
//!
//! handle.disconnect(block).await.unwrap().await;
//! assert!(agent.await.unwrap().is_ok());
//! # });
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod observability;
pub mod testing;
pub mod transport;

pub use agent::{AgentContext, AgentHandle, Command, CommandKind, CompletionResult, ReturnFlags};
pub use config::*;
pub use error::{AgentError, AgentResult};
pub use transport::mqtt::{MqttError, MqttResult};
pub use transport::MqttEngine;
