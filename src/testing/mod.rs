//! Testing utilities and mock implementations
//!
//! This module provides a scripted protocol engine for exercising the agent
//! without a running MQTT broker.

pub mod mocks;

pub use mocks::*;
