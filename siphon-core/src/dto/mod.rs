//! Data Transfer Objects for inter-service communication
//!
//! This module contains the messages exchanged between the hub and its agents
//! over the persistent channel, and the payloads of the hub HTTP API.

pub mod run;
pub mod wire;
