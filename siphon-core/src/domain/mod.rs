//! Core domain types
//!
//! This module contains the structures shared by the hub (which persists and
//! serves them) and agents (which produce them by running connectors).

pub mod agent;
pub mod article;
pub mod connector;
pub mod locate;
pub mod source;
