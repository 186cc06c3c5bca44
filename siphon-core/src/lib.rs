//! Siphon Core
//!
//! Core types and abstractions for the Siphon crawl engine.
//!
//! This crate contains:
//! - Domain types: connectors, source metadata, article records, resume markers
//! - DTOs: the hub/agent wire protocol and the hub HTTP API payloads
//! - The typed error taxonomy and canonical run identities

pub mod domain;
pub mod dto;
pub mod error;
pub mod identity;

pub use error::{CrawlError, Result};
pub use identity::RunIdentity;
