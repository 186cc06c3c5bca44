//! Configuration module
//!
//! Handles CLI configuration including the hub URL.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the hub service
    pub hub_url: String,
}
