//! Agent configuration
//!
//! Defines all configurable parameters for the agent including hub
//! connection, session lifetime and reconnection settings.

use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Name the agent registers under; must be known to the hub
    pub agent_name: String,

    /// Hub agent endpoint (e.g., "ws://localhost:8080/agent/ws")
    pub hub_url: String,

    /// Directory of Lua connector scripts
    pub connector_dir: Option<PathBuf>,

    /// Refractory period after a session completes
    pub cool_down: Duration,

    /// How long a started session waits for `continue`
    pub session_ttl: Duration,

    pub reconnect: ReconnectConfig,

    pub browser: BrowserConfig,
}

/// Reconnection backoff settings
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each delay by up to a quarter either way
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Headless browser pool settings
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Command line launching the browser; no pool when unset
    pub command: Option<String>,
    pub max_concurrent: usize,
    pub idle_grace: Duration,
    pub profile_dir: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            command: None,
            max_concurrent: 2,
            idle_grace: Duration::from_secs(30),
            profile_dir: std::env::temp_dir().join("siphon-browser"),
        }
    }
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(agent_name: String, hub_url: String) -> Self {
        Self {
            agent_name,
            hub_url,
            connector_dir: None,
            cool_down: Duration::from_secs(60),
            session_ttl: Duration::from_secs(300),
            reconnect: ReconnectConfig::default(),
            browser: BrowserConfig::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - HUB_URL (required)
    /// - AGENT_NAME (optional, default: random uuid)
    /// - CONNECTOR_DIR (optional)
    /// - COOL_DOWN (optional, seconds, default: 60)
    /// - SESSION_TTL (optional, seconds, default: 300)
    /// - RECONNECT_INITIAL_DELAY (optional, milliseconds, default: 500)
    /// - RECONNECT_MAX_DELAY (optional, seconds, default: 30)
    /// - BROWSER_COMMAND, BROWSER_MAX_CONCURRENT, BROWSER_IDLE_GRACE, BROWSER_PROFILE_DIR
    pub fn from_env() -> anyhow::Result<Self> {
        let hub_url = std::env::var("HUB_URL")
            .map_err(|_| anyhow::anyhow!("HUB_URL environment variable not set"))?;

        let agent_name = env_string("AGENT_NAME").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut config = Self::new(agent_name, hub_url);
        config.connector_dir = env_string("CONNECTOR_DIR").map(PathBuf::from);

        if let Some(cool_down) = env_parse::<u64>("COOL_DOWN") {
            config.cool_down = Duration::from_secs(cool_down);
        }
        if let Some(ttl) = env_parse::<u64>("SESSION_TTL") {
            config.session_ttl = Duration::from_secs(ttl);
        }
        if let Some(ms) = env_parse::<u64>("RECONNECT_INITIAL_DELAY") {
            config.reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("RECONNECT_MAX_DELAY") {
            config.reconnect.max_delay = Duration::from_secs(secs);
        }

        config.browser.command = env_string("BROWSER_COMMAND");
        if let Some(max) = env_parse::<usize>("BROWSER_MAX_CONCURRENT") {
            config.browser.max_concurrent = max;
        }
        if let Some(grace) = env_parse::<u64>("BROWSER_IDLE_GRACE") {
            config.browser.idle_grace = Duration::from_secs(grace);
        }
        if let Some(dir) = env_string("BROWSER_PROFILE_DIR") {
            config.browser.profile_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent_name.is_empty() {
            anyhow::bail!("agent_name cannot be empty");
        }

        if !self.hub_url.starts_with("ws://") && !self.hub_url.starts_with("wss://") {
            anyhow::bail!("hub_url must start with ws:// or wss://");
        }

        if self.session_ttl.is_zero() {
            anyhow::bail!("session_ttl must be greater than 0");
        }

        if self.reconnect.initial_delay.is_zero() {
            anyhow::bail!("reconnect initial_delay must be greater than 0");
        }

        if self.reconnect.max_delay < self.reconnect.initial_delay {
            anyhow::bail!("reconnect max_delay must not be below initial_delay");
        }

        if self.browser.command.is_some() && self.browser.max_concurrent == 0 {
            anyhow::bail!("browser max_concurrent must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "ws://localhost:8080/agent/ws".to_string(),
        )
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session_ttl, Duration::from_secs(300));
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(500));
        assert!(config.browser.command.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Empty agent_name should fail
        config.agent_name = String::new();
        assert!(config.validate().is_err());

        config.agent_name = "edge-1".to_string();

        // HTTP URL should fail, the hub is reached over WebSocket
        config.hub_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_err());

        config.hub_url = "wss://hub.example/agent/ws".to_string();
        assert!(config.validate().is_ok());

        config.reconnect.max_delay = Duration::from_millis(10);
        assert!(config.validate().is_err());
    }
}
