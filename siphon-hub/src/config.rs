//! Hub configuration
//!
//! Every setting comes from the environment and falls back to a default when
//! unset or unparsable.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// Hub configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API and agent endpoint listen on
    pub bind_addr: String,

    /// Agents allowed to register, with their selection weight
    pub known_agents: BTreeMap<String, u32>,

    /// Connectors that always run on an agent, even when registered locally
    pub delegated_connectors: HashSet<String>,

    /// Connectors that skip dedup and cool-down
    pub exempt_connectors: HashSet<String>,

    /// How long the hub waits for an agent reply
    pub reply_timeout: Duration,

    /// Refractory period after a run completes
    pub cool_down: Duration,

    /// Pause between members of one sweep group
    pub politeness_delay: Duration,

    /// Records requested from a source with nothing stored yet
    pub bootstrap_amount: usize,

    /// Directory of Lua connector scripts
    pub connector_dir: Option<PathBuf>,

    /// JSON file with the sweep groups run on a schedule
    pub sweep_file: Option<PathBuf>,

    /// Pause between scheduled sweeps
    pub sweep_interval: Duration,

    pub browser: BrowserConfig,
}

/// Headless browser pool settings, shared with the agent
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

impl BrowserConfig {
    /// Reads `BROWSER_*` variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            command: env_string("BROWSER_COMMAND"),
            max_concurrent: env_parse("BROWSER_MAX_CONCURRENT").unwrap_or(defaults.max_concurrent),
            idle_grace: env_secs("BROWSER_IDLE_GRACE").unwrap_or(defaults.idle_grace),
            profile_dir: env_string("BROWSER_PROFILE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.profile_dir),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            known_agents: BTreeMap::new(),
            delegated_connectors: HashSet::new(),
            exempt_connectors: HashSet::new(),
            reply_timeout: Duration::from_secs(180),
            cool_down: Duration::from_secs(60),
            politeness_delay: Duration::from_secs(2),
            bootstrap_amount: 20,
            connector_dir: None,
            sweep_file: None,
            sweep_interval: Duration::from_secs(600),
            browser: BrowserConfig::default(),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - HUB_BIND_ADDR (default: 0.0.0.0:8080)
    /// - KNOWN_AGENTS (`name[:weight],...`, weight defaults to 1)
    /// - DELEGATED_CONNECTORS, EXEMPT_CONNECTORS (comma separated ids)
    /// - REPLY_TIMEOUT (seconds, default: 180)
    /// - COOL_DOWN (seconds, default: 60)
    /// - POLITENESS_DELAY (seconds, default: 2)
    /// - BOOTSTRAP_AMOUNT (default: 20)
    /// - CONNECTOR_DIR, SWEEP_FILE (paths)
    /// - SWEEP_INTERVAL (seconds, default: 600)
    /// - BROWSER_COMMAND, BROWSER_MAX_CONCURRENT, BROWSER_IDLE_GRACE, BROWSER_PROFILE_DIR
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let known_agents = match env_string("KNOWN_AGENTS") {
            Some(raw) => parse_known_agents(&raw)?,
            None => defaults.known_agents,
        };

        Ok(Self {
            bind_addr: env_string("HUB_BIND_ADDR").unwrap_or(defaults.bind_addr),
            known_agents,
            delegated_connectors: env_list("DELEGATED_CONNECTORS"),
            exempt_connectors: env_list("EXEMPT_CONNECTORS"),
            reply_timeout: env_secs("REPLY_TIMEOUT").unwrap_or(defaults.reply_timeout),
            cool_down: env_secs("COOL_DOWN").unwrap_or(defaults.cool_down),
            politeness_delay: env_secs("POLITENESS_DELAY").unwrap_or(defaults.politeness_delay),
            bootstrap_amount: env_parse("BOOTSTRAP_AMOUNT").unwrap_or(defaults.bootstrap_amount),
            connector_dir: env_string("CONNECTOR_DIR").map(PathBuf::from),
            sweep_file: env_string("SWEEP_FILE").map(PathBuf::from),
            sweep_interval: env_secs("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            browser: BrowserConfig::from_env(),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.reply_timeout.is_zero() {
            anyhow::bail!("reply_timeout must be greater than 0");
        }

        if self.bootstrap_amount == 0 {
            anyhow::bail!("bootstrap_amount must be greater than 0");
        }

        if self.sweep_file.is_some() && self.sweep_interval.is_zero() {
            anyhow::bail!("sweep_interval must be greater than 0 when a sweep file is set");
        }

        if self.browser.command.is_some() && self.browser.max_concurrent == 0 {
            anyhow::bail!("browser max_concurrent must be greater than 0");
        }

        Ok(())
    }
}

/// Parses `name[:weight],...`
pub fn parse_known_agents(raw: &str) -> anyhow::Result<BTreeMap<String, u32>> {
    let mut agents = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, weight) = match entry.split_once(':') {
            Some((name, weight)) => {
                let weight = weight
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| anyhow::anyhow!("invalid weight for agent '{}'", name))?;
                (name.trim(), weight)
            }
            None => (entry, 1),
        };
        if name.is_empty() {
            anyhow::bail!("agent name cannot be empty in '{}'", entry);
        }
        agents.insert(name.to_string(), weight);
    }
    Ok(agents)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.trim().parse::<T>().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

fn env_list(key: &str) -> HashSet<String> {
    env_string(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
