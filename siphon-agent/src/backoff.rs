//! Reconnection backoff
//!
//! Exponential backoff with optional jitter, capped at the configured maximum.
//! The agent retries forever; a successful registration resets the delay.

use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ReconnectConfig;

pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
    current_delay: Duration,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            attempt: 0,
            current_delay,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Resets the retry state after a successful registration
    pub fn reset(&mut self) {
        if self.attempt > 0 {
            debug!(attempts = self.attempt, "connection established, reset retry state");
        }
        self.attempt = 0;
        self.current_delay = self.config.initial_delay;
    }

    /// Delay before the next attempt; grows the following one
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let delay = self.current_delay;
        let delay = if self.config.jitter {
            let spread = delay.as_secs_f64() * 0.25;
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.001))
        } else {
            delay
        };

        let next = self.current_delay.as_secs_f64() * self.config.backoff_multiplier;
        self.current_delay = Duration::from_secs_f64(next).min(self.config.max_delay);

        warn!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnection attempt"
        );
        delay
    }
}
