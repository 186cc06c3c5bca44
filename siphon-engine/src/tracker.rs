//! Run admission
//!
//! Tracks every run identity through `absent -> running -> refractory ->
//! absent`. A running or refractory identity cannot be admitted again. The
//! refractory phase lasts a fixed cool-down after the run ends, and expired
//! entries are purged lazily on the next admission.

use siphon_core::{CrawlError, Result, RunIdentity};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Observable phase of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Running,
    Refractory,
}

#[derive(Debug, Clone, Copy)]
enum RunState {
    Running,
    Refractory { until: Instant },
}

/// Process-wide set of running and cooling-down identities
pub struct RunTracker {
    cool_down: Duration,
    /// Connector ids that bypass dedup entirely (one-off or manual sources)
    exempt: HashSet<String>,
    states: Mutex<HashMap<RunIdentity, RunState>>,
}

impl RunTracker {
    pub fn new(cool_down: Duration) -> Self {
        Self {
            cool_down,
            exempt: HashSet::new(),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Exempts the given connector ids from dedup
    pub fn with_exempt<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn cool_down(&self) -> Duration {
        self.cool_down
    }

    /// Admits a run of `identity`
    ///
    /// The returned guard marks the identity running; dropping it starts the
    /// refractory phase.
    ///
    /// # Errors
    /// `DuplicateRun` if the identity is running or refractory.
    pub fn admit(self: &Arc<Self>, identity: RunIdentity) -> Result<RunGuard> {
        if self.exempt.contains(identity.connector_id()) {
            debug!(%identity, "identity exempt from dedup");
            return Ok(RunGuard {
                tracker: None,
                identity,
            });
        }

        let mut states = self.lock();
        let now = Instant::now();
        states.retain(|_, state| match state {
            RunState::Running => true,
            RunState::Refractory { until } => *until > now,
        });

        if states.contains_key(&identity) {
            return Err(CrawlError::DuplicateRun(identity.to_string()));
        }
        states.insert(identity.clone(), RunState::Running);

        Ok(RunGuard {
            tracker: Some(Arc::clone(self)),
            identity,
        })
    }

    /// Current phase of an identity, `None` when absent
    pub fn phase(&self, identity: &RunIdentity) -> Option<RunPhase> {
        let states = self.lock();
        match states.get(identity) {
            Some(RunState::Running) => Some(RunPhase::Running),
            Some(RunState::Refractory { until }) if *until > Instant::now() => {
                Some(RunPhase::Refractory)
            }
            _ => None,
        }
    }

    /// Number of identities currently running
    pub fn running(&self) -> usize {
        self.lock()
            .values()
            .filter(|state| matches!(state, RunState::Running))
            .count()
    }

    fn finish(&self, identity: &RunIdentity) {
        let mut states = self.lock();
        if self.cool_down.is_zero() {
            states.remove(identity);
        } else {
            states.insert(
                identity.clone(),
                RunState::Refractory {
                    until: Instant::now() + self.cool_down,
                },
            );
        }
        debug!(%identity, cool_down = ?self.cool_down, "run finished");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RunIdentity, RunState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Admission of one run; dropping it moves the identity to refractory
#[must_use = "dropping the guard ends the run immediately"]
pub struct RunGuard {
    tracker: Option<Arc<RunTracker>>,
    identity: RunIdentity,
}

impl RunGuard {
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            tracker.finish(&self.identity);
        }
    }
}
