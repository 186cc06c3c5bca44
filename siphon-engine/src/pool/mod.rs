//! Headless browser resource pool
//!
//! Bounds concurrent use of one shared browser engine. The engine is launched
//! lazily by the first acquire and shut down once the pool has been idle for
//! a grace period. Each lease owns an isolated execution context until it is
//! released.

mod process;

pub use process::ProcessLauncher;

use async_trait::async_trait;
use siphon_core::{CrawlError, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Isolated browsing context inside the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub id: String,
    pub profile_dir: PathBuf,
}

/// Starts the engine process
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Engine>>;
}

/// A running engine
#[async_trait]
pub trait Engine: Send + Sync {
    async fn open_context(&self) -> Result<ExecutionContext>;
    async fn close_context(&self, context: &ExecutionContext);
    async fn shutdown(&self);
}

#[derive(Debug, Default)]
struct Counters {
    active: usize,
    waiting: usize,
}

pub struct ResourcePool {
    launcher: Arc<dyn EngineLauncher>,
    max_concurrent: usize,
    idle_grace: Duration,
    semaphore: Arc<Semaphore>,
    counters: Mutex<Counters>,
    /// Single creator: whoever holds this lock launches or tears down
    engine: tokio::sync::Mutex<Option<Arc<dyn Engine>>>,
}

impl ResourcePool {
    pub fn new(
        launcher: Arc<dyn EngineLauncher>,
        max_concurrent: usize,
        idle_grace: Duration,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            launcher,
            max_concurrent,
            idle_grace,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            counters: Mutex::new(Counters::default()),
            engine: tokio::sync::Mutex::new(None),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Leases currently checked out
    pub fn active(&self) -> usize {
        self.counters().active
    }

    /// Callers blocked waiting for a free slot
    pub fn waiting(&self) -> usize {
        self.counters().waiting
    }

    pub async fn is_launched(&self) -> bool {
        self.engine.lock().await.is_some()
    }

    /// Waits for a free slot and opens a fresh context in it
    ///
    /// # Errors
    /// Whatever the launcher or engine reports while launching or opening the
    /// context; the slot is released again in that case.
    pub async fn acquire(self: &Arc<Self>) -> Result<Lease> {
        let permit = {
            let _waiting = Waiting::enter(self);
            Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| CrawlError::Unknown("resource pool closed".to_string()))?
        };

        self.counters().active += 1;
        let slot = Slot {
            pool: Arc::clone(self),
            permit: Some(permit),
        };

        let engine = self.engine().await?;
        let context = engine.open_context().await?;
        debug!(context = %context.id, active = self.active(), "lease acquired");

        Ok(Lease {
            engine,
            context,
            slot: Some(slot),
            released: false,
        })
    }

    async fn engine(&self) -> Result<Arc<dyn Engine>> {
        let mut engine = self.engine.lock().await;
        if let Some(engine) = engine.as_ref() {
            return Ok(Arc::clone(engine));
        }

        info!("launching browser engine");
        let launched = self.launcher.launch().await?;
        *engine = Some(Arc::clone(&launched));
        Ok(launched)
    }

    fn schedule_idle_check(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let pool = Arc::clone(self);
        handle.spawn(async move {
            tokio::time::sleep(pool.idle_grace).await;
            pool.teardown_if_idle().await;
        });
    }

    /// Shuts the engine down if nobody holds or waits for a lease
    async fn teardown_if_idle(&self) {
        let mut engine = self.engine.lock().await;
        {
            let counters = self.counters();
            if counters.active > 0 || counters.waiting > 0 {
                return;
            }
        }

        if let Some(engine) = engine.take() {
            info!("browser engine idle, shutting down");
            engine.shutdown().await;
        }
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Counts a caller as waiting for as long as it is alive
struct Waiting<'a>(&'a ResourcePool);

impl<'a> Waiting<'a> {
    fn enter(pool: &'a ResourcePool) -> Self {
        pool.counters().waiting += 1;
        Self(pool)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.counters().waiting -= 1;
    }
}

/// An occupied pool slot; freeing it schedules the idle check
struct Slot {
    pool: Arc<ResourcePool>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.pool.counters().active -= 1;
        self.permit.take();
        self.pool.schedule_idle_check();
    }
}

/// Exclusive use of one execution context
pub struct Lease {
    engine: Arc<dyn Engine>,
    context: ExecutionContext,
    slot: Option<Slot>,
    released: bool,
}

impl Lease {
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Closes the context and frees the slot
    pub async fn release(mut self) {
        self.released = true;
        self.engine.close_context(&self.context).await;
        self.slot.take();
        debug!(context = %self.context.id, "lease released");
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let engine = Arc::clone(&self.engine);
        let context = self.context.clone();
        let slot = self.slot.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    engine.close_context(&context).await;
                    drop(slot);
                });
            }
            Err(_) => {
                warn!(context = %context.id, "lease dropped outside a runtime, context left open");
                drop(slot);
            }
        }
    }
}
