//! Browser module for connector scripts
//!
//! Gives a script an isolated context of the shared headless browser. The
//! context is leased from the resource pool on first use and held by the
//! connector instance until it is destroyed or the script releases it.

use crate::module::SiphonModule;
use mlua::prelude::*;
use siphon_engine::{Lease, ResourcePool};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Leases held by one connector instance
#[derive(Clone, Default)]
pub struct HeldLeases(Arc<Mutex<Vec<Lease>>>);

impl HeldLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leases currently held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, lease: Lease) {
        self.lock().push(lease);
    }

    fn first_context(&self) -> Option<(String, String)> {
        self.lock().first().map(|lease| {
            let context = lease.context();
            (
                context.id.clone(),
                context.profile_dir.to_string_lossy().into_owned(),
            )
        })
    }

    /// Releases every held lease back to the pool
    pub async fn release_all(&self) {
        let leases: Vec<Lease> = self.lock().drain(..).collect();
        for lease in leases {
            debug!(context = %lease.context().id, "releasing browser lease");
            lease.release().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Lease>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct BrowserModule {
    pool: Option<Arc<ResourcePool>>,
    leases: HeldLeases,
}

impl BrowserModule {
    pub fn new(pool: Option<Arc<ResourcePool>>, leases: HeldLeases) -> Self {
        Self { pool, leases }
    }
}

fn context_table(lua: &Lua, (id, profile_dir): (String, String)) -> LuaResult<LuaTable> {
    let table = lua.create_table()?;
    table.set("id", id)?;
    table.set("profile_dir", profile_dir)?;
    Ok(table)
}

impl SiphonModule for BrowserModule {
    fn id(&self) -> &'static str {
        "browser"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let browser = lua.create_table()?;

        let pool = self.pool.clone();
        let leases = self.leases.clone();
        browser.set(
            "context",
            lua.create_async_function(move |lua, ()| {
                let pool = pool.clone();
                let leases = leases.clone();
                async move {
                    if let Some(held) = leases.first_context() {
                        return context_table(&lua, held);
                    }
                    let pool = pool.ok_or_else(|| {
                        LuaError::RuntimeError("no browser pool configured".to_string())
                    })?;
                    let lease = pool.acquire().await.map_err(LuaError::external)?;
                    leases.push(lease);
                    let held = leases.first_context().ok_or_else(|| {
                        LuaError::RuntimeError("browser lease vanished".to_string())
                    })?;
                    context_table(&lua, held)
                }
            })?,
        )?;

        let leases = self.leases.clone();
        browser.set(
            "release",
            lua.create_async_function(move |_, ()| {
                let leases = leases.clone();
                async move {
                    leases.release_all().await;
                    Ok(())
                }
            })?,
        )?;

        lua.globals().set(self.id(), browser)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Isolated context of the shared headless browser
---@class BrowserContext
---@field id string
---@field profile_dir string Private profile directory, removed on release

---Shared headless browser, leased per connector instance
---@class browser
browser = {}

---Lease a browser context, or return the one already held
---Waits while the pool is at capacity.
---@return BrowserContext
function browser.context() end

---Give the held context back before the run ends
function browser.release() end
"#
        .to_string()
    }
}
