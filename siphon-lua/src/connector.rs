//! Connectors written in Lua
//!
//! A connector script returns a table:
//!
//! ```lua
//! return {
//!     id = "example",
//!     is_variety = true,          -- needs per-instance params
//!     supports_old2new = false,   -- requires fetch_old2new when true
//!     interval = 600,             -- seconds
//!     max_wait = 60,              -- optional fetch budget, seconds
//!     describe = function(params) return { name = ..., link = ..., sort_key = ... } end,
//!     fetch = function(params) return { ...records, newest first... } end,
//!     fetch_old2new = function(params, after) return { ...records, oldest first... } end,
//! }
//! ```
//!
//! Every instance gets its own sandbox, so scripts may keep state in upvalues
//! without leaking it across runs. Browser contexts a script leases through
//! `browser.context()` belong to the instance and are released when it is
//! destroyed.

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use mlua::prelude::*;
use mlua::{DeserializeOptions, MultiValue, SerializeOptions};
use serde_json::Value;
use siphon_core::domain::article::{ArticleRecord, SortValue};
use siphon_core::domain::connector::ConnectorDescriptor;
use siphon_core::domain::source::SourceMeta;
use siphon_core::{CrawlError, Result};
use siphon_engine::{Connector, ConnectorInstance, CrawlContext, RecordStream, ResourcePool};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::module::ModuleRegistry;
use crate::modules::{BrowserModule, HeldLeases, HttpModule, LogModule, TracingLogSink};
use crate::sandbox::{INVALID_PARAMETERS_MARKER, create_sandbox};

pub struct LuaConnector {
    descriptor: ConnectorDescriptor,
    chunk_name: String,
    source: Arc<str>,
}

impl LuaConnector {
    /// Evaluates a script once to read its descriptor
    ///
    /// # Errors
    /// `Unknown` if the script fails to evaluate or its table is malformed.
    pub fn from_source(chunk_name: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let chunk_name = chunk_name.into();
        let source: Arc<str> = Arc::from(source.into());

        let sandbox = Sandbox {
            connector_id: "loader",
            http: reqwest::Client::new(),
            browser: None,
            leases: HeldLeases::new(),
        };
        let (_lua, table) = instantiate(&chunk_name, &source, sandbox)
            .map_err(|e| CrawlError::Unknown(format!("{}: {}", chunk_name, e)))?;
        let descriptor = read_descriptor(&table)
            .map_err(|e| CrawlError::Unknown(format!("{}: {}", chunk_name, e)))?;
        debug!(connector = %descriptor.id, chunk = %chunk_name, "loaded lua connector");

        Ok(Self {
            descriptor,
            chunk_name,
            source,
        })
    }
}

/// Host resources exposed to one sandbox
struct Sandbox<'a> {
    connector_id: &'a str,
    http: reqwest::Client,
    browser: Option<Arc<ResourcePool>>,
    leases: HeldLeases,
}

/// Fresh sandbox with all modules installed and the script evaluated
fn instantiate(chunk_name: &str, source: &str, sandbox: Sandbox<'_>) -> LuaResult<(Lua, LuaTable)> {
    let lua = create_sandbox()?;

    let mut modules = ModuleRegistry::new();
    modules
        .register(LogModule::new(TracingLogSink::new(sandbox.connector_id)))?
        .register(HttpModule::new(sandbox.http))?
        .register(BrowserModule::new(sandbox.browser, sandbox.leases))?;
    modules.register_all(&lua)?;

    let table: LuaTable = lua.load(source).set_name(chunk_name).eval()?;
    Ok((lua, table))
}

fn read_descriptor(table: &LuaTable) -> LuaResult<ConnectorDescriptor> {
    let id: String = table.get("id")?;
    let mut descriptor = ConnectorDescriptor::new(id);

    if !matches!(table.get::<LuaValue>("fetch")?, LuaValue::Function(_)) {
        return Err(LuaError::RuntimeError("missing fetch function".to_string()));
    }
    if !matches!(table.get::<LuaValue>("describe")?, LuaValue::Function(_)) {
        return Err(LuaError::RuntimeError("missing describe function".to_string()));
    }

    if table.get::<Option<bool>>("is_variety")?.unwrap_or(false) {
        descriptor = descriptor.variety();
    }
    if table.get::<Option<bool>>("supports_old2new")?.unwrap_or(false) {
        if !matches!(table.get::<LuaValue>("fetch_old2new")?, LuaValue::Function(_)) {
            return Err(LuaError::RuntimeError(
                "supports_old2new requires a fetch_old2new function".to_string(),
            ));
        }
        descriptor = descriptor.old2new();
    }
    if let Some(secs) = table.get::<Option<f64>>("interval")? {
        descriptor = descriptor.with_interval(seconds(secs)?);
    }
    if let Some(secs) = table.get::<Option<f64>>("max_wait")? {
        descriptor = descriptor.with_max_wait(seconds(secs)?);
    }

    Ok(descriptor)
}

fn seconds(secs: f64) -> LuaResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| LuaError::RuntimeError(format!("invalid duration {}: {}", secs, e)))
}

fn to_lua_options() -> SerializeOptions {
    SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false)
}

fn from_lua_options() -> DeserializeOptions {
    DeserializeOptions::new().deny_unsupported_types(false)
}

/// Maps a script failure onto the crawl taxonomy
fn script_error(connector_id: &str, err: LuaError) -> CrawlError {
    let text = err.to_string();
    if let Some(pos) = text.find(INVALID_PARAMETERS_MARKER) {
        let message = text[pos + INVALID_PARAMETERS_MARKER.len()..]
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        return CrawlError::InvalidParameters(message);
    }

    match err {
        LuaError::SyntaxError { message, .. } => {
            CrawlError::Unknown(format!("{}: {}", connector_id, message))
        }
        _ => CrawlError::RequestFailed(format!("{}: {}", connector_id, text)),
    }
}

#[async_trait]
impl Connector for LuaConnector {
    fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    async fn create(
        &self,
        ctx: &CrawlContext,
        params: &Value,
    ) -> Result<Box<dyn ConnectorInstance>> {
        let connector_id = self.descriptor.id.clone();
        let fail = |e: LuaError| script_error(&connector_id, e);

        let leases = HeldLeases::new();
        let sandbox = Sandbox {
            connector_id: &connector_id,
            http: ctx.http.clone(),
            browser: ctx.browser().cloned(),
            leases: leases.clone(),
        };
        let (lua, table) = instantiate(&self.chunk_name, &self.source, sandbox).map_err(fail)?;
        let params = lua.to_value_with(params, to_lua_options()).map_err(fail)?;

        let meta = match describe(&lua, &table, params.clone()).await {
            Ok(meta) => meta,
            Err(e) => {
                leases.release_all().await;
                return Err(fail(e));
            }
        };

        Ok(Box::new(LuaInstance {
            connector_id: connector_id.clone(),
            meta,
            lua,
            table,
            params,
            leases,
        }))
    }
}

async fn describe(lua: &Lua, table: &LuaTable, params: LuaValue) -> LuaResult<SourceMeta> {
    let describe: LuaFunction = table.get("describe")?;
    let meta: LuaValue = describe.call_async(params).await?;
    lua.from_value_with(meta, from_lua_options())
}

struct LuaInstance {
    connector_id: String,
    meta: SourceMeta,
    lua: Lua,
    table: LuaTable,
    params: LuaValue,
    leases: HeldLeases,
}

impl LuaInstance {
    async fn call_records(&self, function: &str, args: MultiValue) -> Result<Vec<ArticleRecord>> {
        let fail = |e: LuaError| script_error(&self.connector_id, e);

        let func: LuaFunction = self.table.get(function).map_err(fail)?;
        let value: LuaValue = func.call_async(args).await.map_err(fail)?;
        match value {
            LuaValue::Nil => Ok(Vec::new()),
            LuaValue::Table(ref t) if t.raw_len() == 0 => Ok(Vec::new()),
            value => self
                .lua
                .from_value_with(value, from_lua_options())
                .map_err(fail),
        }
    }

    fn records(&self, function: &'static str, args: MultiValue) -> RecordStream<'_> {
        stream::once(self.call_records(function, args))
            .map_ok(|records| stream::iter(records.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}

#[async_trait]
impl ConnectorInstance for LuaInstance {
    fn describe(&self) -> SourceMeta {
        self.meta.clone()
    }

    fn new_to_old(&self) -> RecordStream<'_> {
        self.records("fetch", MultiValue::from_vec(vec![self.params.clone()]))
    }

    fn old_to_new<'a>(&'a self, after: Option<&'a SortValue>) -> RecordStream<'a> {
        match self.lua.to_value_with(&after, to_lua_options()) {
            Ok(after) => self.records(
                "fetch_old2new",
                MultiValue::from_vec(vec![self.params.clone(), after]),
            ),
            Err(e) => {
                let err = script_error(&self.connector_id, e);
                stream::once(future::ready(Err(err))).boxed()
            }
        }
    }

    async fn destroy(&self) {
        if !self.leases.is_empty() {
            debug!(connector = %self.connector_id, leases = self.leases.len(), "returning browser leases");
        }
        self.leases.release_all().await;
    }
}
