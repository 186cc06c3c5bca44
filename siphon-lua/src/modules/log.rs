//! Logging module for connector scripts
//!
//! Scripts call `log.debug/info/warning/error(msg)`. Messages go to a
//! [`LogSink`]; in production that is [`TracingLogSink`], which tags every
//! event with the connector id.

use crate::module::SiphonModule;
use mlua::prelude::*;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Destination of script log messages
pub trait LogSink: Send + Sync {
    fn write(&mut self, level: LogLevel, message: &str);
}

/// Forwards script logs to `tracing`
pub struct TracingLogSink {
    connector: String,
}

impl TracingLogSink {
    pub fn new(connector: impl Into<String>) -> Self {
        Self {
            connector: connector.into(),
        }
    }
}

impl LogSink for TracingLogSink {
    fn write(&mut self, level: LogLevel, message: &str) {
        let connector = self.connector.as_str();
        match level {
            LogLevel::Debug => debug!(connector, "{}", message),
            LogLevel::Info => info!(connector, "{}", message),
            LogLevel::Warning => warn!(connector, "{}", message),
            LogLevel::Error => error!(connector, "{}", message),
        }
    }
}

pub struct LogModule<S: LogSink> {
    sink: Arc<Mutex<S>>,
}

impl<S: LogSink> LogModule<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }
}

impl<S: LogSink + 'static> SiphonModule for LogModule<S> {
    fn id(&self) -> &'static str {
        "log"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let log_table = lua.create_table()?;

        for (name, level) in [
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warning", LogLevel::Warning),
            ("error", LogLevel::Error),
        ] {
            let sink = Arc::clone(&self.sink);
            log_table.set(
                name,
                lua.create_function(move |_, msg: String| {
                    sink.lock()
                        .map_err(|e| LuaError::RuntimeError(format!("Failed to lock sink: {}", e)))?
                        .write(level, &msg);
                    Ok(())
                })?,
            )?;
        }

        lua.globals().set(self.id(), log_table)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Logging for connector scripts
---@class log
log = {}

---Log a debug message
---@param msg string The message to log
function log.debug(msg) end

---Log an info message
---@param msg string The message to log
function log.info(msg) end

---Log a warning message
---@param msg string The message to log
function log.warning(msg) end

---Log an error message
---@param msg string The message to log
function log.error(msg) end
"#
        .to_string()
    }
}
