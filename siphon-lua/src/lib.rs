//! Siphon Lua Connectors
//!
//! Lets connectors be written as sandboxed Lua scripts.
//! It includes:
//! - Module trait and registry for Lua modules
//! - The restricted sandbox every script runs in
//! - `log`, `http` and `browser` modules
//! - `LuaConnector`, the engine connector backed by a script
//! - Directory loading and LuaLS stub generation for script authors

pub mod connector;
pub mod loader;
pub mod module;
pub mod modules;
pub mod sandbox;

pub use connector::LuaConnector;
pub use loader::{load_dir, register_dir};
pub use module::{ModuleRegistry, SiphonModule};
pub use modules::{BrowserModule, HeldLeases, HttpModule, LogModule, LogSink, TracingLogSink};
pub use sandbox::create_sandbox;

/// LuaLS stubs describing everything a connector script can use
pub fn connector_stubs() -> String {
    let mut stubs = sandbox::sandbox_stubs();
    stubs.push('\n');
    stubs.push_str(&LogModule::new(TracingLogSink::new("stubs")).stubs());
    stubs.push('\n');
    stubs.push_str(&HttpModule::new(reqwest::Client::new()).stubs());
    stubs.push('\n');
    stubs.push_str(&BrowserModule::new(None, HeldLeases::new()).stubs());
    stubs.push('\n');
    stubs.push_str(
        r#"---@class Record
---@field title string
---@field summary string
---@field link string
---@field sort_key number|string
---@field image? string
---@field content? string
---@field chapter? string
---@field published? string RFC 3339 timestamp

---@class SourceMeta
---@field name string
---@field link string
---@field sort_key string Name of the record field used as sort key
---@field description? string
---@field language? string
---@field access? "public"|"restricted"|"private"

---@class Connector
---@field id string
---@field is_variety? boolean
---@field supports_old2new? boolean
---@field interval? number Seconds between refreshes
---@field max_wait? number Fetch budget in seconds
---@field describe fun(params: table?): SourceMeta
---@field fetch fun(params: table?): Record[] Newest first
---@field fetch_old2new? fun(params: table?, after: number|string|nil): Record[] Oldest first
"#,
    );
    stubs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_stubs_cover_all_globals() {
        let stubs = connector_stubs();
        assert!(stubs.contains("function invalid_parameters(msg)"));
        assert!(stubs.contains("function log.info(msg)"));
        assert!(stubs.contains("function http.get(url)"));
        assert!(stubs.contains("function browser.context()"));
        assert!(stubs.contains("---@class Connector"));
    }
}
