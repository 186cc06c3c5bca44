//! HTTP module for connector scripts
//!
//! The only way a script reaches the network. Both functions are async and
//! must be called from `describe`/`fetch`, which the connector runs as
//! coroutines.

use crate::module::SiphonModule;
use mlua::prelude::*;
use tracing::debug;

pub struct HttpModule {
    client: reqwest::Client,
}

impl HttpModule {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

async fn get(client: &reqwest::Client, url: &str) -> LuaResult<reqwest::Response> {
    debug!(url, "script http.get");
    let response = client.get(url).send().await.map_err(LuaError::external)?;
    let status = response.status();
    if !status.is_success() {
        return Err(LuaError::RuntimeError(format!(
            "GET {} returned {}",
            url, status
        )));
    }
    Ok(response)
}

impl SiphonModule for HttpModule {
    fn id(&self) -> &'static str {
        "http"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let http = lua.create_table()?;

        let client = self.client.clone();
        http.set(
            "get",
            lua.create_async_function(move |_, url: String| {
                let client = client.clone();
                async move {
                    let response = get(&client, &url).await?;
                    response.text().await.map_err(LuaError::external)
                }
            })?,
        )?;

        let client = self.client.clone();
        http.set(
            "get_json",
            lua.create_async_function(move |lua, url: String| {
                let client = client.clone();
                async move {
                    let response = get(&client, &url).await?;
                    let body: serde_json::Value =
                        response.json().await.map_err(LuaError::external)?;
                    lua.to_value(&body)
                }
            })?,
        )?;

        lua.globals().set(self.id(), http)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Network access for connector scripts
---@class http
http = {}

---Fetch a URL and return the response body
---@param url string
---@return string body
function http.get(url) end

---Fetch a URL and decode the JSON response body
---@param url string
---@return any value
function http.get_json(url) end
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_module_registration() {
        let lua = Lua::new();
        HttpModule::new(reqwest::Client::new())
            .register(&lua)
            .unwrap();

        let result: bool = lua
            .load("return type(http.get) == 'function' and type(http.get_json) == 'function'")
            .eval()
            .unwrap();
        assert!(result);
    }

    #[tokio::test]
    async fn test_http_get_reports_connection_errors() {
        let lua = Lua::new();
        HttpModule::new(reqwest::Client::new())
            .register(&lua)
            .unwrap();

        let result: LuaResult<String> = lua
            .load(r#"return http.get("http://127.0.0.1:9/unreachable")"#)
            .eval_async()
            .await;
        assert!(result.is_err());
    }
}
