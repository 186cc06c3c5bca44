//! Stubs API endpoint
//!
//! Serves the LuaLS stub file for connector script authors, so editors
//! on machines without the CLI still get completion.

use axum::Json;
use serde::Serialize;

/// Response containing a stub file
#[derive(Serialize)]
pub struct StubResponse {
    pub name: String,
    pub content: String,
}

/// GET /stubs
pub async fn get_stubs() -> Json<StubResponse> {
    Json(StubResponse {
        name: "siphon.d.lua".to_string(),
        content: siphon_lua::connector_stubs(),
    })
}
