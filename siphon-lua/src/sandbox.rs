//! Lua sandbox creation
//!
//! Connector scripts run in a restricted Lua state without filesystem,
//! process or module-loading access. Network access goes exclusively through
//! the `http` module registered by the caller.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};

/// Prefix that marks a script error as a parameter validation failure
pub const INVALID_PARAMETERS_MARKER: &str = "siphon:invalid_parameters:";

/// Create a restricted Lua sandbox
///
/// Only TABLE, STRING, MATH and COROUTINE are loaded; IO, OS, PACKAGE and
/// DEBUG are not. `require`, `dofile` and `loadfile` are removed.
///
/// The global `invalid_parameters(msg)` is always available; raising it from
/// `describe` or `fetch` rejects the caller's parameters instead of reporting
/// a failed request.
///
/// # Example
/// ```no_run
/// use siphon_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let connector: mlua::Table = lua
///     .load(r#"return { id = "example", interval = 600 }"#)
///     .eval()?;
/// let id: String = connector.get("id")?;
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
            LuaOptions::default(),
        )
    };

    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;

    let invalid_parameters = lua.create_function(|_, msg: String| {
        Err::<(), _>(mlua::Error::RuntimeError(format!(
            "{}{}",
            INVALID_PARAMETERS_MARKER, msg
        )))
    })?;
    lua.globals().set("invalid_parameters", invalid_parameters)?;

    Ok(lua)
}

/// Stubs for the sandbox globals
pub fn sandbox_stubs() -> String {
    r#"---@meta

---Reject the caller's parameters; never returns
---@param msg string Why the parameters are invalid
function invalid_parameters(msg) end
"#
    .to_string()
}
