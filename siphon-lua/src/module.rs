use mlua::prelude::*;

/// Trait for Lua modules exposed to connector scripts.
///
/// Each module registers one global table into the sandbox and can describe
/// itself as Lua Language Server stubs for script authors.
///
/// # Example
///
/// ```rust
/// use siphon_lua::module::SiphonModule;
/// use mlua::prelude::*;
///
/// struct ClockModule;
///
/// impl SiphonModule for ClockModule {
///     fn id(&self) -> &'static str {
///         "clock"
///     }
///
///     fn register(&self, lua: &Lua) -> LuaResult<()> {
///         let clock = lua.create_table()?;
///         clock.set("epoch", 0)?;
///         lua.globals().set(self.id(), clock)?;
///         Ok(())
///     }
///
///     fn stubs(&self) -> String {
///         "---@meta\nclock = {}\n".to_string()
///     }
/// }
/// ```
pub trait SiphonModule: Send + Sync {
    /// Global name of the module table in Lua
    ///
    /// Must be a valid Lua identifier and unique within a registry.
    fn id(&self) -> &'static str;

    /// Registers this module's table into the Lua state.
    ///
    /// # Errors
    /// Returns `LuaError` if a function or table cannot be created.
    fn register(&self, lua: &Lua) -> LuaResult<()>;

    /// LuaLS stub file content, starting with `---@meta`
    fn stubs(&self) -> String;
}

/// Ordered set of modules installed into every connector sandbox
pub struct ModuleRegistry {
    modules: Vec<Box<dyn SiphonModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Registers a module
    ///
    /// # Errors
    /// Returns a runtime error if a module with the same id is already
    /// registered.
    pub fn register<M: SiphonModule + 'static>(&mut self, module: M) -> LuaResult<&mut Self> {
        let id = module.id();
        if self.modules.iter().any(|m| m.id() == id) {
            return Err(LuaError::RuntimeError(format!(
                "module '{}' is already registered",
                id
            )));
        }
        self.modules.push(Box::new(module));
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&dyn SiphonModule> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
    }

    pub fn modules(&self) -> &[Box<dyn SiphonModule>] {
        &self.modules
    }

    /// Installs every module into `lua`, stopping at the first failure
    pub fn register_all(&self, lua: &Lua) -> LuaResult<()> {
        for module in &self.modules {
            module.register(lua)?;
        }
        Ok(())
    }

    /// Concatenated stubs of all modules
    pub fn generate_stubs(&self) -> String {
        let mut stubs = String::new();
        for module in &self.modules {
            stubs.push_str(&module.stubs());
            stubs.push_str("\n\n");
        }
        stubs
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
