//! Connector script discovery

use anyhow::{Context, Result};
use siphon_engine::RegistryBuilder;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::connector::LuaConnector;

/// Loads every `*.lua` file in `dir`, in file name order
///
/// # Errors
/// Fails on the first unreadable or malformed script.
pub fn load_dir(dir: &Path) -> Result<Vec<LuaConnector>> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read connector directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "lua"))
        .collect();
    paths.sort();

    let mut connectors = Vec::with_capacity(paths.len());
    for path in paths {
        let source = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let connector = LuaConnector::from_source(name, source)
            .with_context(|| format!("Failed to load connector {}", path.display()))?;
        connectors.push(connector);
    }
    Ok(connectors)
}

/// Loads `dir` and registers every connector found
///
/// Returns the number of connectors registered.
pub fn register_dir(builder: &mut RegistryBuilder, dir: &Path) -> Result<usize> {
    let connectors = load_dir(dir)?;
    let count = connectors.len();
    for connector in connectors {
        builder
            .register(connector)
            .context("Failed to register lua connector")?;
    }
    info!(dir = %dir.display(), count, "registered lua connectors");
    Ok(count)
}
