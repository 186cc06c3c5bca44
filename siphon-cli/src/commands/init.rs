//! Init command handlers
//!
//! Generates the files a connector script author needs: the LuaLS stub
//! file describing the script contract and a .luarc.json pointing at it.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use std::fs;
use std::path::Path;

use crate::config::Config;

const STUB_FILE: &str = "siphon.d.lua";

/// Init subcommands
#[derive(Subcommand)]
pub enum InitCommands {
    /// Generate Lua development files (.luarc.json and stubs)
    Lua {
        /// Output directory for generated files
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
}

/// Handle init commands
pub async fn handle_init_command(command: InitCommands, _config: &Config) -> Result<()> {
    match command {
        InitCommands::Lua { dir } => generate_lua_dev_files(Path::new(&dir)),
    }
}

fn generate_lua_dev_files(output_path: &Path) -> Result<()> {
    fs::create_dir_all(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    write_stubs(output_path)?;
    write_luarc_json(output_path)?;

    println!("{}", "✓ Lua development files generated!".green().bold());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Install Lua Language Server in your editor");
    println!("  2. Write a connector script returning its descriptor table");
    println!(
        "  3. Point the hub or an agent at the directory with {}",
        "CONNECTOR_DIR".cyan()
    );

    Ok(())
}

fn write_stubs(output_path: &Path) -> Result<()> {
    let stub_path = output_path.join(STUB_FILE);
    fs::write(&stub_path, siphon_lua::connector_stubs())
        .with_context(|| format!("Failed to write stub file {:?}", stub_path))?;
    println!("  {} {}", "Created".green(), STUB_FILE);
    Ok(())
}

fn luarc_json() -> String {
    format!(
        r#"{{
  "$schema": "https://raw.githubusercontent.com/sumneko/vscode-lua/master/setting/schema.json",
  "runtime": {{
    "version": "Lua 5.4"
  }},
  "diagnostics": {{
    "globals": ["log", "http", "browser", "invalid_parameters"]
  }},
  "workspace": {{
    "library": ["{}"],
    "checkThirdParty": false
  }},
  "completion": {{
    "callSnippet": "Both"
  }}
}}
"#,
        STUB_FILE
    )
}

fn write_luarc_json(output_path: &Path) -> Result<()> {
    let luarc_path = output_path.join(".luarc.json");
    fs::write(&luarc_path, luarc_json())
        .with_context(|| format!("Failed to write .luarc.json to {:?}", luarc_path))?;
    println!("  {} .luarc.json", "Created".green());
    Ok(())
}
