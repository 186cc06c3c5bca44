//! Browser engine backed by a child process
//!
//! Launches the configured headless browser command once per engine. Every
//! execution context is a private profile directory under the profile root,
//! created on open and removed on close.

use async_trait::async_trait;
use siphon_core::{CrawlError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Engine, EngineLauncher, ExecutionContext};

/// Launches a headless browser as a child process
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
    profile_root: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<String>, profile_root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            profile_root: profile_root.into(),
        }
    }

    /// Splits a command line such as `chromium --headless=new` into program and arguments
    ///
    /// # Errors
    /// `InvalidParameters` if the command line is blank.
    pub fn from_command_line(command: &str, profile_root: impl Into<PathBuf>) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CrawlError::InvalidParameters("empty browser command".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            profile_root: profile_root.into(),
        })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl EngineLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        tokio::fs::create_dir_all(&self.profile_root)
            .await
            .map_err(|e| CrawlError::Unknown(format!("failed to create profile root: {}", e)))?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CrawlError::Unknown(format!("failed to launch '{}': {}", self.program, e))
            })?;

        info!(program = %self.program, pid = ?child.id(), "browser engine started");
        Ok(Arc::new(ProcessEngine {
            child: Mutex::new(Some(child)),
            profile_root: self.profile_root.clone(),
        }))
    }
}

struct ProcessEngine {
    child: Mutex<Option<Child>>,
    profile_root: PathBuf,
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn open_context(&self) -> Result<ExecutionContext> {
        let id = Uuid::new_v4().to_string();
        let profile_dir = self.profile_root.join(&id);
        tokio::fs::create_dir_all(&profile_dir)
            .await
            .map_err(|e| CrawlError::Unknown(format!("failed to create profile: {}", e)))?;

        debug!(context = %id, "opened browser context");
        Ok(ExecutionContext { id, profile_dir })
    }

    async fn close_context(&self, context: &ExecutionContext) {
        if let Err(e) = tokio::fs::remove_dir_all(&context.profile_dir).await {
            warn!(context = %context.id, error = %e, "failed to remove browser profile");
        }
    }

    async fn shutdown(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        if let Err(e) = child.kill().await {
            warn!(error = %e, "failed to stop browser engine");
        } else {
            info!("browser engine stopped");
        }
    }
}
