// SPDX-License-Identifier: MIT

//! Time-boxed execution of generated code
//!
//! Every run gets its own scratch directory that is removed when the run ends,
//! whether the child succeeded, failed, timed out or could not be spawned.
//! A child still running at the deadline is killed.

use crate::adk::error::SandboxError;
use crate::forge::config::AssetSettings;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Language of a generated asset program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLanguage {
    /// matplotlib script that saves the figure itself
    Python,
    /// Mermaid source rendered by the Mermaid CLI
    Mermaid,
}

impl CodeLanguage {
    pub fn fence_tag(&self) -> &'static str {
        match self {
            CodeLanguage::Python => "python",
            CodeLanguage::Mermaid => "mermaid",
        }
    }

    fn script_name(&self) -> &'static str {
        match self {
            CodeLanguage::Python => "asset.py",
            CodeLanguage::Mermaid => "diagram.mmd",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest<'a> {
    pub language: CodeLanguage,
    pub source: &'a str,
    /// Where the asset must end up
    pub output_path: &'a Path,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionOutput {
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Isolated code runner with a hard wall-clock limit
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionOutput, SandboxError>;
}

/// Runs generated code as a local child process
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    python: String,
    mermaid_cli: String,
    timeout: Duration,
}

impl ProcessSandbox {
    pub fn new(settings: &AssetSettings) -> Self {
        Self {
            python: settings.python.clone(),
            mermaid_cli: settings.mermaid_cli.clone(),
            timeout: settings.sandbox_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, request: &ExecutionRequest<'_>, script: &Path) -> Command {
        match request.language {
            CodeLanguage::Python => {
                let mut cmd = Command::new(&self.python);
                cmd.arg(script).env("MPLBACKEND", "Agg");
                cmd
            }
            CodeLanguage::Mermaid => {
                let mut cmd = Command::new(&self.mermaid_cli);
                cmd.arg("-i").arg(script).arg("-o").arg(request.output_path);
                cmd
            }
        }
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn execute(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionOutput, SandboxError> {
        let scratch = tempfile::tempdir()?;
        let script = scratch.path().join(request.language.script_name());
        tokio::fs::write(&script, request.source).await?;

        let mut cmd = self.command(request, &script);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::debug!(
            "Executing {:?} asset program ({} bytes)",
            request.language,
            request.source.len()
        );

        let program = cmd.as_std().get_program().to_string_lossy().to_string();
        let child = cmd
            .spawn()
            .map_err(|source| SandboxError::Spawn { program, source })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                log::warn!("Asset program exceeded {:?}, killed", self.timeout);
                SandboxError::Timeout {
                    secs: self.timeout.as_secs(),
                }
            })??;

        Ok(ExecutionOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
