// SPDX-License-Identifier: MIT

//! Document compilation (LaTeX source to PDF)

use crate::adk::error::{ForgeError, SandboxError};
use crate::forge::config::CompilerSettings;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Auxiliary files removed after a successful build
const AUX_EXTENSIONS: [&str; 3] = ["aux", "log", "out"];

/// Diagnostic text kept when no `!` error lines are found
const LOG_TAIL: usize = 1500;

/// Renders a source file; returns the rendered file's path
#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    async fn compile(&self, source: &Path) -> Result<PathBuf, ForgeError>;
}

/// Error lines (`! ...`) with the two lines that follow each, or the tail
/// of the log when there are none
pub fn extract_diagnostic(log: &str) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let mut picked = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with('!') {
            picked.extend(lines[i..(i + 3).min(lines.len())].iter().copied());
        }
    }

    if picked.is_empty() {
        let count = log.chars().count();
        return log.chars().skip(count.saturating_sub(LOG_TAIL)).collect::<String>().trim().to_string();
    }
    picked.join("\n")
}

/// Runs `pdflatex` in non-stop mode for a fixed number of passes
pub struct PdfLatexCompiler {
    program: String,
    passes: u32,
    timeout: Duration,
}

impl PdfLatexCompiler {
    pub fn new(settings: &CompilerSettings) -> Self {
        Self {
            program: settings.program.clone(),
            passes: settings.passes.max(1),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    async fn pass(&self, source: &Path, out_dir: &Path) -> Result<std::process::Output, ForgeError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-interaction=nonstopmode")
            .arg(format!("-output-directory={}", out_dir.display()))
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(ForgeError::Compilation {
                diagnostic: format!("{} timed out after {:?}", self.program, self.timeout),
            }),
        }
    }
}

#[async_trait]
impl DocumentCompiler for PdfLatexCompiler {
    async fn compile(&self, source: &Path) -> Result<PathBuf, ForgeError> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(ForgeError::Compilation {
                diagnostic: format!("source {} not found", source.display()),
            });
        }

        let out_dir = source.parent().unwrap_or_else(|| Path::new("."));
        log::info!("Compiling {} ({} passes)", source.display(), self.passes);

        let mut last = None;
        // Later passes resolve references and the table of contents
        for _ in 0..self.passes {
            last = Some(self.pass(source, out_dir).await?);
        }

        let pdf = source.with_extension("pdf");
        let succeeded = last.as_ref().map(|o| o.status.success()).unwrap_or(false);
        if !succeeded || !tokio::fs::try_exists(&pdf).await.unwrap_or(false) {
            let stdout = last
                .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
                .unwrap_or_default();
            let diagnostic = extract_diagnostic(&stdout);
            log::error!("LaTeX error in {}: {}", source.display(), diagnostic);
            return Err(ForgeError::Compilation { diagnostic });
        }

        for ext in AUX_EXTENSIONS {
            let _ = tokio::fs::remove_file(source.with_extension(ext)).await;
        }

        log::info!("PDF generated at {}", pdf.display());
        Ok(pdf)
    }
}
