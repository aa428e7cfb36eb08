// SPDX-License-Identifier: MIT

//! Graph and diagram synthesis
//!
//! Each placeholder runs a small two-node graph:
//!
//! ```text
//! generate_code --error--> fix_code --error, retries left--> generate_code
//!       |                     |
//!      done                  done
//! ```
//!
//! `generate_code` executes the pending fixed program if there is one,
//! otherwise asks the writer for a fresh one. `fix_code` increments
//! `retry_count` once per run; when the budget is spent it stops without
//! asking for another fix. Errors never escape: the caller receives a
//! `GenerationOutcome`.

use super::sandbox::{CodeLanguage, ExecutionRequest, Sandbox};
use super::static_check;
use super::{AssetGenerator, GenerationOutcome};
use crate::adk::agent::{Agent, LLMAgent};
use crate::adk::error::{AssetError, ForgeError, SandboxError};
use crate::adk::model::Model;
use crate::forge::config::AssetSettings;
use crate::forge::workflow::graph::{CompiledGraph, GraphSpec, GraphState, Node, Transition, END};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("Failed to compile code block regex")
});

/// Diagnostic text kept from a failing program
const STDERR_TAIL: usize = 2000;

const PYTHON_WRITER_INSTRUCTION: &str = "You are a graph generator agent. Write a complete Python \
program that draws the requested graph with matplotlib only. Keep the figure readable and \
uncluttered, with realistic dimensions. Save the figure with plt.savefig to the exact target \
path you are given, written verbatim as a raw string literal; never invent another path or \
file name. Do not call plt.show(). Return only the code.";

const PYTHON_FIXER_INSTRUCTION: &str = "You are an excellent Python developer. You are given a \
matplotlib program, the error it produced and its target path. Fix the errors without changing \
the main logic. The figure must still be saved with plt.savefig to the exact target path, \
verbatim. Return only the fixed code.";

const MERMAID_WRITER_INSTRUCTION: &str = "You generate educational Mermaid flowcharts. Start with \
'graph TD'. Use single uppercase letters as node IDs with descriptive labels, vary node shapes \
and add return arrows when the topic is a cycle. Do not use colors or style statements. Return \
only the Mermaid code.";

const MERMAID_FIXER_INSTRUCTION: &str = "You fix Mermaid flowcharts. You are given the diagram \
source and the error the renderer or validator reported. Return only the corrected Mermaid \
code, starting with 'graph TD'.";

/// Pull the first fenced block out of a reply, or the whole reply
pub fn extract_code_block(reply: &str) -> String {
    match CODE_BLOCK.captures(reply) {
        Some(caps) => caps[1].trim().to_string(),
        None => reply.replace("```", "").trim().to_string(),
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

/// Transient state of one asset's synthesis
#[derive(Debug, Clone)]
pub struct CodeGenState {
    pub query: String,
    pub target_path: PathBuf,
    pub target_filename: String,
    pub extracted_code: String,
    /// `extracted_code` is a fix that has not run yet
    pub pending_fix: bool,
    pub retry_count: u32,
    pub attempts: u32,
    pub error_message: Option<AssetError>,
}

impl CodeGenState {
    pub fn new(query: &str, target_path: &Path) -> Self {
        Self {
            query: query.to_string(),
            target_path: target_path.to_path_buf(),
            target_filename: target_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            extracted_code: String::new(),
            pending_fix: false,
            retry_count: 0,
            attempts: 0,
            error_message: None,
        }
    }

    fn target_display(&self) -> String {
        self.target_path.to_string_lossy().to_string()
    }
}

#[derive(Debug, Default)]
pub struct CodeGenUpdate {
    extracted_code: Option<String>,
    pending_fix: Option<bool>,
    /// Added
    retry_count: Option<u32>,
    /// Added
    attempts: Option<u32>,
    error_message: Option<Option<AssetError>>,
}

impl GraphState for CodeGenState {
    type Update = CodeGenUpdate;

    fn apply(&mut self, update: CodeGenUpdate) {
        if let Some(code) = update.extracted_code {
            self.extracted_code = code;
        }
        if let Some(pending) = update.pending_fix {
            self.pending_fix = pending;
        }
        self.retry_count += update.retry_count.unwrap_or(0);
        self.attempts += update.attempts.unwrap_or(0);
        if let Some(error) = update.error_message {
            self.error_message = error;
        }
    }
}

#[derive(Debug, Clone)]
pub enum CodePredicate {
    AfterGenerate,
    AfterFix { max_attempts: u32 },
}

impl Transition<CodeGenState> for CodePredicate {
    fn name(&self) -> &'static str {
        match self {
            CodePredicate::AfterGenerate => "has_error",
            CodePredicate::AfterFix { .. } => "can_retry",
        }
    }

    fn route(&self, state: &CodeGenState) -> &'static str {
        let failed = state.error_message.is_some();
        match self {
            CodePredicate::AfterGenerate if failed => "fix",
            CodePredicate::AfterFix { max_attempts } if failed && state.retry_count < *max_attempts => {
                "retry"
            }
            _ => "done",
        }
    }
}

struct GenerateCode {
    language: CodeLanguage,
    writer: Arc<dyn Agent>,
    sandbox: Arc<dyn Sandbox>,
}

impl GenerateCode {
    fn prompt(&self, state: &CodeGenState) -> String {
        match self.language {
            CodeLanguage::Python => format!(
                "Query/Instructions: {}\nTarget path: {}\nTarget file name: {}",
                state.query,
                state.target_display(),
                state.target_filename
            ),
            CodeLanguage::Mermaid => format!("Topic: {}", state.query),
        }
    }

    /// Check, execute and verify one program
    async fn attempt(&self, code: &str, state: &CodeGenState) -> Result<(), AssetError> {
        static_check::check(self.language, code).map_err(AssetError::Malformed)?;

        let expected = state.target_display();
        if self.language == CodeLanguage::Python && !code.contains(&expected) {
            return Err(AssetError::PathMismatch { expected });
        }

        // A leftover file would hide a run that wrote nothing
        let _ = tokio::fs::remove_file(&state.target_path).await;

        let request = ExecutionRequest {
            language: self.language,
            source: code,
            output_path: &state.target_path,
        };
        let output = self.sandbox.execute(&request).await.map_err(|e| match e {
            SandboxError::Timeout { secs } => AssetError::Timeout { secs },
            other => AssetError::Execution {
                code: None,
                stderr: other.to_string(),
            },
        })?;

        if !output.is_success() {
            return Err(AssetError::Execution {
                code: output.exit_code,
                stderr: tail(&output.stderr, STDERR_TAIL),
            });
        }

        if !tokio::fs::try_exists(&state.target_path).await.unwrap_or(false) {
            return Err(AssetError::MissingArtifact { path: expected });
        }

        Ok(())
    }
}

#[async_trait]
impl Node<CodeGenState> for GenerateCode {
    async fn run(&self, state: &CodeGenState) -> Result<CodeGenUpdate, ForgeError> {
        let code = if state.pending_fix {
            state.extracted_code.clone()
        } else {
            match self.writer.run(self.prompt(state)).await {
                Ok(reply) => extract_code_block(&reply),
                Err(e) => {
                    log::warn!("Code writer failed for '{}': {}", state.target_filename, e);
                    return Ok(CodeGenUpdate {
                        pending_fix: Some(false),
                        attempts: Some(1),
                        error_message: Some(Some(AssetError::Service(e.to_string()))),
                        ..Default::default()
                    });
                }
            }
        };

        let result = self.attempt(&code, state).await;
        match &result {
            Ok(()) => log::info!("Asset {} generated", state.target_filename),
            Err(e) => log::warn!(
                "Attempt {} for {} failed: {}",
                state.attempts + 1,
                state.target_filename,
                e
            ),
        }

        Ok(CodeGenUpdate {
            extracted_code: Some(code),
            pending_fix: Some(false),
            attempts: Some(1),
            error_message: Some(result.err()),
            ..Default::default()
        })
    }
}

struct FixCode {
    fixer: Arc<dyn Agent>,
    max_attempts: u32,
}

#[async_trait]
impl Node<CodeGenState> for FixCode {
    async fn run(&self, state: &CodeGenState) -> Result<CodeGenUpdate, ForgeError> {
        let retry_count = state.retry_count + 1;
        if retry_count >= self.max_attempts {
            log::warn!(
                "Giving up on {} after {} attempts",
                state.target_filename,
                retry_count
            );
            return Ok(CodeGenUpdate {
                retry_count: Some(1),
                ..Default::default()
            });
        }

        let error = state
            .error_message
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        let prompt = format!(
            "Error Message:\n{}\n\nTarget path: {}\n\nFaulty Code:\n{}",
            error,
            state.target_display(),
            state.extracted_code
        );

        let update = match self.fixer.run(prompt).await {
            Ok(reply) => CodeGenUpdate {
                extracted_code: Some(extract_code_block(&reply)),
                pending_fix: Some(true),
                retry_count: Some(1),
                ..Default::default()
            },
            Err(e) => {
                log::warn!("Code fixer failed for '{}': {}", state.target_filename, e);
                CodeGenUpdate {
                    pending_fix: Some(false),
                    retry_count: Some(1),
                    error_message: Some(Some(AssetError::Service(e.to_string()))),
                    ..Default::default()
                }
            }
        };
        Ok(update)
    }
}

/// Asset generator backed by generated code
pub struct CodeAssetGenerator {
    language: CodeLanguage,
    graph: CompiledGraph<CodeGenState, CodePredicate>,
}

impl CodeAssetGenerator {
    pub fn new(
        language: CodeLanguage,
        writer: Arc<dyn Agent>,
        fixer: Arc<dyn Agent>,
        sandbox: Arc<dyn Sandbox>,
        max_attempts: u32,
    ) -> Result<Self, ForgeError> {
        let spec = GraphSpec::new(format!("{}_asset", language.fence_tag()), "generate_code")
            .node("generate_code")
            .node("fix_code")
            .conditional(
                "generate_code",
                CodePredicate::AfterGenerate,
                &[("fix", "fix_code"), ("done", END)],
            )
            .conditional(
                "fix_code",
                CodePredicate::AfterFix { max_attempts },
                &[("retry", "generate_code"), ("done", END)],
            );

        let generate: Arc<dyn Node<CodeGenState>> = Arc::new(GenerateCode {
            language,
            writer,
            sandbox,
        });
        let fix: Arc<dyn Node<CodeGenState>> = Arc::new(FixCode { fixer, max_attempts });

        let graph = CompiledGraph::compile(spec, vec![("generate_code", generate), ("fix_code", fix)])?;
        Ok(Self { language, graph })
    }

    /// matplotlib graphs
    pub fn graphs(
        model: Arc<dyn Model>,
        settings: &AssetSettings,
        sandbox: Arc<dyn Sandbox>,
    ) -> Result<Self, ForgeError> {
        Self::new(
            CodeLanguage::Python,
            Arc::new(LLMAgent::new("graph_writer", PYTHON_WRITER_INSTRUCTION, model.clone())),
            Arc::new(LLMAgent::new("graph_fixer", PYTHON_FIXER_INSTRUCTION, model)),
            sandbox,
            settings.max_fix_attempts,
        )
    }

    /// Mermaid diagrams
    pub fn diagrams(
        model: Arc<dyn Model>,
        settings: &AssetSettings,
        sandbox: Arc<dyn Sandbox>,
    ) -> Result<Self, ForgeError> {
        Self::new(
            CodeLanguage::Mermaid,
            Arc::new(LLMAgent::new("diagram_writer", MERMAID_WRITER_INSTRUCTION, model.clone())),
            Arc::new(LLMAgent::new("diagram_fixer", MERMAID_FIXER_INSTRUCTION, model)),
            sandbox,
            settings.max_fix_attempts,
        )
    }

    pub fn language(&self) -> CodeLanguage {
        self.language
    }
}

#[async_trait]
impl AssetGenerator for CodeAssetGenerator {
    async fn generate(&self, description: &str, index: usize, output_path: &Path) -> GenerationOutcome {
        log::info!(
            "Generating {} asset {} for '{}'",
            self.language.fence_tag(),
            index,
            description
        );

        if let Some(parent) = output_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return GenerationOutcome::failed(AssetError::Execution {
                    code: None,
                    stderr: format!("cannot create {}: {}", parent.display(), e),
                });
            }
        }

        let state = CodeGenState::new(description, output_path);
        match self.graph.run(state).await {
            Ok(run) => {
                let s = run.state;
                let success = s.attempts > 0 && s.error_message.is_none();
                if !success {
                    log::warn!(
                        "Asset {} exhausted after {} attempts: {:?}",
                        index,
                        s.attempts,
                        s.error_message
                    );
                }
                GenerationOutcome {
                    success,
                    attempts: s.attempts,
                    retries: s.retry_count,
                    error: s.error_message,
                }
            }
            Err(e) => {
                log::error!("Asset workflow for {} aborted: {}", index, e);
                GenerationOutcome::failed(AssetError::Service(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::agent::tests::{MockAgent, ScriptedAgent};
    use crate::forge::assets::ExecutionOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sandbox that writes the target once `fail_first` runs have failed
    struct CountingSandbox {
        runs: AtomicUsize,
        fail_first: usize,
        timeout: bool,
    }

    impl CountingSandbox {
        fn succeeding_after(fail_first: usize) -> Self {
            Self {
                runs: AtomicUsize::new(0),
                fail_first,
                timeout: false,
            }
        }

        fn always_timing_out() -> Self {
            Self {
                runs: AtomicUsize::new(0),
                fail_first: usize::MAX,
                timeout: true,
            }
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sandbox for CountingSandbox {
        async fn execute(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionOutput, SandboxError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if self.timeout {
                return Err(SandboxError::Timeout { secs: 15 });
            }
            if run < self.fail_first {
                return Ok(ExecutionOutput {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "NameError: name 'np' is not defined".to_string(),
                });
            }
            tokio::fs::write(request.output_path, b"\x89PNG").await?;
            Ok(ExecutionOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    /// Writes a valid program that saves to the path named in the prompt
    fn echoing_writer() -> Arc<MockAgent> {
        Arc::new(MockAgent::new("writer", |input| {
            let path = input
                .lines()
                .find_map(|l| l.strip_prefix("Target path: "))
                .unwrap_or("missing")
                .to_string();
            format!(
                "```python\nimport matplotlib.pyplot as plt\nplt.plot([0, 1], [0, 1])\nplt.savefig(r\"{}\")\n```",
                path
            )
        }))
    }

    fn generator(
        writer: Arc<dyn Agent>,
        fixer: Arc<dyn Agent>,
        sandbox: Arc<dyn Sandbox>,
    ) -> CodeAssetGenerator {
        CodeAssetGenerator::new(CodeLanguage::Python, writer, fixer, sandbox, 5).unwrap()
    }

    #[test]
    fn test_extract_code_block() {
        assert_eq!(extract_code_block("Here:\n```python\nprint(1)\n```\nDone"), "print(1)");
        assert_eq!(extract_code_block("```\ngraph TD\nA-->B\n```"), "graph TD\nA-->B");
        assert_eq!(extract_code_block("print(2)"), "print(2)");
    }

    #[test]
    fn test_fix_route_respects_budget() {
        let mut state = CodeGenState::new("q", Path::new("/tmp/g.png"));
        state.error_message = Some(AssetError::Timeout { secs: 15 });
        let gate = CodePredicate::AfterFix { max_attempts: 5 };

        state.retry_count = 4;
        assert_eq!(gate.route(&state), "retry");
        state.retry_count = 5;
        assert_eq!(gate.route(&state), "done");

        state.retry_count = 1;
        state.error_message = None;
        assert_eq!(gate.route(&state), "done");
        assert_eq!(CodePredicate::AfterGenerate.route(&state), "done");
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("graphs/graph_0.png");
        let sandbox = Arc::new(CountingSandbox::succeeding_after(0));
        let fixer = Arc::new(ScriptedAgent::new("fixer", vec![]));

        let outcome = generator(echoing_writer(), fixer.clone(), sandbox.clone())
            .generate("line y = x", 0, &target)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.retries, 0);
        assert!(target.exists());
        assert_eq!(fixer.calls(), 0);
    }

    #[tokio::test]
    async fn test_fixed_code_is_executed() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("graph_0.png");
        let sandbox = Arc::new(CountingSandbox::succeeding_after(0));
        let fixed = format!("```python\nimport matplotlib.pyplot as plt\nplt.savefig(r\"{}\")\n```", target.display());
        let fixer = Arc::new(ScriptedAgent::new("fixer", vec![Ok(fixed.as_str())]));
        let writer = Arc::new(ScriptedAgent::new("writer", vec![Ok("```python\nplt.savefig(r\"wrong.png\")\n```")]));

        let outcome = generator(writer.clone(), fixer.clone(), sandbox.clone())
            .generate("anything", 0, &target)
            .await;

        // First program never reaches the sandbox: wrong path
        assert!(outcome.success, "{:?}", outcome);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.retries, 1);
        assert_eq!(sandbox.runs(), 1);
        assert_eq!(writer.calls(), 1);
        assert!(fixer.inputs.lock().unwrap()[0].contains("Output path mismatch"));
    }

    #[tokio::test]
    async fn test_always_timing_out_stops_after_five() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("graph_1.png");
        let sandbox = Arc::new(CountingSandbox::always_timing_out());
        let fixer = Arc::new(MockAgent::new("fixer", |input| {
            let path = input
                .lines()
                .find_map(|l| l.strip_prefix("Target path: "))
                .unwrap_or("missing")
                .to_string();
            format!("import matplotlib.pyplot as plt\nplt.savefig(r\"{}\")", path)
        }));

        let outcome = generator(echoing_writer(), fixer, sandbox.clone())
            .generate("slow plot", 1, &target)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.retries, 5);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(sandbox.runs(), 5);
        assert_eq!(outcome.error, Some(AssetError::Timeout { secs: 15 }));
    }

    #[tokio::test]
    async fn test_malformed_code_never_executes() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("graph_0.png");
        let sandbox = Arc::new(CountingSandbox::succeeding_after(0));
        let broken = Arc::new(ScriptedAgent::new("w", vec![Ok("import subprocess\nplt.plot((1, 2)")]));
        let fixer = Arc::new(ScriptedAgent::new("f", vec![Ok("import subprocess\nplt.plot((1, 2)")]));

        let outcome = generator(broken, fixer.clone(), sandbox.clone())
            .generate("x", 0, &target)
            .await;

        assert!(!outcome.success);
        assert_eq!(sandbox.runs(), 0);
        assert!(matches!(outcome.error, Some(AssetError::Malformed(_))));
        assert_eq!(fixer.calls(), 4);
    }

    #[tokio::test]
    async fn test_service_errors_stay_inside() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("graph_0.png");
        let sandbox = Arc::new(CountingSandbox::succeeding_after(0));
        let writer = Arc::new(ScriptedAgent::new("w", vec![Err("503 unavailable")]));
        let fixer = Arc::new(ScriptedAgent::new("f", vec![Err("503 unavailable")]));

        let outcome = generator(writer.clone(), fixer, sandbox)
            .generate("x", 0, &target)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.retries, 5);
        assert_eq!(writer.calls(), 5);
        assert!(matches!(outcome.error, Some(AssetError::Service(_))));
    }
}
