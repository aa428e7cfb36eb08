// SPDX-License-Identifier: MIT

//! Typed error handling for lessonforge-rs
//!
//! `ForgeError` is what a task caller observes. Errors that a node recovers
//! from in-band (asset attempts, sandbox runs) have their own enums so they can
//! be recorded in sub-workflow state without escaping it.

use thiserror::Error;

/// Top-level error type for lessonforge-rs
#[derive(Debug, Error)]
pub enum ForgeError {
    /// A language, retrieval, search or speech service failed or timed out
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph wiring or execution errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// A node failed; carries the node name and the last diagnostic text
    #[error("Stage '{stage}' failed: {diagnostic}")]
    Stage { stage: String, diagnostic: String },

    /// Document compiler rejected the source
    #[error("Compilation failed: {diagnostic}")]
    Compilation { diagnostic: String },

    /// Model-specific failures
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Sandbox failures that escaped an asset attempt
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Graph wiring and execution errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Edge or entry refers to a node that is not declared
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Entry node is not declared or has no implementation
    #[error("Missing entry node: {0}")]
    MissingEntry(String),

    /// Same node declared twice
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// Predicate produced a label with no branch
    #[error("Node '{node}' routed to unmapped label '{label}'")]
    UnroutableLabel { node: String, label: String },

    /// Runaway cycle guard
    #[error("Graph '{graph}' exceeded {limit} steps")]
    StepLimit { graph: String, limit: usize },
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Model not supported
    #[error("Model provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// Model answered without any text
    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// Errors raised while running untrusted code
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Wall-clock limit reached; the child was killed
    #[error("Execution timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// Interpreter could not be started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Scratch directory could not be prepared
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of a single asset attempt. Recorded in sub-workflow state and fed
/// to the fix loop; never propagated past the asset sub-workflow.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssetError {
    /// Generated source failed the static check
    #[error("Rejected before execution: {0}")]
    Malformed(String),

    /// Generated source does not write to the expected target path
    #[error("Output path mismatch: expected '{expected}'")]
    PathMismatch { expected: String },

    /// Process exited with a non-zero status
    #[error("Execution failed (exit code {code:?}): {stderr}")]
    Execution { code: Option<i32>, stderr: String },

    /// Wall-clock limit reached
    #[error("Execution timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// Process exited cleanly but no file was written at the target
    #[error("No artifact produced at '{path}'")]
    MissingArtifact { path: String },

    /// Code generation service failed
    #[error("Generation service error: {0}")]
    Service(String),
}

impl ForgeError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap a node failure with its stage name
    pub fn stage(stage: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            diagnostic: diagnostic.into(),
        }
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Stage name for structured failures
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

impl From<&str> for ForgeError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for ForgeError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = ForgeError::stage("compile_primary", "! Undefined control sequence.");
        assert_eq!(
            err.to_string(),
            "Stage 'compile_primary' failed: ! Undefined control sequence."
        );
        assert_eq!(err.failed_stage(), Some("compile_primary"));
    }

    #[test]
    fn test_workflow_error_converts() {
        let err: ForgeError = WorkflowError::UnknownNode("ghost".to_string()).into();
        assert!(matches!(err, ForgeError::Workflow(WorkflowError::UnknownNode(_))));
        assert_eq!(err.failed_stage(), None);
    }

    #[test]
    fn test_asset_error_display() {
        let err = AssetError::PathMismatch {
            expected: "/tmp/graph_0.png".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Output path mismatch: expected '/tmp/graph_0.png'"
        );
    }
}
