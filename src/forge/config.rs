// SPDX-License-Identifier: MIT

//! Pipeline configuration
//!
//! Loaded from an optional YAML file; every section has defaults so an empty
//! file (or no file) is a valid configuration. Environment variables override
//! the file for the values most often changed per deployment.

use crate::adk::error::ForgeError;
use crate::forge::audio::NarrationMode;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Language the lesson is written in
    pub language: String,
    pub model: ModelSettings,
    pub optimization: OptimizationSettings,
    pub assets: AssetSettings,
    pub compiler: CompilerSettings,
    pub layout: LayoutSettings,
    pub audio: AudioSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelSettings {
    /// "gemini" or "openai"; inferred from the model name when absent
    pub provider: Option<String>,
    pub name: String,
    pub temperature: f32,
}

/// Score gate in front of the optimizer
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OptimizationSettings {
    /// Scores strictly below this are sent to the optimizer
    pub score_threshold: i64,
    /// How many optimizer passes a task may take
    pub max_optimizations: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetSettings {
    pub max_fix_attempts: u32,
    pub sandbox_timeout_secs: u64,
    pub python: String,
    pub mermaid_cli: String,
    /// Sibling placeholders generated at once
    pub concurrency: usize,
    pub image_candidates: u32,
    /// Downloaded images larger than this are skipped
    pub max_image_bytes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerSettings {
    pub program: String,
    pub passes: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub output_root: PathBuf,
    /// Task directory names are truncated to this many characters
    pub task_dir_prefix_len: usize,
    /// URL prefix under which `output_root` is served
    pub asset_url_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Narration style used by the orchestrator
    pub mode: NarrationMode,
    pub speech_model: String,
    pub primary_voice: String,
    pub secondary_voice: String,
    pub min_gap_ms: u64,
    pub max_gap_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            model: ModelSettings::default(),
            optimization: OptimizationSettings::default(),
            assets: AssetSettings::default(),
            compiler: CompilerSettings::default(),
            layout: LayoutSettings::default(),
            audio: AudioSettings::default(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: None,
            name: "gemini-2.5-flash".to_string(),
            temperature: 0.0,
        }
    }
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            score_threshold: 8,
            max_optimizations: 1,
        }
    }
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            max_fix_attempts: 5,
            sandbox_timeout_secs: 15,
            python: "python3".to_string(),
            mermaid_cli: "mmdc".to_string(),
            concurrency: 2,
            image_candidates: 5,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            program: "pdflatex".to_string(),
            passes: 2,
            timeout_secs: 120,
        }
    }
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("artifacts/processed_files"),
            task_dir_prefix_len: 30,
            asset_url_prefix: "/artifacts/processed_files".to_string(),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            mode: NarrationMode::Tutor,
            speech_model: "gpt-4o-mini-tts".to_string(),
            primary_voice: "alloy".to_string(),
            secondary_voice: "nova".to_string(),
            min_gap_ms: 100,
            max_gap_ms: 300,
        }
    }
}

impl AssetSettings {
    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox_timeout_secs)
    }
}

impl PipelineConfig {
    /// Load configuration from an optional YAML file, then apply env overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ForgeError> {
        let mut config = match path {
            Some(p) => {
                log::info!("Loading pipeline config from {}", p.display());
                Self::parse_yaml(&fs::read_to_string(p)?)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self, ForgeError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(provider) = env::var("MODEL_PROVIDER") {
            self.model.provider = Some(provider);
        }
        if let Ok(name) = env::var("LESSONFORGE_MODEL") {
            self.model.name = name;
        }
        if let Ok(root) = env::var("LESSONFORGE_OUTPUT_ROOT") {
            self.layout.output_root = PathBuf::from(root);
        }
        if let Ok(language) = env::var("LESSONFORGE_LANGUAGE") {
            self.language = language;
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.assets.concurrency == 0 {
            return Err(ForgeError::config("assets.concurrency must be at least 1"));
        }
        if self.assets.max_image_bytes == 0 {
            return Err(ForgeError::config("assets.max_image_bytes must be at least 1"));
        }
        if self.layout.task_dir_prefix_len == 0 {
            return Err(ForgeError::config(
                "layout.task_dir_prefix_len must be at least 1",
            ));
        }
        if self.audio.min_gap_ms > self.audio.max_gap_ms {
            return Err(ForgeError::config(
                "audio.min_gap_ms must not exceed audio.max_gap_ms",
            ));
        }
        let prefix = &self.layout.asset_url_prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(ForgeError::config(
                "layout.asset_url_prefix must look like '/path' without a trailing slash",
            ));
        }
        if self.compiler.passes == 0 {
            return Err(ForgeError::config("compiler.passes must be at least 1"));
        }
        Ok(())
    }
}
