// SPDX-License-Identifier: MIT

//! Model module - defines LLM model trait and implementations
//!
//! This module provides the core Model trait and shared types.
//! Model implementations are in their own submodules:
//! - [gemini] - Google's Gemini API
//! - [openai] - OpenAI's ChatGPT API

pub mod gemini;
pub mod openai;

use crate::adk::error::{ForgeError, ModelError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models (e.g., Gemini's thinking mode)
    Thinking(String),
}

impl Content {
    /// Single-part text message
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, thinking excluded
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Provider label used in error reports
    fn provider(&self) -> &str;

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ForgeError>;
}

/// Build a model client for the named provider.
///
/// Provider matching is case-insensitive; when no provider is given it is
/// inferred from the model name prefix.
pub fn build_model(provider: Option<&str>, model_name: &str) -> Result<Arc<dyn Model>, ForgeError> {
    let provider = provider
        .map(|p| p.to_lowercase())
        .unwrap_or_else(|| infer_provider(model_name).to_string());

    log::info!("Using provider: {} with model: {}", provider, model_name);

    match provider.as_str() {
        "openai" => Ok(Arc::new(openai::OpenAIModel::new(model_name.to_string())?)),
        "gemini" | "google" => Ok(Arc::new(gemini::GeminiModel::new(model_name.to_string())?)),
        other => Err(ModelError::UnsupportedProvider(other.to_string()).into()),
    }
}

fn infer_provider(model_name: &str) -> &'static str {
    if model_name.starts_with("gpt") || model_name.starts_with("o1") {
        "openai"
    } else {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_text_skips_thinking() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![
                Part::Thinking("let me see".to_string()),
                Part::Text("Hello ".to_string()),
                Part::Text("world".to_string()),
            ],
        };
        assert_eq!(content.joined_text(), "Hello world");
    }

    #[test]
    fn test_infer_provider() {
        assert_eq!(infer_provider("gpt-4o-mini"), "openai");
        assert_eq!(infer_provider("gemini-2.5-flash"), "gemini");
    }

    #[test]
    fn test_unsupported_provider() {
        let result = build_model(Some("carrier-pigeon"), "coo-1");
        assert!(matches!(
            result,
            Err(ForgeError::Model(ModelError::UnsupportedProvider(_)))
        ));
    }
}
