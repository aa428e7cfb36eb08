// SPDX-License-Identifier: MIT

//! LLM Agent - instruction-bound single-turn agent
//!
//! The instruction is sent as the system message, the input as the user
//! message, and the concatenated text of the reply is returned.

use super::Agent;
use crate::adk::error::{ForgeError, ModelError};
use crate::adk::model::{Content, GenerationConfig, Model};
use async_trait::async_trait;
use std::sync::Arc;

/// Single-turn LLM agent
pub struct LLMAgent {
    pub name: String,
    pub instruction: String,
    pub model: Arc<dyn Model>,
    pub config: GenerationConfig,
}

impl LLMAgent {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>, model: Arc<dyn Model>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            model,
            config: GenerationConfig::default(),
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl Agent for LLMAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: String) -> Result<String, ForgeError> {
        let history = vec![
            Content::text("system", self.instruction.clone()),
            Content::text("user", input),
        ];

        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;

        let text = response.joined_text();
        if text.trim().is_empty() {
            log::warn!("Agent {} received empty response", self.name);
            return Err(ModelError::EmptyResponse.into());
        }

        log::info!(
            "Agent {} returning text response (length: {}, preview: '{}')",
            self.name,
            text.len(),
            text.chars().take(100).collect::<String>()
        );
        Ok(text)
    }
}
