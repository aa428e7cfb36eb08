// SPDX-License-Identifier: MIT

//! Quality scoring and the one-shot optimizer

use crate::adk::agent::{Agent, LLMAgent};
use crate::adk::error::{ForgeError, ModelError};
use crate::adk::model::Model;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static FIRST_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+").expect("Failed to compile score regex"));

pub const MAX_SCORE: i64 = 10;

const SCORER_INSTRUCTION: &str = "You are a strict reviewer of educational LaTeX documents. \
Rate the document from 0 to 10 for correctness, depth, structure and clarity. Answer with the \
integer score only.";

const OPTIMIZER_INSTRUCTION: &str = "You improve educational LaTeX documents that scored below \
the quality bar. Deepen explanations, fix mistakes, add worked examples where missing and keep \
the document compilable. Return only the complete improved LaTeX document.";

/// Scores an artifact, 0 to 10
#[async_trait]
pub trait QualityScorer: Send + Sync {
    async fn score(&self, content: &str) -> Result<i64, ForgeError>;
}

/// Rewrites a low-scoring artifact
#[async_trait]
pub trait Optimizer: Send + Sync {
    async fn optimize(&self, content: &str, score: i64, language: &str) -> Result<String, ForgeError>;
}

/// First integer in the reply, clamped to the score range
pub fn parse_score(reply: &str) -> Option<i64> {
    FIRST_INTEGER
        .find(reply)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .map(|s| s.clamp(0, MAX_SCORE))
}

pub struct LlmQualityScorer {
    agent: Arc<dyn Agent>,
}

impl LlmQualityScorer {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub fn from_model(model: Arc<dyn Model>) -> Self {
        Self::new(Arc::new(LLMAgent::new("scorer", SCORER_INSTRUCTION, model).with_temperature(0.0)))
    }
}

#[async_trait]
impl QualityScorer for LlmQualityScorer {
    async fn score(&self, content: &str) -> Result<i64, ForgeError> {
        let reply = self.agent.run(content.to_string()).await?;
        let score = parse_score(&reply)
            .ok_or_else(|| ModelError::InvalidResponse(format!("no score in '{}'", reply.trim())))?;
        log::info!("Scoring agent assigned {}/{}", score, MAX_SCORE);
        Ok(score)
    }
}

pub struct LlmOptimizer {
    agent: Arc<dyn Agent>,
}

impl LlmOptimizer {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub fn from_model(model: Arc<dyn Model>) -> Self {
        Self::new(Arc::new(LLMAgent::new("optimizer", OPTIMIZER_INSTRUCTION, model)))
    }
}

#[async_trait]
impl Optimizer for LlmOptimizer {
    async fn optimize(&self, content: &str, score: i64, language: &str) -> Result<String, ForgeError> {
        self.agent
            .run(format!(
                "Current score: {}/{}\nLanguage: {}\n\nDocument:\n{}",
                score, MAX_SCORE, language, content
            ))
            .await
    }
}
