// SPDX-License-Identifier: MIT

//! Request routing and primary content generation

use crate::adk::agent::{Agent, LLMAgent};
use crate::adk::error::ForgeError;
use crate::adk::model::Model;
use crate::forge::workflow::state::{OutputKind, RouteDecision, RouteType};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const ROUTER_INSTRUCTION: &str = r#"Analyze the user input and follow these strict rules:
1. If the user asks for a general explanation (e.g. 'What is...', 'Explain...'), categorize as 'type_1' and set required_outputs to ["text", "audio", "image", "video", "diagram"].
2. If the user asks for specific formats (e.g. 'give me a summary and audio'), categorize as 'type_2' and list ONLY those formats.
3. If the user mentions a document, file, or PDF, categorize as 'type_3'.
Answer with a single JSON object: {"route_type": "...", "required_outputs": [...]}"#;

const GENERATOR_INSTRUCTION: &str = r"You are an Academic LaTeX Tutor. Create an in-depth, formal educational document in LaTeX.
Strict structural requirements:
1. Use the 'article' documentclass.
2. Include \usepackage{amsmath, amssymb} for formulas.
3. Use \section{} for main headings and \subsection{} for sub-points.
4. Formulas must be in \[ ... \] or equation environments.
5. Include a 'Worked Examples' section with step-by-step solutions in an enumerate environment.
6. Escape special characters such as % or $ unless they are LaTeX syntax.
7. Return only the raw LaTeX code, from \documentclass to \end{document}.";

const GENERATION_TEMPERATURE: f32 = 0.3;

/// Classifies a request
#[async_trait]
pub trait RequestRouter: Send + Sync {
    async fn route(&self, query: &str) -> Result<RouteDecision, ForgeError>;
}

/// Produces the primary artifact for a topic
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// `context` is retrieved document context, empty when there is none
    async fn generate(&self, topic: &str, language: &str, context: &str) -> Result<String, ForgeError>;
}

#[derive(Deserialize)]
struct RawRoute {
    route_type: String,
    #[serde(default)]
    required_outputs: Vec<String>,
}

/// Parse a classifier reply; anything unusable falls back to a general route
pub fn parse_route(reply: &str) -> RouteDecision {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => return RouteDecision::fallback(),
    };

    let raw: RawRoute = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("Unparseable route '{}': {}", json, e);
            return RouteDecision::fallback();
        }
    };

    let route_type = match raw.route_type.trim().to_lowercase().as_str() {
        "type_1" | "general" => RouteType::General,
        "type_2" | "specific_formats" => RouteType::SpecificFormats,
        "type_3" | "document_grounded" => RouteType::DocumentGrounded,
        _ => return RouteDecision::fallback(),
    };

    let mut required_outputs: Vec<OutputKind> = Vec::new();
    for name in &raw.required_outputs {
        if let Ok(kind) = serde_json::from_value::<OutputKind>(serde_json::Value::String(name.trim().to_lowercase())) {
            if !required_outputs.contains(&kind) {
                required_outputs.push(kind);
            }
        }
    }
    if required_outputs.is_empty() {
        required_outputs = OutputKind::ALL.to_vec();
    }

    RouteDecision {
        route_type,
        required_outputs,
    }
}

pub struct LlmRouter {
    agent: Arc<dyn Agent>,
}

impl LlmRouter {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub fn from_model(model: Arc<dyn Model>) -> Self {
        Self::new(Arc::new(LLMAgent::new("router", ROUTER_INSTRUCTION, model).with_temperature(0.0)))
    }
}

#[async_trait]
impl RequestRouter for LlmRouter {
    async fn route(&self, query: &str) -> Result<RouteDecision, ForgeError> {
        let reply = self.agent.run(query.to_string()).await?;
        let decision = parse_route(&reply);
        log::info!(
            "Routed as {:?} with outputs {:?}",
            decision.route_type,
            decision.required_outputs
        );
        Ok(decision)
    }
}

pub struct LlmContentGenerator {
    agent: Arc<dyn Agent>,
}

impl LlmContentGenerator {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub fn from_model(model: Arc<dyn Model>) -> Self {
        Self::new(Arc::new(
            LLMAgent::new("text_expert", GENERATOR_INSTRUCTION, model)
                .with_temperature(GENERATION_TEMPERATURE),
        ))
    }
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    async fn generate(&self, topic: &str, language: &str, context: &str) -> Result<String, ForgeError> {
        let mut input = format!("Topic: {}\nLanguage: {}", topic, language);
        if !context.is_empty() {
            input.push_str("\n\nGround the lesson in this reference material:\n");
            input.push_str(context);
        }
        self.agent.run(input).await
    }
}
