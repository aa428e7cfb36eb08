// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API implementation

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::error::{ForgeError, ModelError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

const PROVIDER: &str = "gemini";

/// Google Gemini model implementation
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
}

impl GeminiModel {
    /// Create a new GeminiModel
    ///
    /// Requires `GOOGLE_API_KEY` environment variable to be set.
    pub fn new(model_name: String) -> Result<Self, ForgeError> {
        let api_key = env::var("GOOGLE_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("GOOGLE_API_KEY".to_string()))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
        })
    }

    /// Build the request body. System messages become `systemInstruction`;
    /// Gemini only accepts `user` and `model` roles in `contents`.
    fn build_body(history: &[Content], config: Option<&GenerationConfig>) -> Value {
        let system: Vec<Value> = history
            .iter()
            .filter(|c| c.role == "system")
            .flat_map(|c| c.parts.iter().filter_map(part_to_gemini_json))
            .collect();

        let contents: Vec<Value> = history
            .iter()
            .filter(|c| c.role != "system")
            .map(|c| {
                let role = if c.role == "model" { "model" } else { "user" };
                let parts: Vec<Value> = c.parts.iter().filter_map(part_to_gemini_json).collect();
                json!({ "role": role, "parts": parts })
            })
            .collect();

        let mut body = json!({ "contents": contents });

        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": system });
        }

        if let Some(cfg) = config {
            let mut generation = serde_json::Map::new();
            if let Some(temp) = cfg.temperature {
                generation.insert("temperature".to_string(), json!(temp));
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                generation.insert("maxOutputTokens".to_string(), json!(max_tokens));
            }
            if let Some(top_p) = cfg.top_p {
                generation.insert("topP".to_string(), json!(top_p));
            }
            if let Some(top_k) = cfg.top_k {
                generation.insert("topK".to_string(), json!(top_k));
            }
            if !generation.is_empty() {
                body["generationConfig"] = Value::Object(generation);
            }
        }

        body
    }

    /// Parse the first candidate of a Gemini response
    fn parse_response(resp_json: &Value) -> Result<Content, ForgeError> {
        let candidate = resp_json["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ModelError::InvalidResponse("No candidates in response".to_string()))?;

        if let Some(finish_reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
            log::debug!("Gemini finish reason: {}", finish_reason);
            if finish_reason == "SAFETY" {
                return Err(ForgeError::api(
                    PROVIDER,
                    "response blocked by safety filters",
                ));
            }
        }

        let parts_json = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| {
                log::error!("No parts in candidate: {}", candidate);
                ModelError::InvalidResponse(format!("No parts in candidate: {}", candidate))
            })?;

        let parts: Vec<Part> = parts_json.iter().flat_map(parse_gemini_part).collect();

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for GeminiModel {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ForgeError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model_name, self.api_key
        );

        let body = Self::build_body(history, config);

        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self.client.post(&url).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(ForgeError::api(PROVIDER, format!("{}: {}", status, text)));
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("Gemini response: {}", resp_json);

        Self::parse_response(&resp_json)
    }
}

/// Serialize a Part to Gemini API JSON format
/// Returns None for parts that shouldn't be sent (e.g., Thinking)
pub fn part_to_gemini_json(part: &Part) -> Option<Value> {
    match part {
        Part::Text(t) => Some(json!({ "text": t })),
        Part::Thinking(_) => None,
    }
}

/// Parse a Gemini API JSON part into Parts.
/// Parts flagged `"thought": true` carry reasoning text, not answer text.
pub fn parse_gemini_part(p: &Value) -> Vec<Part> {
    let mut parts = Vec::new();

    let is_thought = p.get("thought").and_then(|t| t.as_bool()).unwrap_or(false);

    if let Some(text) = p["text"].as_str() {
        if is_thought {
            parts.push(Part::Thinking(text.to_string()));
        } else {
            parts.push(Part::Text(text.to_string()));
        }
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_text_part() {
        let part = Part::Text("Hello world".to_string());
        assert_eq!(part_to_gemini_json(&part), Some(json!({ "text": "Hello world" })));
    }

    #[test]
    fn test_serialize_thinking_part_returns_none() {
        let part = Part::Thinking("internal".to_string());
        assert!(part_to_gemini_json(&part).is_none());
    }

    #[test]
    fn test_parse_thought_part() {
        let parts = parse_gemini_part(&json!({ "text": "pondering", "thought": true }));
        assert_eq!(parts.len(), 1);
        assert!(matches!(&parts[0], Part::Thinking(t) if t == "pondering"));
    }

    #[test]
    fn test_system_message_becomes_instruction() {
        let history = vec![
            Content::text("system", "You are an academic LaTeX tutor."),
            Content::text("user", "Photosynthesis"),
        ];
        let config = GenerationConfig {
            temperature: Some(0.3),
            ..Default::default()
        };

        let body = GeminiModel::build_body(&history, Some(&config));

        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are an academic LaTeX tutor."
        );
        assert_eq!(body["contents"].as_array().map(|c| c.len()), Some(1));
        assert_eq!(body["contents"][0]["role"], "user");
        let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_response_text() {
        let resp = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "\\documentclass{article}" }] },
                "finishReason": "STOP"
            }]
        });
        let content = GeminiModel::parse_response(&resp).unwrap();
        assert_eq!(content.joined_text(), "\\documentclass{article}");
    }

    #[test]
    fn test_parse_response_safety_block() {
        let resp = json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        });
        let err = GeminiModel::parse_response(&resp).unwrap_err();
        assert!(matches!(err, ForgeError::Api { .. }));
    }

    #[test]
    fn test_parse_response_without_candidates() {
        let err = GeminiModel::parse_response(&json!({})).unwrap_err();
        assert!(matches!(
            err,
            ForgeError::Model(ModelError::InvalidResponse(_))
        ));
    }
}
