// SPDX-License-Identifier: MIT

//! LaTeX to Markdown conversion
//!
//! The model does the structural translation; a deterministic cleanup pass
//! then removes anything math-shaped, since the display format has no
//! renderer for it. Placeholder directives pass through untouched.

use crate::adk::agent::{Agent, LLMAgent};
use crate::adk::error::ForgeError;
use crate::adk::model::Model;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

const CONVERTER_INSTRUCTION: &str = "You convert LaTeX lessons into clean Markdown for display. \
Map sections to headings, lists to Markdown lists and emphasis to Markdown emphasis. Remove all \
mathematical notation instead of translating it and describe the idea in words. Where a figure \
would help, insert a directive of the form <graph: description>, <image: description> or \
<diagram: description> on its own line. Return only the Markdown.";

static INVISIBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("[\u{FEFF}\u{200B}\u{200C}\u{200D}\u{2060}]").expect("Failed to compile invisible char regex")
});

static OPENING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*```[A-Za-z]*[ \t]*\n").expect("Failed to compile opening fence regex")
});

static CLOSING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n?```\s*$").expect("Failed to compile closing fence regex"));

static MARKDOWN_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^#\s*markdown[ \t]*(?:\n|$)").expect("Failed to compile title regex"));

static MATH_ENVIRONMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)\\begin\{(?:equation|align|gather|multline|eqnarray|displaymath|math)\*?\}.*?\\end\{(?:equation|align|gather|multline|eqnarray|displaymath|math)\*?\}",
    )
    .expect("Failed to compile math environment regex")
});

static DISPLAY_DOLLARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\$\$.*?\$\$").expect("Failed to compile display math regex"));

static DISPLAY_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\\[.*?\\\]").expect("Failed to compile bracket math regex"));

static INLINE_PARENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\\(.*?\\\)").expect("Failed to compile paren math regex"));

static INLINE_DOLLARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\\$])\$[^$\n]+?\$").expect("Failed to compile inline math regex")
});

static EXTRA_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("Failed to compile blank line regex"));

/// Derives the display-format document from validated LaTeX
#[async_trait]
pub trait FormatConverter: Send + Sync {
    async fn convert(&self, latex: &str, language: &str) -> Result<String, ForgeError>;
}

/// Remove model noise and every math construct
pub fn cleanup(markdown: &str) -> String {
    let text = INVISIBLE.replace_all(markdown, "");
    let text = OPENING_FENCE.replace(&text, "");
    let text = CLOSING_FENCE.replace(&text, "");
    let text = MARKDOWN_TITLE.replace_all(&text, "");
    let text = MATH_ENVIRONMENT.replace_all(&text, "");
    let text = DISPLAY_DOLLARS.replace_all(&text, "");
    let text = DISPLAY_BRACKETS.replace_all(&text, "");
    let text = INLINE_PARENS.replace_all(&text, "");
    let text = INLINE_DOLLARS.replace_all(&text, "${1}");
    let text = EXTRA_BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

pub struct LlmFormatConverter {
    agent: Arc<dyn Agent>,
}

impl LlmFormatConverter {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub fn from_model(model: Arc<dyn Model>) -> Self {
        Self::new(Arc::new(
            LLMAgent::new("markdown_converter", CONVERTER_INSTRUCTION, model).with_temperature(0.0),
        ))
    }
}

#[async_trait]
impl FormatConverter for LlmFormatConverter {
    async fn convert(&self, latex: &str, language: &str) -> Result<String, ForgeError> {
        let reply = self
            .agent
            .run(format!("Language: {}\n\n{}", language, latex))
            .await?;
        Ok(cleanup(&reply))
    }
}
