// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use super::record::{Message, RouteDecision};
use super::schema::{self, StateFieldDef};
use crate::forge::placeholder::AssetReport;
use crate::forge::workflow::graph::GraphState;
use serde::Serialize;
use std::collections::BTreeMap;

/// The record threaded through every orchestrator node of one task
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowState {
    pub user_input: String,
    /// External context; `""` means no document
    pub document: String,
    pub language: String,
    pub messages: Vec<Message>,
    pub route: Option<RouteDecision>,
    pub summarized_context: String,
    pub text_content: String,
    pub markdown_content: String,
    pub score: i64,
    pub retry_count: u32,
    pub file_path: Option<String>,
    pub pdf_path: Option<String>,
    pub markdown_path: Option<String>,
    pub processed_markdown_path: Option<String>,
    /// Keyed by `"{kind}_{index}"`
    pub media_assets: BTreeMap<String, String>,
    pub asset_report: Option<AssetReport>,
    pub audio_path: Option<String>,
}

/// A node's contribution. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub route: Option<RouteDecision>,
    pub summarized_context: Option<String>,
    pub text_content: Option<String>,
    pub markdown_content: Option<String>,
    pub score: Option<i64>,
    /// Added to the counter, never assigned
    pub retry_count: Option<u32>,
    pub file_path: Option<String>,
    pub pdf_path: Option<String>,
    pub markdown_path: Option<String>,
    pub processed_markdown_path: Option<String>,
    pub media_assets: BTreeMap<String, String>,
    pub asset_report: Option<AssetReport>,
    pub audio_path: Option<String>,
}

impl WorkflowState {
    /// Fresh state for one task. Blank documents collapse to `""`.
    pub fn new(
        user_input: impl Into<String>,
        document: Option<String>,
        language: impl Into<String>,
    ) -> Self {
        let user_input = user_input.into();
        let document = document
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_default();

        Self {
            messages: vec![Message::user(user_input.clone())],
            user_input,
            document,
            language: language.into(),
            ..Default::default()
        }
    }

    /// Reducer declared for each field
    pub fn schema() -> &'static [StateFieldDef] {
        schema::schema()
    }

    pub fn has_document(&self) -> bool {
        !self.document.is_empty()
    }

    /// The query the task was started with
    pub fn first_message(&self) -> &str {
        self.messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or(&self.user_input)
    }
}

impl GraphState for WorkflowState {
    type Update = StateUpdate;

    fn apply(&mut self, update: StateUpdate) {
        // Append
        self.messages.extend(update.messages);
        // Add
        if let Some(delta) = update.retry_count {
            self.retry_count += delta;
        }
        // Merge
        self.media_assets.extend(update.media_assets);

        // Overwrite
        overwrite(&mut self.route, update.route.map(Some));
        overwrite(&mut self.summarized_context, update.summarized_context);
        overwrite(&mut self.text_content, update.text_content);
        overwrite(&mut self.markdown_content, update.markdown_content);
        overwrite(&mut self.score, update.score);
        overwrite(&mut self.file_path, update.file_path.map(Some));
        overwrite(&mut self.pdf_path, update.pdf_path.map(Some));
        overwrite(&mut self.markdown_path, update.markdown_path.map(Some));
        overwrite(
            &mut self.processed_markdown_path,
            update.processed_markdown_path.map(Some),
        );
        overwrite(&mut self.asset_report, update.asset_report.map(Some));
        overwrite(&mut self.audio_path, update.audio_path.map(Some));
    }
}

fn overwrite<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}
