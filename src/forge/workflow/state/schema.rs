// SPDX-License-Identifier: MIT

//! State schema definitions
//!
//! Every `WorkflowState` field declares how an update is merged into it. The
//! table is static and checked by tests against `WorkflowState::apply`.

use serde::Serialize;

/// Reducer types for merging values into state
#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Set at creation, never updated
    Immutable,
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to sequence
    Append,
    /// Add to counter
    Add,
    /// Insert keys into map, later keys win
    Merge,
}

/// Definition of a single state field
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StateFieldDef {
    pub name: &'static str,
    pub reducer: ReducerType,
}

const fn field(name: &'static str, reducer: ReducerType) -> StateFieldDef {
    StateFieldDef { name, reducer }
}

static FIELDS: &[StateFieldDef] = &[
    field("user_input", ReducerType::Immutable),
    field("document", ReducerType::Immutable),
    field("language", ReducerType::Immutable),
    field("messages", ReducerType::Append),
    field("route", ReducerType::Overwrite),
    field("summarized_context", ReducerType::Overwrite),
    field("text_content", ReducerType::Overwrite),
    field("markdown_content", ReducerType::Overwrite),
    field("score", ReducerType::Overwrite),
    field("retry_count", ReducerType::Add),
    field("file_path", ReducerType::Overwrite),
    field("pdf_path", ReducerType::Overwrite),
    field("markdown_path", ReducerType::Overwrite),
    field("processed_markdown_path", ReducerType::Overwrite),
    field("media_assets", ReducerType::Merge),
    field("asset_report", ReducerType::Overwrite),
    field("audio_path", ReducerType::Overwrite),
];

/// Schema of `WorkflowState`
pub fn schema() -> &'static [StateFieldDef] {
    FIELDS
}

/// Reducer declared for `name`, if it is a state field
pub fn reducer_for(name: &str) -> Option<ReducerType> {
    FIELDS.iter().find(|f| f.name == name).map(|f| f.reducer)
}
