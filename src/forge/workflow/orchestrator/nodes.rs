// SPDX-License-Identifier: MIT

//! Orchestrator nodes
//!
//! Each node reads the state, calls at most one collaborator and returns a
//! `StateUpdate`. None of them touch shared state directly.

use crate::adk::error::ForgeError;
use crate::forge::audio::{NarrationMode, Narrator};
use crate::forge::compile::DocumentCompiler;
use crate::forge::config::LayoutSettings;
use crate::forge::convert::FormatConverter;
use crate::forge::generate::{ContentGenerator, RequestRouter};
use crate::forge::persist::{write_text, TaskLayout};
use crate::forge::placeholder::PlaceholderResolver;
use crate::forge::retrieval::Retriever;
use crate::forge::scoring::{Optimizer, QualityScorer};
use crate::forge::validate;
use crate::forge::workflow::graph::Node;
use crate::forge::workflow::state::{Message, StateUpdate, WorkflowState};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

fn layout(settings: &LayoutSettings, state: &WorkflowState) -> TaskLayout {
    TaskLayout::new(settings, &state.user_input)
}

pub struct StartNode {
    pub router: Arc<dyn RequestRouter>,
}

#[async_trait]
impl Node<WorkflowState> for StartNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let route = self.router.route(state.first_message()).await?;
        Ok(StateUpdate {
            route: Some(route),
            ..Default::default()
        })
    }
}

pub struct RetrieveContextNode {
    pub retriever: Arc<dyn Retriever>,
}

#[async_trait]
impl Node<WorkflowState> for RetrieveContextNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let context = self
            .retriever
            .retrieve(state.first_message(), &state.document)
            .await?;
        log::info!("Summarized context is {} chars", context.len());
        Ok(StateUpdate {
            summarized_context: Some(context),
            ..Default::default()
        })
    }
}

pub struct GenerateContentNode {
    pub generator: Arc<dyn ContentGenerator>,
}

#[async_trait]
impl Node<WorkflowState> for GenerateContentNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let text = self
            .generator
            .generate(&state.user_input, &state.language, &state.summarized_context)
            .await?;
        Ok(StateUpdate {
            messages: vec![Message::assistant(text.clone())],
            text_content: Some(text),
            ..Default::default()
        })
    }
}

pub struct ScoreContentNode {
    pub scorer: Arc<dyn QualityScorer>,
}

#[async_trait]
impl Node<WorkflowState> for ScoreContentNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let score = self.scorer.score(&state.text_content).await?;
        Ok(StateUpdate {
            score: Some(score),
            ..Default::default()
        })
    }
}

pub struct OptimizeNode {
    pub optimizer: Arc<dyn Optimizer>,
}

#[async_trait]
impl Node<WorkflowState> for OptimizeNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        log::info!("Optimizing content scored {}", state.score);
        let text = self
            .optimizer
            .optimize(&state.text_content, state.score, &state.language)
            .await?;
        Ok(StateUpdate {
            messages: vec![Message::assistant(text.clone())],
            text_content: Some(text),
            retry_count: Some(1),
            ..Default::default()
        })
    }
}

pub struct ValidateNode;

#[async_trait]
impl Node<WorkflowState> for ValidateNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        Ok(StateUpdate {
            text_content: Some(validate::validate(&state.text_content)),
            ..Default::default()
        })
    }
}

pub struct PersistPrimaryNode {
    pub layout: LayoutSettings,
}

#[async_trait]
impl Node<WorkflowState> for PersistPrimaryNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let path = layout(&self.layout, state).primary_source();
        write_text(&path, &state.text_content).await?;
        Ok(StateUpdate {
            file_path: Some(path.to_string_lossy().to_string()),
            ..Default::default()
        })
    }
}

pub struct CompilePrimaryNode {
    pub compiler: Arc<dyn DocumentCompiler>,
}

#[async_trait]
impl Node<WorkflowState> for CompilePrimaryNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let source = state
            .file_path
            .as_deref()
            .ok_or_else(|| ForgeError::other("primary source was not persisted"))?;
        let pdf = self.compiler.compile(Path::new(source)).await?;
        Ok(StateUpdate {
            pdf_path: Some(pdf.to_string_lossy().to_string()),
            ..Default::default()
        })
    }
}

pub struct ConvertFormatNode {
    pub converter: Arc<dyn FormatConverter>,
}

#[async_trait]
impl Node<WorkflowState> for ConvertFormatNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let markdown = self
            .converter
            .convert(&state.text_content, &state.language)
            .await?;
        Ok(StateUpdate {
            markdown_content: Some(markdown),
            ..Default::default()
        })
    }
}

pub struct PersistConvertedNode {
    pub layout: LayoutSettings,
}

#[async_trait]
impl Node<WorkflowState> for PersistConvertedNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let path = layout(&self.layout, state).converted_source();
        write_text(&path, &state.markdown_content).await?;
        Ok(StateUpdate {
            markdown_path: Some(path.to_string_lossy().to_string()),
            ..Default::default()
        })
    }
}

pub struct ResolveAssetsNode {
    pub resolver: Arc<PlaceholderResolver>,
    pub layout: LayoutSettings,
}

#[async_trait]
impl Node<WorkflowState> for ResolveAssetsNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let layout = layout(&self.layout, state);
        let resolved = self.resolver.process(&state.markdown_content, &layout).await?;
        log::info!(
            "Resolved {} placeholders, {} assets generated",
            resolved.placeholders.len(),
            resolved.media_assets.len()
        );
        Ok(StateUpdate {
            markdown_content: Some(resolved.document),
            processed_markdown_path: Some(resolved.processed_path.to_string_lossy().to_string()),
            media_assets: resolved.media_assets,
            asset_report: Some(resolved.report),
            ..Default::default()
        })
    }
}

/// Only reachable when a narrator is configured
pub struct NarrateNode {
    pub narrator: Option<Arc<dyn Narrator>>,
    pub mode: NarrationMode,
    pub layout: LayoutSettings,
}

#[async_trait]
impl Node<WorkflowState> for NarrateNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, ForgeError> {
        let narrator = self
            .narrator
            .as_ref()
            .ok_or_else(|| ForgeError::config("no narrator configured"))?;
        let path = layout(&self.layout, state).narration_path();
        let narration = narrator
            .narrate(self.mode, &state.markdown_content, &path)
            .await?;
        Ok(StateUpdate {
            audio_path: Some(narration.path.to_string_lossy().to_string()),
            ..Default::default()
        })
    }
}
